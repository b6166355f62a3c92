//! Integration tests for the per-visitor cart session registry.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::time::Duration;

use cartsync_core::CartAction;
use cartsync_integration_tests::FakeRemoteCart;
use cartsync_storefront::cart::CartSessions;
use cartsync_storefront::config::CartSessionConfig;

#[tokio::test]
async fn test_same_visitor_gets_same_session() {
    let (remote, mut calls) = FakeRemoteCart::create();
    let sessions = CartSessions::new(remote, &CartSessionConfig::default());

    let first = sessions.get_or_start("visitor-1", None).await.unwrap();
    first
        .submit(CartAction::Add {
            merchandise_id: "V1".to_string(),
            quantity: 2,
            preview: None,
        })
        .unwrap()
        .accepted()
        .await
        .unwrap();

    let again = sessions.get_or_start("visitor-1", None).await.unwrap();
    assert_eq!(again.view().cart.total_quantity, 2);

    let other = sessions.get_or_start("visitor-2", None).await.unwrap();
    assert_eq!(other.view().cart.total_quantity, 0);

    calls.next().await.succeed().unwrap();
}

#[tokio::test]
async fn test_new_session_loads_stored_cart() {
    let (remote, _calls) = FakeRemoteCart::create();
    let snapshot = remote.seed_cart(&[("V1", 3)]);
    let sessions = CartSessions::new(remote, &CartSessionConfig::default());

    let session = sessions
        .get_or_start("visitor-1", snapshot.id.as_deref())
        .await
        .unwrap();
    let view = session.view();
    assert_eq!(view.cart.cart_id, snapshot.id);
    assert_eq!(view.cart.total_quantity, 3);
    assert_eq!(view.cart.lines[0].id, snapshot.lines[0].id);
}

#[tokio::test]
async fn test_missing_cart_starts_empty() {
    let (remote, _calls) = FakeRemoteCart::create();
    let sessions = CartSessions::new(remote, &CartSessionConfig::default());

    let session = sessions
        .get_or_start("visitor-1", Some("gid://shopify/Cart/expired"))
        .await
        .unwrap();
    let view = session.view();
    assert!(view.cart.cart_id.is_none());
    assert!(view.cart.is_empty());
}

#[tokio::test]
async fn test_ended_session_reloads_from_remote() {
    let (remote, _calls) = FakeRemoteCart::create();
    let snapshot = remote.seed_cart(&[("V1", 1)]);
    let config = CartSessionConfig {
        idle_timeout: Duration::from_secs(60),
        capacity: 10,
    };
    let sessions = CartSessions::new(remote, &config);

    let session = sessions.get_or_start("visitor-1", None).await.unwrap();
    assert!(session.view().cart.is_empty());

    sessions.end("visitor-1").await;
    let session = sessions
        .get_or_start("visitor-1", snapshot.id.as_deref())
        .await
        .unwrap();
    assert_eq!(session.view().cart.total_quantity, 1);
}
