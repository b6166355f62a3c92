//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                       - Health check
//!
//! # Cart (HTMX fragments)
//! GET  /cart                         - Cart page
//! GET  /cart.json                    - Projected cart and notices as JSON
//! GET  /cart/items                   - Cart items fragment (polled while pending)
//! GET  /cart/count                   - Cart count badge (fragment)
//! POST /cart/add                     - Add to cart (returns count badge, triggers cart-updated)
//! POST /cart/update                  - Update quantity (returns cart_items fragment)
//! POST /cart/remove                  - Remove item (returns cart_items fragment)
//! POST /cart/discounts               - Apply discount code (returns cart_items fragment)
//! POST /cart/discounts/remove        - Remove discount code (returns cart_items fragment)
//! POST /cart/gift-cards              - Apply gift card (returns cart_items fragment)
//! POST /cart/notices/{id}/dismiss    - Dismiss an error notice (returns cart_items fragment)
//!
//! # Checkout
//! GET  /checkout                     - Redirect to Shopify checkout
//! ```

pub mod cart;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/items", get(cart::items))
        .route("/count", get(cart::count))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/discounts", post(cart::apply_discount))
        .route("/discounts/remove", post(cart::remove_discount))
        .route("/gift-cards", post(cart::apply_gift_card))
        .route("/notices/{id}/dismiss", post(cart::dismiss_notice))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        // Cart routes
        .nest("/cart", cart_routes())
        .route("/cart.json", get(cart::json))
        // Checkout redirect
        .route("/checkout", get(cart::checkout))
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}
