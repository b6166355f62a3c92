//! Application state shared across handlers.

use std::sync::Arc;

use crate::cart::{CartSessions, RemoteCart, ShopifyRemoteCart};
use crate::config::StorefrontConfig;
use crate::shopify::StorefrontClient;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the configuration and the live cart sessions.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    cart_sessions: CartSessions,
}

impl AppState {
    /// Create application state backed by the Shopify Storefront API.
    #[must_use]
    pub fn new(config: StorefrontConfig) -> Self {
        let storefront = StorefrontClient::new(&config.shopify);
        let remote: Arc<dyn RemoteCart> = Arc::new(ShopifyRemoteCart::new(storefront));
        Self::with_remote(config, remote)
    }

    /// Create application state over any remote cart implementation.
    #[must_use]
    pub fn with_remote(config: StorefrontConfig, remote: Arc<dyn RemoteCart>) -> Self {
        let cart_sessions = CartSessions::new(remote, &config.cart_sessions);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                cart_sessions,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the cart session registry.
    #[must_use]
    pub fn cart_sessions(&self) -> &CartSessions {
        &self.inner.cart_sessions
    }
}
