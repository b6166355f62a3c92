//! Session-related types.
//!
//! The cookie session only carries identifiers; the cart itself lives in the
//! cart session registry and on Shopify.

/// Session keys for cart state.
pub mod keys {
    /// Key for the visitor ID the cart session registry is keyed by.
    pub const VISITOR_ID: &str = "visitor_id";

    /// Key for storing the Shopify cart ID.
    pub const CART_ID: &str = "cart_id";
}
