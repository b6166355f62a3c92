//! Cart session plumbing between the HTTP layer and Shopify.
//!
//! - [`remote`] - `RemoteCart` trait and the Storefront API implementation
//! - [`session`] - Single-owner actor driving one `Reconciler`
//! - [`registry`] - Sessions per visitor, cached with an idle TTL

pub mod registry;
pub mod remote;
pub mod session;

pub use registry::CartSessions;
pub use remote::{RemoteCart, RemoteError, ShopifyRemoteCart};
pub use session::{CartSession, CartView, PendingIntent, SessionError, Submission};
