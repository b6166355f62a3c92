//! Cartsync Core - Cart model and optimistic reconciliation.
//!
//! This crate provides the pieces shared by every Cartsync component:
//! - `storefront` - Web storefront that renders the cart and talks to Shopify
//! - `integration-tests` - Scenario tests for the cart session driver
//!
//! # Architecture
//!
//! The core crate contains only types and pure state transitions - no I/O, no
//! HTTP clients, no async runtime. The [`Reconciler`] decides *what* to send to
//! the remote cart service and *how* to merge its answers; the storefront crate
//! owns the actual sending.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, money, and status enums
//! - [`cart`] - Confirmed cart snapshots, intents, mutations, and errors
//! - [`reconciler`] - Intent queue, supersession, and server merge
//! - [`projection`] - Render-ready view of the cart with pending intents applied

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod projection;
pub mod reconciler;
pub mod types;

pub use cart::*;
pub use projection::{ProjectedCart, ProjectedLine, project};
pub use reconciler::{CartEvent, Dispatch, IntentHandle, IntentOutcome, Reconciler};
pub use types::*;
