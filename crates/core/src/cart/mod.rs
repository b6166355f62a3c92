//! Cart domain model.
//!
//! - [`snapshot`] - The authoritative, server-confirmed cart
//! - [`intent`] - Local mutations waiting for the server
//! - [`mutation`] - Wire-level requests sent to the remote cart service
//! - [`error`] - Validation, transport, and rejection errors

pub mod error;
pub mod intent;
pub mod mutation;
pub mod snapshot;

pub use error::{CartError, CartNotice, ValidationError};
pub use intent::{CartAction, CorrelationKey, Intent, IntentKind, IntentPayload, MerchandisePreview};
pub use mutation::CartMutation;
pub use snapshot::{
    AppliedGiftCard, CartSnapshot, DiscountCode, LineCost, LineItem, Merchandise, SelectedOption,
};
