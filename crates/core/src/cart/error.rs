//! Cart error taxonomy.
//!
//! - [`ValidationError`] - bad local input, rejected before dispatch
//! - [`CartError::Transport`] - network or remote failure during dispatch
//! - [`CartError::ServerRejected`] - a business rule failed on the server
//!
//! Transport and rejection errors fail the intent and surface as a dismissible
//! [`CartNotice`]. None of them invalidate the last confirmed snapshot.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::intent::IntentKind;
use crate::types::{IntentId, LineId, NoticeId};

/// Message shown for transport failures; the raw error is only logged.
const TRANSPORT_MESSAGE: &str = "We couldn't update your cart. Please try again.";

/// Local validation failure. Never dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Quantity below zero.
    #[error("quantity cannot be negative (got {0})")]
    NegativeQuantity(i64),
    /// Quantity beyond what a cart line can hold.
    #[error("quantity {0} is too large")]
    QuantityTooLarge(i64),
    /// Add with zero quantity.
    #[error("quantity to add must be at least 1")]
    EmptyAdd,
    /// Add without a merchandise ID.
    #[error("merchandise ID is required")]
    MissingMerchandise,
    /// Update or remove targeting a line the cart doesn't contain.
    #[error("unknown cart line: {0}")]
    UnknownLine(LineId),
    /// Update or remove targeting a line the server hasn't confirmed yet.
    #[error("cart line {0} is still being added")]
    OptimisticLine(LineId),
    /// Blank discount or gift card code.
    #[error("code cannot be empty")]
    EmptyCode,
}

/// Why an intent failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Bad local input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The request never got a usable answer.
    #[error("Transport error: {message}")]
    Transport {
        /// Underlying error description.
        message: String,
    },

    /// The server refused the mutation (e.g., out of stock).
    #[error("Server rejected: {message}")]
    ServerRejected {
        /// Human-readable message from the server.
        message: String,
        /// Input field path that caused the error.
        field: Option<Vec<String>>,
        /// Machine-readable error code.
        code: Option<String>,
    },
}

impl CartError {
    /// Whether resubmitting the same change may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Message safe to show the shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::Transport { .. } => TRANSPORT_MESSAGE.to_string(),
            Self::ServerRejected { message, .. } => message.clone(),
        }
    }

    /// Server error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::ServerRejected { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// A dismissible error notification for the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartNotice {
    /// Notice ID, used to dismiss it.
    pub id: NoticeId,
    /// Intent that failed.
    pub intent_id: IntentId,
    /// What the shopper was trying to do.
    pub kind: IntentKind,
    /// Message to display.
    pub message: String,
    /// Whether the failure was a transport error worth retrying.
    pub retryable: bool,
    /// Server error code, if any.
    pub code: Option<String>,
}

impl CartNotice {
    /// Build a notice for a failed intent.
    #[must_use]
    pub fn for_failure(id: NoticeId, intent_id: IntentId, kind: IntentKind, error: &CartError) -> Self {
        Self {
            id,
            intent_id,
            kind,
            message: error.user_message(),
            retryable: error.is_retryable(),
            code: error.code().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        assert_eq!(
            ValidationError::NegativeQuantity(-2).to_string(),
            "quantity cannot be negative (got -2)"
        );
        assert_eq!(
            CartError::from(ValidationError::EmptyCode).to_string(),
            "Validation error: code cannot be empty"
        );
    }

    #[test]
    fn test_transport_is_retryable_with_generic_message() {
        let err = CartError::Transport {
            message: "connection reset".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.user_message(), TRANSPORT_MESSAGE);
    }

    #[test]
    fn test_rejection_surfaces_server_message() {
        let err = CartError::ServerRejected {
            message: "out of stock".to_string(),
            field: Some(vec!["lines".to_string(), "0".to_string()]),
            code: Some("MERCHANDISE_OUT_OF_STOCK".to_string()),
        };
        assert!(!err.is_retryable());

        let notice = CartNotice::for_failure(NoticeId::new(1), IntentId::new(9), IntentKind::Add, &err);
        assert_eq!(notice.message, "out of stock");
        assert_eq!(notice.code.as_deref(), Some("MERCHANDISE_OUT_OF_STOCK"));
        assert!(!notice.retryable);
    }
}
