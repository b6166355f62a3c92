//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::cart::SessionError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Cart session operation failed.
    #[error("Cart error: {0}")]
    Session(#[from] SessionError),

    /// Cookie session store failed.
    #[error("Session store error: {0}")]
    SessionStore(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Session(SessionError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Session(SessionError::Load(_)) => StatusCode::BAD_GATEWAY,
            Self::Session(SessionError::Closed) | Self::SessionStore(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Session(SessionError::Validation(err)) => err.to_string(),
            Self::Session(SessionError::Load(_)) => "External service error".to_string(),
            Self::Session(SessionError::Closed) | Self::SessionStore(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Queued cart action", Some(&[("action", "add")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use cartsync_core::ValidationError;

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("notice 7".to_string());
        assert_eq!(err.to_string(), "Not found: notice 7");

        let err = AppError::from(SessionError::Closed);
        assert_eq!(err.to_string(), "Cart error: cart session closed");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_validation_errors_are_bad_requests() {
        let err = AppError::from(SessionError::Validation(ValidationError::NegativeQuantity(-1)));
        assert_eq!(get_status(err), StatusCode::BAD_REQUEST);

        let err = AppError::from(SessionError::Validation(ValidationError::EmptyCode));
        assert_eq!(get_status(err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_session_failures_are_server_errors() {
        assert_eq!(
            get_status(AppError::from(SessionError::Closed)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::from(SessionError::Load("timeout".to_string()))),
            StatusCode::BAD_GATEWAY
        );
    }
}
