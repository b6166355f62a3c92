//! Status enums for cart intents.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a cart intent.
///
/// ```text
/// Pending ──► Confirmed
///    │
///    └──────► Failed
/// ```
///
/// A superseded intent is failed silently and dropped from the queue at once;
/// it never reaches the projection again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    #[default]
    Pending,
    Confirmed,
    Failed,
}

impl IntentStatus {
    /// Whether the intent still contributes to the projection.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether the intent has reached a terminal state.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_pending() {
        assert_eq!(IntentStatus::default(), IntentStatus::Pending);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!IntentStatus::Pending.is_settled());
        assert!(IntentStatus::Confirmed.is_settled());
        assert!(IntentStatus::Failed.is_settled());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&IntentStatus::Confirmed).unwrap_or_default();
        assert_eq!(json, "\"confirmed\"");
    }
}
