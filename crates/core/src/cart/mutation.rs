//! Requests sent to the remote cart service.

use serde::{Deserialize, Serialize};

use crate::types::LineId;

/// A single mutation request for the remote cart service.
///
/// Built by the reconciler when an intent is handed out for dispatch. Code
/// lists are computed from the projection at that moment, so they already
/// include every other pending code change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mutation", rename_all = "snake_case")]
pub enum CartMutation {
    /// Add a variant (creates the cart when none exists yet).
    AddLines { merchandise_id: String, quantity: u32 },
    /// Set a line's quantity (zero removes the line).
    UpdateLines { line_id: LineId, quantity: u32 },
    /// Remove lines.
    RemoveLines { line_ids: Vec<LineId> },
    /// Replace the full set of discount codes.
    UpdateDiscountCodes { codes: Vec<String> },
    /// Apply additional gift card codes.
    AddGiftCardCodes { codes: Vec<String> },
}

impl CartMutation {
    /// Operation name used in logs.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::AddLines { .. } => "cartLinesAdd",
            Self::UpdateLines { .. } => "cartLinesUpdate",
            Self::RemoveLines { .. } => "cartLinesRemove",
            Self::UpdateDiscountCodes { .. } => "cartDiscountCodesUpdate",
            Self::AddGiftCardCodes { .. } => "cartGiftCardCodesUpdate",
        }
    }
}
