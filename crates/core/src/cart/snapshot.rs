//! Server-confirmed cart state.
//!
//! A [`CartSnapshot`] is only ever replaced as a whole. Nothing in the
//! reconciler edits one in place; pending changes live in the intent queue and
//! are layered on top by the projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::{CurrencyCode, LineId, Money};

/// Variant option shown on a line (e.g., `Size: M`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedOption {
    /// Option name.
    pub name: String,
    /// Option value.
    pub value: String,
}

/// Product variant referenced by a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merchandise {
    /// Variant ID.
    pub id: String,
    /// Variant title (`Default Title` for single-variant products).
    pub title: String,
    /// Parent product handle.
    pub product_handle: String,
    /// Parent product title.
    pub product_title: String,
    /// Selected options.
    pub selected_options: Vec<SelectedOption>,
    /// Variant image URL.
    pub image_url: Option<String>,
}

/// Cost for a cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCost {
    /// Price per unit.
    pub amount_per_quantity: Money,
    /// Subtotal (before discounts).
    pub subtotal: Money,
    /// Total (after discounts).
    pub total: Money,
}

/// A line item in the confirmed cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Server-assigned line ID.
    pub id: LineId,
    /// Quantity.
    pub quantity: u32,
    /// Product variant.
    pub merchandise: Merchandise,
    /// Line cost.
    pub cost: LineCost,
}

/// Discount code applied to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCode {
    /// The discount code.
    pub code: String,
    /// Whether the code is applicable.
    pub applicable: bool,
}

/// Gift card applied to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedGiftCard {
    /// Gift card ID.
    pub id: String,
    /// Last characters of the gift card code.
    pub last_characters: String,
    /// Amount applied to this cart.
    pub amount_used: Option<Money>,
}

/// The authoritative, server-confirmed cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    /// Remote cart ID, absent until the first mutation creates the cart.
    pub id: Option<String>,
    /// Cart lines in server order.
    pub lines: Vec<LineItem>,
    /// Total item quantity.
    pub total_quantity: u32,
    /// Applied discount codes.
    pub discount_codes: Vec<DiscountCode>,
    /// Applied gift cards.
    pub applied_gift_cards: Vec<AppliedGiftCard>,
    /// Hosted checkout URL.
    pub checkout_url: Option<Url>,
    /// Subtotal before tax and shipping.
    pub subtotal: Money,
    /// Last update timestamp reported by the server.
    pub updated_at: Option<DateTime<Utc>>,
}

impl CartSnapshot {
    /// The baseline before any remote cart exists.
    #[must_use]
    pub fn empty(currency_code: CurrencyCode) -> Self {
        Self {
            id: None,
            lines: Vec::new(),
            total_quantity: 0,
            discount_codes: Vec::new(),
            applied_gift_cards: Vec::new(),
            checkout_url: None,
            subtotal: Money::zero(currency_code),
            updated_at: None,
        }
    }

    /// Find a confirmed line by ID.
    #[must_use]
    pub fn line(&self, id: &LineId) -> Option<&LineItem> {
        self.lines.iter().find(|line| &line.id == id)
    }

    /// Whether this snapshot was produced strictly before `other`.
    ///
    /// Snapshots without a timestamp are never considered older.
    #[must_use]
    pub fn is_older_than(&self, other: &Self) -> bool {
        match (self.updated_at, other.updated_at) {
            (Some(mine), Some(theirs)) => mine < theirs,
            _ => false,
        }
    }
}

impl Default for CartSnapshot {
    fn default() -> Self {
        Self::empty(CurrencyCode::default())
    }
}
