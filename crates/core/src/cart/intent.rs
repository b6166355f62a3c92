//! Pending local mutations.
//!
//! A [`CartAction`] is what the shopper asked for, exactly as it arrived from
//! the UI. Validation turns it into an [`IntentPayload`], and the reconciler
//! wraps that in an [`Intent`] with an ID, a timestamp, and the
//! [`CorrelationKey`] used for supersession.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use super::snapshot::{CartSnapshot, SelectedOption};
use crate::types::{IntentId, IntentStatus, LineId, Money};

/// Display data for a line that the server hasn't created yet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MerchandisePreview {
    /// Product title.
    pub product_title: String,
    /// Variant title.
    pub variant_title: Option<String>,
    /// Product handle.
    pub product_handle: Option<String>,
    /// Selected options.
    pub selected_options: Vec<SelectedOption>,
    /// Variant image URL.
    pub image_url: Option<String>,
    /// Unit price.
    pub price: Option<Money>,
}

/// A cart change requested by the shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CartAction {
    /// Add a variant to the cart.
    Add {
        merchandise_id: String,
        quantity: i64,
        #[serde(default)]
        preview: Option<MerchandisePreview>,
    },
    /// Set the quantity of an existing line.
    UpdateQuantity { line_id: LineId, quantity: i64 },
    /// Remove an existing line.
    Remove { line_id: LineId },
    /// Apply a discount code.
    ApplyDiscount { code: String },
    /// Remove a discount code.
    RemoveDiscount { code: String },
    /// Apply a gift card code.
    ApplyGiftCard { code: String },
}

impl CartAction {
    /// The intent kind this action produces.
    #[must_use]
    pub const fn kind(&self) -> IntentKind {
        match self {
            Self::Add { .. } => IntentKind::Add,
            Self::UpdateQuantity { .. } => IntentKind::UpdateQuantity,
            Self::Remove { .. } => IntentKind::Remove,
            Self::ApplyDiscount { .. } => IntentKind::ApplyDiscount,
            Self::RemoveDiscount { .. } => IntentKind::RemoveDiscount,
            Self::ApplyGiftCard { .. } => IntentKind::ApplyGiftCard,
        }
    }

    /// Validate the payload shape against the confirmed cart.
    ///
    /// Update and remove must target a line the server has confirmed; lines
    /// that only exist optimistically can't be addressed until the server
    /// assigns them a real ID.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for negative or oversized quantities, empty
    /// adds, unknown or optimistic line IDs, and blank codes.
    pub fn validate(self, confirmed: &CartSnapshot) -> Result<IntentPayload, ValidationError> {
        match self {
            Self::Add {
                merchandise_id,
                quantity,
                preview,
            } => {
                let merchandise_id = merchandise_id.trim().to_string();
                if merchandise_id.is_empty() {
                    return Err(ValidationError::MissingMerchandise);
                }
                let quantity = checked_quantity(quantity)?;
                if quantity == 0 {
                    return Err(ValidationError::EmptyAdd);
                }
                Ok(IntentPayload::Add {
                    merchandise_id,
                    quantity,
                    preview,
                })
            }
            Self::UpdateQuantity { line_id, quantity } => {
                let quantity = checked_quantity(quantity)?;
                known_line(&line_id, confirmed)?;
                Ok(IntentPayload::UpdateQuantity { line_id, quantity })
            }
            Self::Remove { line_id } => {
                known_line(&line_id, confirmed)?;
                Ok(IntentPayload::Remove { line_id })
            }
            Self::ApplyDiscount { code } => Ok(IntentPayload::ApplyDiscount {
                code: discount_code(&code)?,
            }),
            Self::RemoveDiscount { code } => Ok(IntentPayload::RemoveDiscount {
                code: discount_code(&code)?,
            }),
            Self::ApplyGiftCard { code } => Ok(IntentPayload::ApplyGiftCard {
                code: gift_card_code(&code)?,
            }),
        }
    }
}

fn checked_quantity(quantity: i64) -> Result<u32, ValidationError> {
    if quantity < 0 {
        return Err(ValidationError::NegativeQuantity(quantity));
    }
    u32::try_from(quantity).map_err(|_| ValidationError::QuantityTooLarge(quantity))
}

fn known_line(line_id: &LineId, confirmed: &CartSnapshot) -> Result<(), ValidationError> {
    if line_id.is_optimistic() {
        return Err(ValidationError::OptimisticLine(line_id.clone()));
    }
    if confirmed.line(line_id).is_none() {
        return Err(ValidationError::UnknownLine(line_id.clone()));
    }
    Ok(())
}

fn discount_code(code: &str) -> Result<String, ValidationError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ValidationError::EmptyCode);
    }
    Ok(code.to_string())
}

/// Gift card codes are accepted with spaces (`ABCD EFGH ...`) and sent without.
fn gift_card_code(code: &str) -> Result<String, ValidationError> {
    let code: String = code.chars().filter(|c| !c.is_whitespace()).collect();
    if code.is_empty() {
        return Err(ValidationError::EmptyCode);
    }
    Ok(code)
}

/// Intent kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Add,
    UpdateQuantity,
    Remove,
    ApplyDiscount,
    RemoveDiscount,
    ApplyGiftCard,
}

impl IntentKind {
    /// Short label for notifications.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Add => "add to cart",
            Self::UpdateQuantity => "update quantity",
            Self::Remove => "remove item",
            Self::ApplyDiscount => "apply discount",
            Self::RemoveDiscount => "remove discount",
            Self::ApplyGiftCard => "apply gift card",
        }
    }
}

/// A validated intent payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntentPayload {
    Add {
        merchandise_id: String,
        quantity: u32,
        preview: Option<MerchandisePreview>,
    },
    UpdateQuantity {
        line_id: LineId,
        quantity: u32,
    },
    Remove {
        line_id: LineId,
    },
    ApplyDiscount {
        code: String,
    },
    RemoveDiscount {
        code: String,
    },
    ApplyGiftCard {
        code: String,
    },
}

impl IntentPayload {
    /// The intent kind.
    #[must_use]
    pub const fn kind(&self) -> IntentKind {
        match self {
            Self::Add { .. } => IntentKind::Add,
            Self::UpdateQuantity { .. } => IntentKind::UpdateQuantity,
            Self::Remove { .. } => IntentKind::Remove,
            Self::ApplyDiscount { .. } => IntentKind::ApplyDiscount,
            Self::RemoveDiscount { .. } => IntentKind::RemoveDiscount,
            Self::ApplyGiftCard { .. } => IntentKind::ApplyGiftCard,
        }
    }

    /// The confirmed line this payload targets (none for adds and codes).
    #[must_use]
    pub const fn target_line(&self) -> Option<&LineId> {
        match self {
            Self::UpdateQuantity { line_id, .. } | Self::Remove { line_id } => Some(line_id),
            _ => None,
        }
    }

    /// Whether applying this payload changes line quantities.
    #[must_use]
    pub const fn touches_lines(&self) -> bool {
        matches!(
            self,
            Self::Add { .. } | Self::UpdateQuantity { .. } | Self::Remove { .. }
        )
    }

    /// Derive the correlation key for this payload.
    ///
    /// `id` only matters for adds, which never supersede one another.
    #[must_use]
    pub fn correlation_key(&self, id: IntentId) -> CorrelationKey {
        match self {
            Self::Add { .. } => CorrelationKey::for_add(id),
            Self::UpdateQuantity { line_id, .. } | Self::Remove { line_id } => {
                CorrelationKey::for_lines([line_id])
            }
            Self::ApplyDiscount { code } | Self::RemoveDiscount { code } => {
                CorrelationKey::for_discount(code)
            }
            Self::ApplyGiftCard { code } => CorrelationKey::for_gift_card(code),
        }
    }
}

/// Groups intents that touch the same cart resource.
///
/// At most one intent per key is outstanding, and at most one request per key
/// is in flight. A quantity change and a removal of the same line share a key,
/// so clicking "increase" then "remove" only ever sends the removal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    /// Key for updates and removals of a set of lines.
    #[must_use]
    pub fn for_lines<'a>(line_ids: impl IntoIterator<Item = &'a LineId>) -> Self {
        let mut ids: Vec<&str> = line_ids.into_iter().map(LineId::as_str).collect();
        ids.sort_unstable();
        ids.dedup();
        Self(format!("lines-update:{}", ids.join(",")))
    }

    /// Key unique to a single add intent.
    #[must_use]
    pub fn for_add(id: IntentId) -> Self {
        Self(format!("lines-add:{id}"))
    }

    /// Key for applying or removing one discount code.
    #[must_use]
    pub fn for_discount(code: &str) -> Self {
        Self(format!("discount:{}", code.trim().to_lowercase()))
    }

    /// Whether the key belongs to a discount code intent.
    ///
    /// Shopify replaces the whole discount set on every update, so requests
    /// for different discount keys must not overlap.
    #[must_use]
    pub fn is_discount(&self) -> bool {
        self.0.starts_with("discount:")
    }

    /// Key for applying one gift card code.
    #[must_use]
    pub fn for_gift_card(code: &str) -> Self {
        let code: String = code.chars().filter(|c| !c.is_whitespace()).collect();
        Self(format!("gift-card:{}", code.to_lowercase()))
    }

    /// Borrow the raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A local mutation tracked by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Intent {
    /// Intent ID (monotonic per reconciler).
    pub id: IntentId,
    /// Validated payload.
    pub payload: IntentPayload,
    /// Supersession and serialization key.
    pub correlation_key: CorrelationKey,
    /// When the shopper submitted the change.
    pub submitted_at: DateTime<Utc>,
    /// Lifecycle status.
    pub status: IntentStatus,
    /// Whether a request for this intent has been handed out for dispatch.
    pub dispatched: bool,
}

impl Intent {
    /// Create a pending intent.
    #[must_use]
    pub fn new(id: IntentId, payload: IntentPayload, submitted_at: DateTime<Utc>) -> Self {
        let correlation_key = payload.correlation_key(id);
        Self {
            id,
            payload,
            correlation_key,
            submitted_at,
            status: IntentStatus::Pending,
            dispatched: false,
        }
    }

    /// The intent kind.
    #[must_use]
    pub const fn kind(&self) -> IntentKind {
        self.payload.kind()
    }

    /// The confirmed line this intent targets, if any.
    #[must_use]
    pub const fn target_line(&self) -> Option<&LineId> {
        self.payload.target_line()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cart::snapshot::{LineCost, LineItem, Merchandise};
    use crate::types::CurrencyCode;

    fn cart_with_line(id: &str) -> CartSnapshot {
        let price = Money::parse("10.00", "USD").unwrap();
        CartSnapshot {
            lines: vec![LineItem {
                id: LineId::from(id),
                quantity: 1,
                merchandise: Merchandise {
                    id: "gid://shopify/ProductVariant/1".to_string(),
                    title: "Default Title".to_string(),
                    product_handle: "tee".to_string(),
                    product_title: "Tee".to_string(),
                    selected_options: vec![],
                    image_url: None,
                },
                cost: LineCost {
                    amount_per_quantity: price,
                    subtotal: price,
                    total: price,
                },
            }],
            total_quantity: 1,
            ..CartSnapshot::empty(CurrencyCode::USD)
        }
    }

    #[test]
    fn test_negative_quantity_rejected() {
        let cart = cart_with_line("L1");
        let result = CartAction::UpdateQuantity {
            line_id: LineId::from("L1"),
            quantity: -1,
        }
        .validate(&cart);
        assert_eq!(result, Err(ValidationError::NegativeQuantity(-1)));
    }

    #[test]
    fn test_quantity_too_large_rejected() {
        let cart = cart_with_line("L1");
        let quantity = i64::from(u32::MAX) + 1;
        let result = CartAction::UpdateQuantity {
            line_id: LineId::from("L1"),
            quantity,
        }
        .validate(&cart);
        assert_eq!(result, Err(ValidationError::QuantityTooLarge(quantity)));
    }

    #[test]
    fn test_update_to_zero_is_valid() {
        let cart = cart_with_line("L1");
        let payload = CartAction::UpdateQuantity {
            line_id: LineId::from("L1"),
            quantity: 0,
        }
        .validate(&cart)
        .unwrap();
        assert_eq!(payload.kind(), IntentKind::UpdateQuantity);
    }

    #[test]
    fn test_unknown_line_rejected() {
        let cart = cart_with_line("L1");
        let result = CartAction::Remove {
            line_id: LineId::from("L2"),
        }
        .validate(&cart);
        assert_eq!(result, Err(ValidationError::UnknownLine(LineId::from("L2"))));
    }

    #[test]
    fn test_optimistic_line_rejected() {
        let cart = cart_with_line("L1");
        let line_id = LineId::optimistic(IntentId::new(3));
        let result = CartAction::Remove {
            line_id: line_id.clone(),
        }
        .validate(&cart);
        assert_eq!(result, Err(ValidationError::OptimisticLine(line_id)));
    }

    #[test]
    fn test_add_requires_quantity_and_merchandise() {
        let cart = CartSnapshot::default();
        let zero = CartAction::Add {
            merchandise_id: "V1".to_string(),
            quantity: 0,
            preview: None,
        }
        .validate(&cart);
        assert_eq!(zero, Err(ValidationError::EmptyAdd));

        let blank = CartAction::Add {
            merchandise_id: "  ".to_string(),
            quantity: 1,
            preview: None,
        }
        .validate(&cart);
        assert_eq!(blank, Err(ValidationError::MissingMerchandise));
    }

    #[test]
    fn test_codes_are_normalized() {
        let cart = CartSnapshot::default();
        let discount = CartAction::ApplyDiscount {
            code: "  SUMMER10 ".to_string(),
        }
        .validate(&cart)
        .unwrap();
        assert_eq!(
            discount,
            IntentPayload::ApplyDiscount {
                code: "SUMMER10".to_string()
            }
        );

        let gift_card = CartAction::ApplyGiftCard {
            code: "abcd efgh 1234".to_string(),
        }
        .validate(&cart)
        .unwrap();
        assert_eq!(
            gift_card,
            IntentPayload::ApplyGiftCard {
                code: "abcdefgh1234".to_string()
            }
        );
    }

    #[test]
    fn test_blank_code_rejected() {
        let cart = CartSnapshot::default();
        let result = CartAction::ApplyGiftCard {
            code: "   ".to_string(),
        }
        .validate(&cart);
        assert_eq!(result, Err(ValidationError::EmptyCode));
    }

    #[test]
    fn test_update_and_remove_share_key() {
        let line = LineId::from("L1");
        let update = IntentPayload::UpdateQuantity {
            line_id: line.clone(),
            quantity: 2,
        };
        let remove = IntentPayload::Remove { line_id: line };
        assert_eq!(
            update.correlation_key(IntentId::new(1)),
            remove.correlation_key(IntentId::new(2))
        );
    }

    #[test]
    fn test_adds_never_share_key() {
        let add = IntentPayload::Add {
            merchandise_id: "V1".to_string(),
            quantity: 1,
            preview: None,
        };
        assert_ne!(
            add.correlation_key(IntentId::new(1)),
            add.correlation_key(IntentId::new(2))
        );
    }

    #[test]
    fn test_line_key_ignores_order() {
        let a = LineId::from("A");
        let b = LineId::from("B");
        assert_eq!(
            CorrelationKey::for_lines([&a, &b]),
            CorrelationKey::for_lines([&b, &a])
        );
        assert_eq!(CorrelationKey::for_lines([&a, &b]).as_str(), "lines-update:A,B");
    }

    #[test]
    fn test_discount_key_is_case_insensitive() {
        assert_eq!(
            CorrelationKey::for_discount("Summer10"),
            CorrelationKey::for_discount("SUMMER10")
        );
    }

    #[test]
    fn test_action_deserializes_from_tagged_json() {
        let action: CartAction = serde_json::from_str(
            r#"{"action":"update_quantity","line_id":"L1","quantity":3}"#,
        )
        .unwrap();
        assert_eq!(
            action,
            CartAction::UpdateQuantity {
                line_id: LineId::from("L1"),
                quantity: 3
            }
        );
    }
}
