//! Storefront API wire types for cart operations.
//!
//! These mirror the JSON returned by the `CartFields` fragment in
//! [`queries`](super::storefront::queries). Field names are camelCase on the
//! wire; amounts stay strings until converted into core [`Money`].
//!
//! [`Money`]: cartsync_core::Money

use serde::{Deserialize, Serialize};

// =============================================================================
// Price Types
// =============================================================================

/// Monetary value with currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    /// Decimal amount as string (preserves precision).
    pub amount: String,
    /// ISO 4217 currency code.
    pub currency_code: String,
}

// =============================================================================
// Merchandise Types
// =============================================================================

/// Product image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Image URL.
    pub url: String,
    /// Alt text for accessibility.
    pub alt_text: Option<String>,
}

/// Selected option on a variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedOption {
    /// Option name (e.g., "Size", "Color").
    pub name: String,
    /// Selected value (e.g., "Large", "Blue").
    pub value: String,
}

/// Product that a cart line's variant belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMerchandiseProduct {
    /// Product handle.
    pub handle: String,
    /// Product title.
    pub title: String,
}

/// Product variant in a cart line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMerchandise {
    /// Variant ID.
    pub id: String,
    /// Variant title.
    pub title: String,
    /// Selected options.
    #[serde(default)]
    pub selected_options: Vec<SelectedOption>,
    /// Variant image.
    pub image: Option<Image>,
    /// Parent product.
    pub product: CartMerchandiseProduct,
}

// =============================================================================
// Cart Types
// =============================================================================

/// Cost for a cart line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineCost {
    /// Price per unit.
    pub amount_per_quantity: Money,
    /// Subtotal (before discounts).
    pub subtotal_amount: Money,
    /// Total (after discounts).
    pub total_amount: Money,
}

/// A line item in the cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Cart line ID.
    pub id: String,
    /// Quantity.
    pub quantity: i64,
    /// Line cost.
    pub cost: CartLineCost,
    /// Product variant.
    pub merchandise: CartMerchandise,
}

/// Cart cost summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCost {
    /// Subtotal before tax/shipping.
    pub subtotal_amount: Money,
    /// Total amount.
    pub total_amount: Money,
}

/// Discount code applied to cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartDiscountCode {
    /// The discount code.
    pub code: String,
    /// Whether the code is applicable.
    pub applicable: bool,
}

/// Gift card applied to cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedGiftCard {
    /// Applied gift card ID.
    pub id: String,
    /// Last characters of the gift card code.
    pub last_characters: String,
    /// Amount used from the gift card.
    pub amount_used: Option<Money>,
}

/// Connection wrapper (`lines { nodes { ... } }`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nodes<T> {
    /// Items in the page.
    pub nodes: Vec<T>,
}

/// A shopping cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    /// Cart ID.
    pub id: String,
    /// Checkout URL.
    pub checkout_url: Option<String>,
    /// Last update timestamp (ISO 8601).
    pub updated_at: Option<String>,
    /// Total item quantity.
    pub total_quantity: i64,
    /// Cart cost summary.
    pub cost: CartCost,
    /// Cart lines.
    pub lines: Nodes<CartLine>,
    /// Discount codes.
    #[serde(default)]
    pub discount_codes: Vec<CartDiscountCode>,
    /// Applied gift cards.
    #[serde(default)]
    pub applied_gift_cards: Vec<AppliedGiftCard>,
}

/// User error from a cart mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartUserError {
    /// Field path that caused the error.
    pub field: Option<Vec<String>>,
    /// Error message.
    pub message: String,
    /// Error code (e.g., `MERCHANDISE_OUT_OF_STOCK`).
    pub code: Option<String>,
}

// =============================================================================
// Operation Payloads
// =============================================================================

/// Payload shared by every cart mutation.
///
/// Documents alias the mutation field to `result`, so one type covers
/// `cartCreate`, `cartLinesAdd`, and the rest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMutationPayload {
    /// Updated cart.
    pub cart: Option<Cart>,
    /// Business-rule failures.
    #[serde(default)]
    pub user_errors: Vec<CartUserError>,
}

/// Response data for cart mutations.
#[derive(Debug, Clone, Deserialize)]
pub struct CartMutationData {
    /// The aliased mutation field.
    pub result: Option<CartMutationPayload>,
}

/// Response data for the `cart` query.
#[derive(Debug, Clone, Deserialize)]
pub struct CartQueryData {
    /// The cart, if it still exists.
    pub cart: Option<Cart>,
}

// =============================================================================
// Input Types
// =============================================================================

/// Input for adding a line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineInput {
    /// Variant ID.
    pub merchandise_id: String,
    /// Quantity.
    pub quantity: i64,
}

/// Input for updating a line's quantity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineUpdateInput {
    /// Cart line ID.
    pub id: String,
    /// New quantity.
    pub quantity: i64,
}

/// Input for `cartCreate`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartInput {
    /// Initial lines.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<CartLineInput>,
    /// Initial discount codes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub discount_codes: Vec<String>,
    /// Initial gift card codes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gift_card_codes: Vec<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_deserializes_from_wire_json() {
        let json = serde_json::json!({
            "id": "gid://shopify/Cart/abc",
            "checkoutUrl": "https://shop.example.com/cart/c/abc",
            "updatedAt": "2026-01-05T10:00:00Z",
            "totalQuantity": 2,
            "cost": {
                "subtotalAmount": { "amount": "20.0", "currencyCode": "USD" },
                "totalAmount": { "amount": "21.5", "currencyCode": "USD" }
            },
            "lines": { "nodes": [{
                "id": "gid://shopify/CartLine/1",
                "quantity": 2,
                "cost": {
                    "amountPerQuantity": { "amount": "10.0", "currencyCode": "USD" },
                    "subtotalAmount": { "amount": "20.0", "currencyCode": "USD" },
                    "totalAmount": { "amount": "20.0", "currencyCode": "USD" }
                },
                "merchandise": {
                    "id": "gid://shopify/ProductVariant/9",
                    "title": "Small",
                    "selectedOptions": [{ "name": "Size", "value": "Small" }],
                    "image": null,
                    "product": { "handle": "tee", "title": "Tee" }
                }
            }]},
            "discountCodes": [{ "code": "WELCOME", "applicable": true }],
            "appliedGiftCards": []
        });

        let cart: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(cart.lines.nodes.len(), 1);
        assert_eq!(cart.lines.nodes[0].merchandise.product.handle, "tee");
        assert_eq!(cart.discount_codes[0].code, "WELCOME");
    }

    #[test]
    fn test_cart_input_skips_empty_lists() {
        let input = CartInput {
            discount_codes: vec!["SUMMER".to_string()],
            ..CartInput::default()
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json, serde_json::json!({ "discountCodes": ["SUMMER"] }));
    }
}
