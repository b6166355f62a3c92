//! Conversion from Storefront API wire types into core cart snapshots.

use cartsync_core::{
    AppliedGiftCard, CartSnapshot, DiscountCode, LineCost, LineId, LineItem, Merchandise, Money,
    SelectedOption,
};
use chrono::{DateTime, Utc};
use tracing::warn;
use url::Url;

use crate::shopify::ShopifyError;
use crate::shopify::types;

/// Convert a wire cart into an authoritative snapshot.
///
/// # Errors
///
/// Returns `ShopifyError::InvalidData` for unparseable amounts or quantities
/// that don't fit a cart line. Malformed timestamps and checkout URLs are
/// logged and dropped instead.
pub fn convert_cart(cart: types::Cart) -> Result<CartSnapshot, ShopifyError> {
    let lines = cart
        .lines
        .nodes
        .into_iter()
        .map(convert_line)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CartSnapshot {
        total_quantity: convert_quantity(cart.total_quantity)?,
        subtotal: convert_money(&cart.cost.subtotal_amount)?,
        checkout_url: cart.checkout_url.as_deref().and_then(parse_checkout_url),
        updated_at: cart.updated_at.as_deref().and_then(parse_timestamp),
        discount_codes: cart
            .discount_codes
            .into_iter()
            .map(|d| DiscountCode {
                code: d.code,
                applicable: d.applicable,
            })
            .collect(),
        applied_gift_cards: cart
            .applied_gift_cards
            .into_iter()
            .map(convert_gift_card)
            .collect::<Result<Vec<_>, _>>()?,
        id: Some(cart.id),
        lines,
    })
}

fn convert_line(line: types::CartLine) -> Result<LineItem, ShopifyError> {
    let merchandise = line.merchandise;
    Ok(LineItem {
        id: LineId::new(line.id),
        quantity: convert_quantity(line.quantity)?,
        cost: LineCost {
            amount_per_quantity: convert_money(&line.cost.amount_per_quantity)?,
            subtotal: convert_money(&line.cost.subtotal_amount)?,
            total: convert_money(&line.cost.total_amount)?,
        },
        merchandise: Merchandise {
            id: merchandise.id,
            title: merchandise.title,
            product_handle: merchandise.product.handle,
            product_title: merchandise.product.title,
            selected_options: merchandise
                .selected_options
                .into_iter()
                .map(|o| SelectedOption {
                    name: o.name,
                    value: o.value,
                })
                .collect(),
            image_url: merchandise.image.map(|image| image.url),
        },
    })
}

fn convert_gift_card(card: types::AppliedGiftCard) -> Result<AppliedGiftCard, ShopifyError> {
    Ok(AppliedGiftCard {
        id: card.id,
        last_characters: card.last_characters,
        amount_used: card.amount_used.as_ref().map(convert_money).transpose()?,
    })
}

fn convert_money(money: &types::Money) -> Result<Money, ShopifyError> {
    Money::parse(&money.amount, &money.currency_code)
        .map_err(|e| ShopifyError::InvalidData(e.to_string()))
}

fn convert_quantity(quantity: i64) -> Result<u32, ShopifyError> {
    u32::try_from(quantity)
        .map_err(|_| ShopifyError::InvalidData(format!("invalid quantity: {quantity}")))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(timestamp) => Some(timestamp.with_timezone(&Utc)),
        Err(e) => {
            warn!(value = %value, error = %e, "Ignoring malformed cart timestamp");
            None
        }
    }
}

fn parse_checkout_url(value: &str) -> Option<Url> {
    match Url::parse(value) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(value = %value, error = %e, "Ignoring malformed checkout URL");
            None
        }
    }
}
