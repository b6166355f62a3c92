//! Render-ready cart with pending intents applied.
//!
//! [`project`] is a pure function of the confirmed snapshot and the intent
//! queue. It starts from the snapshot's lines and replays every pending intent
//! in submission order:
//!
//! - `Add` appends a synthetic line with an optimistic ID
//! - `UpdateQuantity` overwrites the matching line's quantity
//! - `Remove` sets the quantity to zero (the line is hidden, not dropped)
//! - discount and gift card intents edit their sets by code equality
//!
//! Lines at quantity zero are left out of the visible list, and
//! `total_quantity` is always the sum of the visible quantities.

use serde::{Deserialize, Serialize};

use crate::cart::{CartSnapshot, DiscountCode, Intent, IntentPayload, LineItem, MerchandisePreview, SelectedOption};
use crate::types::{IntentId, LineId, Money};

/// Variant title Shopify uses for products without options.
const DEFAULT_VARIANT_TITLE: &str = "Default Title";

/// Shown where an amount can't be computed.
const UNKNOWN_AMOUNT: &str = "-";

/// Number of characters shown for a masked gift card.
const GIFT_CARD_VISIBLE_CHARS: usize = 4;

/// A visible line in the projected cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedLine {
    /// Line ID (optimistic for lines the server hasn't created yet).
    pub id: LineId,
    /// Whether the line only exists locally so far.
    pub is_optimistic: bool,
    /// Variant ID.
    pub merchandise_id: String,
    /// Product title.
    pub product_title: String,
    /// Variant title, omitted for single-variant products.
    pub variant_title: Option<String>,
    /// Product page URL with the selected options as query parameters.
    pub url: Option<String>,
    /// Image URL.
    pub image_url: Option<String>,
    /// Selected options.
    pub selected_options: Vec<SelectedOption>,
    /// Projected quantity (always > 0 for visible lines).
    pub quantity: u32,
    /// Unit price.
    pub unit_price: Option<Money>,
    /// Line price.
    pub line_price: Option<Money>,
    /// Formatted unit price.
    pub price_display: String,
    /// Formatted line price.
    pub line_price_display: String,
    /// Quantity the decrease button submits.
    pub prev_quantity: u32,
    /// Quantity the increase button submits.
    pub next_quantity: u32,
    /// Decrease is disabled at quantity 1 and for optimistic lines.
    pub decrease_disabled: bool,
    /// Increase is disabled for optimistic lines.
    pub increase_disabled: bool,
    /// Remove is disabled for optimistic lines.
    pub remove_disabled: bool,
}

/// The cart as the rendering layer should show it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedCart {
    /// Remote cart ID, if the cart exists yet.
    pub cart_id: Option<String>,
    /// Visible lines in display order.
    pub lines: Vec<ProjectedLine>,
    /// Sum of visible line quantities.
    pub total_quantity: u32,
    /// Subtotal, `None` when a projected line has no known price.
    pub subtotal: Option<Money>,
    /// Formatted subtotal.
    pub subtotal_display: String,
    /// Applicable discount codes.
    pub discount_codes: Vec<String>,
    /// Whether any applicable discount is present.
    pub with_discount: bool,
    /// Applied gift cards, masked (`***1234`).
    pub gift_cards: Vec<String>,
    /// Hosted checkout URL.
    pub checkout_url: Option<String>,
    /// Number of intents still waiting for the server.
    pub pending_intents: usize,
    /// Whether there is anything to check out.
    pub has_items: bool,
}

impl ProjectedCart {
    /// Find a visible line by ID.
    #[must_use]
    pub fn line(&self, id: &LineId) -> Option<&ProjectedLine> {
        self.lines.iter().find(|line| &line.id == id)
    }

    /// Whether the cart shows no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for ProjectedCart {
    fn default() -> Self {
        project(&CartSnapshot::default(), [])
    }
}

/// Line under construction while intents are replayed.
struct WorkingLine {
    line: ProjectedLine,
    /// Server costs, only trusted while the quantity is unchanged.
    confirmed: Option<(Money, Money)>,
    modified: bool,
}

impl WorkingLine {
    fn confirmed(item: &LineItem) -> Self {
        let merchandise = &item.merchandise;
        Self {
            line: ProjectedLine {
                id: item.id.clone(),
                is_optimistic: false,
                merchandise_id: merchandise.id.clone(),
                product_title: merchandise.product_title.clone(),
                variant_title: visible_variant_title(&merchandise.title),
                url: Some(variant_url(
                    &merchandise.product_handle,
                    &merchandise.selected_options,
                )),
                image_url: merchandise.image_url.clone(),
                selected_options: merchandise.selected_options.clone(),
                quantity: item.quantity,
                unit_price: Some(item.cost.amount_per_quantity),
                line_price: None,
                price_display: String::new(),
                line_price_display: String::new(),
                prev_quantity: 0,
                next_quantity: 0,
                decrease_disabled: false,
                increase_disabled: false,
                remove_disabled: false,
            },
            confirmed: Some((item.cost.subtotal, item.cost.total)),
            modified: false,
        }
    }

    fn optimistic(
        intent: IntentId,
        merchandise_id: &str,
        quantity: u32,
        preview: Option<&MerchandisePreview>,
    ) -> Self {
        let preview = preview.cloned().unwrap_or_default();
        let url = preview
            .product_handle
            .as_deref()
            .map(|handle| variant_url(handle, &preview.selected_options));
        Self {
            line: ProjectedLine {
                id: LineId::optimistic(intent),
                is_optimistic: true,
                merchandise_id: merchandise_id.to_string(),
                product_title: preview.product_title,
                variant_title: preview
                    .variant_title
                    .as_deref()
                    .and_then(visible_variant_title),
                url,
                image_url: preview.image_url,
                selected_options: preview.selected_options,
                quantity,
                unit_price: preview.price,
                line_price: None,
                price_display: String::new(),
                line_price_display: String::new(),
                prev_quantity: 0,
                next_quantity: 0,
                decrease_disabled: false,
                increase_disabled: false,
                remove_disabled: false,
            },
            confirmed: None,
            modified: true,
        }
    }

    /// Subtotal contribution and display price.
    fn prices(&self) -> (Option<Money>, Option<Money>) {
        match self.confirmed {
            Some((subtotal, total)) if !self.modified => (Some(subtotal), Some(total)),
            _ => {
                let computed = self.line.unit_price.map(|unit| unit.times(self.line.quantity));
                (computed, computed)
            }
        }
    }

    fn finish(mut self) -> (ProjectedLine, Option<Money>) {
        let (subtotal, line_price) = self.prices();
        let line = &mut self.line;
        line.line_price = line_price;
        line.price_display = display_amount(line.unit_price.as_ref());
        line.line_price_display = display_amount(line.line_price.as_ref());
        line.prev_quantity = line.quantity.saturating_sub(1);
        line.next_quantity = line.quantity.saturating_add(1);
        line.decrease_disabled = line.quantity <= 1 || line.is_optimistic;
        line.increase_disabled = line.is_optimistic;
        line.remove_disabled = line.is_optimistic;
        (self.line, subtotal)
    }
}

/// Project the confirmed snapshot with every pending intent applied.
///
/// Intents are replayed in iteration order, which must be submission order.
/// Confirmed and failed intents are skipped.
#[must_use]
pub fn project<'a>(
    snapshot: &CartSnapshot,
    intents: impl IntoIterator<Item = &'a Intent>,
) -> ProjectedCart {
    let mut lines: Vec<WorkingLine> = snapshot.lines.iter().map(WorkingLine::confirmed).collect();
    let mut discounts: Vec<DiscountCode> = snapshot.discount_codes.clone();
    let mut gift_cards: Vec<String> = snapshot
        .applied_gift_cards
        .iter()
        .map(|card| card.last_characters.clone())
        .collect();
    let mut lines_touched = false;
    let mut pending_intents = 0;

    for intent in intents.into_iter().filter(|intent| intent.status.is_pending()) {
        pending_intents += 1;
        lines_touched |= intent.payload.touches_lines();

        match &intent.payload {
            IntentPayload::Add {
                merchandise_id,
                quantity,
                preview,
            } => lines.push(WorkingLine::optimistic(
                intent.id,
                merchandise_id,
                *quantity,
                preview.as_ref(),
            )),
            IntentPayload::UpdateQuantity { line_id, quantity } => {
                set_quantity(&mut lines, line_id, *quantity);
            }
            IntentPayload::Remove { line_id } => set_quantity(&mut lines, line_id, 0),
            IntentPayload::ApplyDiscount { code } => {
                if !discounts.iter().any(|d| same_code(&d.code, code)) {
                    discounts.push(DiscountCode {
                        code: code.clone(),
                        applicable: true,
                    });
                }
            }
            IntentPayload::RemoveDiscount { code } => {
                discounts.retain(|d| !same_code(&d.code, code));
            }
            IntentPayload::ApplyGiftCard { code } => {
                let last = last_characters(code);
                if !gift_cards.iter().any(|c| same_code(c, &last)) {
                    gift_cards.push(last);
                }
            }
        }
    }

    let mut visible = Vec::with_capacity(lines.len());
    let mut line_subtotals = Vec::with_capacity(lines.len());
    for working in lines.into_iter().filter(|w| w.line.quantity > 0) {
        let (line, subtotal) = working.finish();
        visible.push(line);
        line_subtotals.push(subtotal);
    }

    let total_quantity = visible
        .iter()
        .fold(0_u32, |sum, line| sum.saturating_add(line.quantity));

    let subtotal = if lines_touched {
        line_subtotals
            .into_iter()
            .try_fold(Money::zero(snapshot.subtotal.currency_code), |acc, line| {
                acc.checked_add(line?)
            })
    } else {
        Some(snapshot.subtotal)
    };

    let discount_codes: Vec<String> = discounts
        .into_iter()
        .filter(|d| d.applicable)
        .map(|d| d.code)
        .collect();

    ProjectedCart {
        cart_id: snapshot.id.clone(),
        has_items: total_quantity > 0,
        lines: visible,
        total_quantity,
        subtotal_display: display_amount(subtotal.as_ref()),
        subtotal,
        with_discount: !discount_codes.is_empty(),
        discount_codes,
        gift_cards: gift_cards.iter().map(|last| format!("***{last}")).collect(),
        checkout_url: snapshot.checkout_url.as_ref().map(ToString::to_string),
        pending_intents,
    }
}

fn set_quantity(lines: &mut [WorkingLine], line_id: &LineId, quantity: u32) {
    if let Some(working) = lines.iter_mut().find(|w| &w.line.id == line_id) {
        working.line.quantity = quantity;
        working.modified = true;
    }
}

fn same_code(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn last_characters(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    let start = chars.len().saturating_sub(GIFT_CARD_VISIBLE_CHARS);
    chars.get(start..).map_or_else(String::new, |tail| tail.iter().collect())
}

fn visible_variant_title(title: &str) -> Option<String> {
    (title != DEFAULT_VARIANT_TITLE && !title.is_empty()).then(|| title.to_string())
}

fn variant_url(handle: &str, options: &[SelectedOption]) -> String {
    let params: Vec<String> = options
        .iter()
        .filter(|option| option.value != DEFAULT_VARIANT_TITLE)
        .map(|option| {
            format!(
                "{}={}",
                urlencoding::encode(&option.name),
                urlencoding::encode(&option.value)
            )
        })
        .collect();

    if params.is_empty() {
        format!("/products/{handle}")
    } else {
        format!("/products/{handle}?{}", params.join("&"))
    }
}

fn display_amount(money: Option<&Money>) -> String {
    money.map_or_else(|| UNKNOWN_AMOUNT.to_string(), Money::display)
}
