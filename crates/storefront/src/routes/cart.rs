//! Cart route handlers.
//!
//! Cart operations use HTMX for dynamic updates without full page reloads.
//! Every mutation answers with the optimistic projection as soon as the cart
//! session has queued the intent; the Shopify call happens in the background
//! and the items fragment polls until nothing is pending.
//!
//! The cookie session holds a visitor ID (the cart session registry key) and
//! the Shopify cart ID once one exists.

use std::time::Duration;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Json,
    extract::{Path, State},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use cartsync_core::{CartAction, LineId, MerchandisePreview, Money, NoticeId};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::cart::{CartSession, CartView};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::session_keys;
use crate::state::AppState;

/// HTMX event fired after every cart change.
const CART_UPDATED_TRIGGER: (&str, &str) = ("HX-Trigger", "cart-updated");

/// How long checkout waits for pending changes to reach Shopify.
const CHECKOUT_SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Session Helpers
// =============================================================================

/// Get the visitor ID from the session, assigning one on first visit.
async fn visitor_id(session: &Session) -> Result<String> {
    if let Some(id) = session.get::<String>(session_keys::VISITOR_ID).await? {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    session.insert(session_keys::VISITOR_ID, &id).await?;
    Ok(id)
}

/// Get the cart ID from the session.
async fn get_cart_id(session: &Session) -> Option<String> {
    session
        .get::<String>(session_keys::CART_ID)
        .await
        .ok()
        .flatten()
}

/// Set the cart ID in the session.
async fn set_cart_id(
    session: &Session,
    cart_id: &str,
) -> std::result::Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CART_ID, cart_id).await
}

/// Get the visitor's cart session, starting it from the stored cart ID.
async fn open_cart(state: &AppState, session: &Session) -> Result<CartSession> {
    let visitor = visitor_id(session).await?;
    let cart_id = get_cart_id(session).await;
    Ok(state
        .cart_sessions()
        .get_or_start(&visitor, cart_id.as_deref())
        .await?)
}

/// Store the cart ID once Shopify has created the cart.
async fn remember_cart_id(session: &Session, view: &CartView) {
    let Some(cart_id) = view.cart.cart_id.as_deref() else {
        return;
    };
    if get_cart_id(session).await.as_deref() == Some(cart_id) {
        return;
    }
    if let Err(e) = set_cart_id(session, cart_id).await {
        tracing::error!("Failed to save cart ID to session: {e}");
    }
}

/// Queue an action and return the view that includes it.
async fn submit(cart: &CartSession, action: CartAction) -> Result<CartView> {
    let kind = action.kind();
    let pending = cart.submit(action)?.accepted().await?;

    let intent_id = pending.handle.id.to_string();
    debug!(intent_id = %intent_id, key = %pending.handle.key, "Queued cart action");
    add_breadcrumb(
        "cart",
        "Queued cart action",
        Some(&[("intent_id", intent_id.as_str()), ("action", kind.label())]),
    );

    Ok(cart.view())
}

// =============================================================================
// Forms
// =============================================================================

/// Add to cart form data.
///
/// The product fields are optional and only used to render the line before
/// Shopify confirms it.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub variant_id: String,
    pub quantity: Option<i64>,
    pub product_title: Option<String>,
    pub variant_title: Option<String>,
    pub handle: Option<String>,
    pub image_url: Option<String>,
    pub price: Option<String>,
    pub currency_code: Option<String>,
}

impl AddToCartForm {
    fn into_action(self) -> CartAction {
        let preview = self.product_title.map(|product_title| MerchandisePreview {
            product_title,
            variant_title: self.variant_title,
            product_handle: self.handle,
            selected_options: Vec::new(),
            image_url: self.image_url,
            price: self
                .price
                .zip(self.currency_code)
                .and_then(|(amount, currency)| Money::parse(&amount, &currency).ok()),
        });

        CartAction::Add {
            merchandise_id: self.variant_id,
            quantity: self.quantity.unwrap_or(1),
            preview,
        }
    }
}

/// Update cart form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub line_id: String,
    pub quantity: i64,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub line_id: String,
}

/// Discount or gift card code form data.
#[derive(Debug, Deserialize)]
pub struct CodeForm {
    pub code: String,
}

// =============================================================================
// Templates
// =============================================================================

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub view: CartView,
}

/// Cart items fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_items.html")]
pub struct CartItemsTemplate {
    pub view: CartView,
}

/// Cart count badge fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: u32,
}

/// Items fragment with the cart-updated trigger.
fn updated_items(view: CartView) -> Response {
    (
        AppendHeaders([CART_UPDATED_TRIGGER]),
        CartItemsTemplate { view },
    )
        .into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// Display cart page.
#[instrument(skip(state, session))]
pub async fn show(State(state): State<AppState>, session: Session) -> Result<CartShowTemplate> {
    let cart = open_cart(&state, &session).await?;
    let view = cart.view();
    remember_cart_id(&session, &view).await;
    Ok(CartShowTemplate { view })
}

/// Cart items fragment (HTMX polling while changes are pending).
#[instrument(skip(state, session))]
pub async fn items(State(state): State<AppState>, session: Session) -> Result<CartItemsTemplate> {
    let cart = open_cart(&state, &session).await?;
    let view = cart.view();
    remember_cart_id(&session, &view).await;
    Ok(CartItemsTemplate { view })
}

/// Projected cart and notices as JSON.
#[instrument(skip(state, session))]
pub async fn json(State(state): State<AppState>, session: Session) -> Result<Json<CartView>> {
    let cart = open_cart(&state, &session).await?;
    let view = cart.view();
    remember_cart_id(&session, &view).await;
    Ok(Json(view))
}

/// Add item to cart (HTMX).
///
/// The cart is created on Shopify by the first add if it doesn't exist yet.
/// Returns the count badge with an HTMX trigger so other elements refresh.
#[instrument(skip(state, session))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<AddToCartForm>,
) -> Result<Response> {
    let cart = open_cart(&state, &session).await?;
    let view = submit(&cart, form.into_action()).await?;

    Ok((
        AppendHeaders([CART_UPDATED_TRIGGER]),
        CartCountTemplate {
            count: view.cart.total_quantity,
        },
    )
        .into_response())
}

/// Update cart item quantity (HTMX). Quantity zero removes the line.
#[instrument(skip(state, session))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<UpdateCartForm>,
) -> Result<Response> {
    let cart = open_cart(&state, &session).await?;
    let view = submit(
        &cart,
        CartAction::UpdateQuantity {
            line_id: LineId::new(form.line_id),
            quantity: form.quantity,
        },
    )
    .await?;
    Ok(updated_items(view))
}

/// Remove item from cart (HTMX).
#[instrument(skip(state, session))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RemoveFromCartForm>,
) -> Result<Response> {
    let cart = open_cart(&state, &session).await?;
    let view = submit(
        &cart,
        CartAction::Remove {
            line_id: LineId::new(form.line_id),
        },
    )
    .await?;
    Ok(updated_items(view))
}

/// Apply a discount code (HTMX).
#[instrument(skip(state, session))]
pub async fn apply_discount(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CodeForm>,
) -> Result<Response> {
    let cart = open_cart(&state, &session).await?;
    let view = submit(&cart, CartAction::ApplyDiscount { code: form.code }).await?;
    Ok(updated_items(view))
}

/// Remove a discount code (HTMX).
#[instrument(skip(state, session))]
pub async fn remove_discount(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CodeForm>,
) -> Result<Response> {
    let cart = open_cart(&state, &session).await?;
    let view = submit(&cart, CartAction::RemoveDiscount { code: form.code }).await?;
    Ok(updated_items(view))
}

/// Apply a gift card (HTMX).
#[instrument(skip(state, session, form))]
pub async fn apply_gift_card(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CodeForm>,
) -> Result<Response> {
    let cart = open_cart(&state, &session).await?;
    let view = submit(&cart, CartAction::ApplyGiftCard { code: form.code }).await?;
    Ok(updated_items(view))
}

/// Dismiss an error notice (HTMX).
#[instrument(skip(state, session))]
pub async fn dismiss_notice(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<u64>,
) -> Result<CartItemsTemplate> {
    let cart = open_cart(&state, &session).await?;
    let notice_id = NoticeId::new(id);

    let mut view = cart.view();
    if !view.notices.iter().any(|notice| notice.id == notice_id) {
        return Err(AppError::NotFound(format!("notice {id}")));
    }
    cart.dismiss(notice_id)?;

    // The actor applies the dismissal on its next tick
    view.notices.retain(|notice| notice.id != notice_id);
    Ok(CartItemsTemplate { view })
}

/// Get cart count badge (HTMX).
#[instrument(skip(state, session))]
pub async fn count(State(state): State<AppState>, session: Session) -> Result<CartCountTemplate> {
    let cart = open_cart(&state, &session).await?;
    Ok(CartCountTemplate {
        count: cart.view().cart.total_quantity,
    })
}

/// Redirect to Shopify checkout.
///
/// Waits briefly for pending changes so checkout sees them; falls back to the
/// cart page when there is no checkout URL yet.
#[instrument(skip(state, session))]
pub async fn checkout(State(state): State<AppState>, session: Session) -> Result<Response> {
    let cart = open_cart(&state, &session).await?;

    let view = match tokio::time::timeout(CHECKOUT_SETTLE_TIMEOUT, cart.settled()).await {
        Ok(settled) => settled?,
        Err(_) => {
            warn!("Cart still has pending changes at checkout");
            cart.view()
        }
    };
    remember_cart_id(&session, &view).await;

    Ok(match view.cart.checkout_url.as_deref() {
        Some(url) if view.cart.has_items => Redirect::to(url).into_response(),
        _ => Redirect::to("/cart").into_response(),
    })
}
