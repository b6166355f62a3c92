//! Remote cart service seam.
//!
//! [`RemoteCart`] is what a cart session talks to. [`ShopifyRemoteCart`] is the
//! production implementation over the Storefront API; tests substitute an
//! in-memory one.

use async_trait::async_trait;
use cartsync_core::{CartError, CartMutation, CartSnapshot};
use thiserror::Error;
use tracing::instrument;

use crate::shopify::conversions::convert_cart;
use crate::shopify::{CartInput, CartLineInput, CartLineUpdateInput, ShopifyError, StorefrontClient};

/// Why a remote cart call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Network, HTTP, GraphQL, or decoding failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service refused the mutation.
    #[error("rejected: {message}")]
    Rejected {
        /// Message safe to show the shopper.
        message: String,
        /// Input field path that caused the error.
        field: Option<Vec<String>>,
        /// Machine-readable error code.
        code: Option<String>,
    },
}

impl From<ShopifyError> for RemoteError {
    fn from(err: ShopifyError) -> Self {
        match err {
            ShopifyError::UserErrors(errors) => {
                let (field, code) = errors
                    .first()
                    .map(|e| (e.field.clone(), e.code.clone()))
                    .unwrap_or_default();
                let message = errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ");
                Self::Rejected {
                    message,
                    field,
                    code,
                }
            }
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<RemoteError> for CartError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Transport(message) => Self::Transport { message },
            RemoteError::Rejected {
                message,
                field,
                code,
            } => Self::ServerRejected {
                message,
                field,
                code,
            },
        }
    }
}

/// The authoritative cart store.
#[async_trait]
pub trait RemoteCart: Send + Sync {
    /// Load a cart by ID. `Ok(None)` when it no longer exists.
    async fn fetch(&self, cart_id: &str) -> Result<Option<CartSnapshot>, RemoteError>;

    /// Apply a mutation and return the resulting cart.
    ///
    /// With no `cart_id` the call creates the cart.
    async fn apply(
        &self,
        cart_id: Option<&str>,
        mutation: &CartMutation,
    ) -> Result<CartSnapshot, RemoteError>;
}

/// [`RemoteCart`] backed by the Shopify Storefront API.
#[derive(Clone)]
pub struct ShopifyRemoteCart {
    client: StorefrontClient,
}

impl ShopifyRemoteCart {
    /// Wrap a Storefront API client.
    #[must_use]
    pub const fn new(client: StorefrontClient) -> Self {
        Self { client }
    }

    async fn create(&self, mutation: &CartMutation) -> Result<CartSnapshot, RemoteError> {
        let input = create_input(mutation).ok_or_else(|| RemoteError::Rejected {
            message: "The cart no longer exists.".to_string(),
            field: None,
            code: Some("INVALID".to_string()),
        })?;
        let cart = self.client.create_cart(input).await?;
        Ok(convert_cart(cart)?)
    }
}

#[async_trait]
impl RemoteCart for ShopifyRemoteCart {
    #[instrument(skip(self))]
    async fn fetch(&self, cart_id: &str) -> Result<Option<CartSnapshot>, RemoteError> {
        match self.client.get_cart(cart_id).await {
            Ok(cart) => Ok(Some(convert_cart(cart)?)),
            Err(ShopifyError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self, mutation), fields(operation = mutation.operation()))]
    async fn apply(
        &self,
        cart_id: Option<&str>,
        mutation: &CartMutation,
    ) -> Result<CartSnapshot, RemoteError> {
        let Some(cart_id) = cart_id else {
            return self.create(mutation).await;
        };

        let cart = match mutation {
            CartMutation::AddLines {
                merchandise_id,
                quantity,
            } => {
                self.client
                    .add_lines(
                        cart_id,
                        vec![CartLineInput {
                            merchandise_id: merchandise_id.clone(),
                            quantity: i64::from(*quantity),
                        }],
                    )
                    .await?
            }
            CartMutation::UpdateLines { line_id, quantity } => {
                self.client
                    .update_lines(
                        cart_id,
                        vec![CartLineUpdateInput {
                            id: line_id.to_string(),
                            quantity: i64::from(*quantity),
                        }],
                    )
                    .await?
            }
            CartMutation::RemoveLines { line_ids } => {
                self.client
                    .remove_lines(cart_id, line_ids.iter().map(ToString::to_string).collect())
                    .await?
            }
            CartMutation::UpdateDiscountCodes { codes } => {
                self.client
                    .update_discount_codes(cart_id, codes.clone())
                    .await?
            }
            CartMutation::AddGiftCardCodes { codes } => {
                self.client
                    .update_gift_card_codes(cart_id, codes.clone())
                    .await?
            }
        };

        Ok(convert_cart(cart)?)
    }
}

/// `cartCreate` input carrying the first mutation. Line updates and removals
/// need an existing cart.
fn create_input(mutation: &CartMutation) -> Option<CartInput> {
    match mutation {
        CartMutation::AddLines {
            merchandise_id,
            quantity,
        } => Some(CartInput {
            lines: vec![CartLineInput {
                merchandise_id: merchandise_id.clone(),
                quantity: i64::from(*quantity),
            }],
            ..CartInput::default()
        }),
        CartMutation::UpdateDiscountCodes { codes } => Some(CartInput {
            discount_codes: codes.clone(),
            ..CartInput::default()
        }),
        CartMutation::AddGiftCardCodes { codes } => Some(CartInput {
            gift_card_codes: codes.clone(),
            ..CartInput::default()
        }),
        CartMutation::UpdateLines { .. } | CartMutation::RemoveLines { .. } => None,
    }
}
