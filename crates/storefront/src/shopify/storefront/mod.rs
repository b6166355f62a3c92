//! Shopify Storefront API client implementation.
//!
//! Cart documents live in [`queries`]; requests and responses use the
//! `graphql_client` envelope ([`QueryBody`], [`Response`]) over `reqwest`.

pub mod conversions;
pub mod queries;

use std::sync::Arc;
use std::time::Duration;

use graphql_client::{QueryBody, Response};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::config::ShopifyStorefrontConfig;
use crate::shopify::types::{
    Cart, CartInput, CartLineInput, CartLineUpdateInput, CartMutationData, CartQueryData,
};
use crate::shopify::{GraphQLError, GraphQLErrorLocation, ShopifyError};

/// Timeout for a single Storefront API request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum characters of a response body included in logs.
const LOG_BODY_LIMIT: usize = 500;

// =============================================================================
// Variables
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetCartVariables<'a> {
    cart_id: &'a str,
}

#[derive(Serialize)]
struct CartCreateVariables {
    input: CartInput,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LinesVariables<'a, L> {
    cart_id: &'a str,
    lines: L,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LineIdsVariables<'a> {
    cart_id: &'a str,
    line_ids: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DiscountCodesVariables<'a> {
    cart_id: &'a str,
    discount_codes: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GiftCardCodesVariables<'a> {
    cart_id: &'a str,
    gift_card_codes: Vec<String>,
}

// =============================================================================
// StorefrontClient
// =============================================================================

/// Client for the Shopify Storefront API cart operations.
#[derive(Clone)]
pub struct StorefrontClient {
    inner: Arc<StorefrontClientInner>,
}

struct StorefrontClientInner {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl StorefrontClient {
    /// Create a new Storefront API client.
    #[must_use]
    pub fn new(config: &ShopifyStorefrontConfig) -> Self {
        let endpoint = format!(
            "https://{}/api/{}/graphql.json",
            config.store, config.api_version
        );

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            inner: Arc::new(StorefrontClientInner {
                client,
                endpoint,
                access_token: config.storefront_private_token.expose_secret().to_string(),
            }),
        }
    }

    /// Execute a GraphQL document.
    async fn execute<V, T>(
        &self,
        operation_name: &'static str,
        query: &'static str,
        variables: V,
    ) -> Result<T, ShopifyError>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        let request_body = QueryBody {
            variables,
            query,
            operation_name,
        };

        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            // Private access tokens use a different header than public tokens
            .header(
                "Shopify-Storefront-Private-Token",
                &self.inner.access_token,
            )
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ShopifyError::RateLimited(retry_after));
        }

        // Body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                operation = operation_name,
                body = %truncate(&response_text, LOG_BODY_LIMIT),
                "Shopify API returned non-success status"
            );
            return Err(ShopifyError::GraphQL(vec![GraphQLError::message(format!(
                "HTTP {status}: {}",
                truncate(&response_text, 200)
            ))]));
        }

        let response: Response<T> = match serde_json::from_str(&response_text) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    operation = operation_name,
                    body = %truncate(&response_text, LOG_BODY_LIMIT),
                    "Failed to parse Shopify GraphQL response"
                );
                return Err(ShopifyError::Parse(e));
            }
        };

        if let Some(errors) = response.errors
            && !errors.is_empty()
        {
            debug!(errors = ?errors, operation = operation_name, "GraphQL errors in response");

            return Err(ShopifyError::GraphQL(
                errors.into_iter().map(convert_graphql_error).collect(),
            ));
        }

        response.data.ok_or_else(|| {
            tracing::error!(
                operation = operation_name,
                body = %truncate(&response_text, LOG_BODY_LIMIT),
                "Shopify GraphQL response has no data and no errors"
            );
            ShopifyError::GraphQL(vec![GraphQLError::message("No data in response")])
        })
    }

    /// Execute a cart mutation and unwrap its payload.
    async fn mutate<V: Serialize>(
        &self,
        operation_name: &'static str,
        query: &'static str,
        variables: V,
    ) -> Result<Cart, ShopifyError> {
        let data: CartMutationData = self.execute(operation_name, query, variables).await?;

        let Some(result) = data.result else {
            return Err(ShopifyError::GraphQL(vec![GraphQLError::message(format!(
                "{operation_name} returned no payload"
            ))]));
        };

        if !result.user_errors.is_empty() {
            return Err(ShopifyError::UserErrors(result.user_errors));
        }

        result.cart.ok_or_else(|| {
            ShopifyError::GraphQL(vec![GraphQLError::message(format!(
                "{operation_name} returned no cart"
            ))])
        })
    }

    // =========================================================================
    // Cart Methods
    // =========================================================================

    /// Get an existing cart.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::NotFound` if the cart has expired or never
    /// existed, or another error if the API request fails.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn get_cart(&self, cart_id: &str) -> Result<Cart, ShopifyError> {
        let data: CartQueryData = self
            .execute(
                queries::GET_CART_OPERATION,
                queries::GET_CART,
                GetCartVariables { cart_id },
            )
            .await?;

        data.cart
            .ok_or_else(|| ShopifyError::NotFound(format!("Cart not found: {cart_id}")))
    }

    /// Create a new cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart creation fails or user errors are returned.
    #[instrument(skip(self, input))]
    pub async fn create_cart(&self, input: CartInput) -> Result<Cart, ShopifyError> {
        self.mutate(
            queries::CART_CREATE_OPERATION,
            queries::CART_CREATE,
            CartCreateVariables { input },
        )
        .await
    }

    /// Add lines to a cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart update fails or user errors are returned.
    #[instrument(skip(self, lines), fields(cart_id = %cart_id))]
    pub async fn add_lines(
        &self,
        cart_id: &str,
        lines: Vec<CartLineInput>,
    ) -> Result<Cart, ShopifyError> {
        self.mutate(
            queries::CART_LINES_ADD_OPERATION,
            queries::CART_LINES_ADD,
            LinesVariables { cart_id, lines },
        )
        .await
    }

    /// Update cart line quantities.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart update fails or user errors are returned.
    #[instrument(skip(self, lines), fields(cart_id = %cart_id))]
    pub async fn update_lines(
        &self,
        cart_id: &str,
        lines: Vec<CartLineUpdateInput>,
    ) -> Result<Cart, ShopifyError> {
        self.mutate(
            queries::CART_LINES_UPDATE_OPERATION,
            queries::CART_LINES_UPDATE,
            LinesVariables { cart_id, lines },
        )
        .await
    }

    /// Remove lines from a cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart update fails or user errors are returned.
    #[instrument(skip(self, line_ids), fields(cart_id = %cart_id))]
    pub async fn remove_lines(
        &self,
        cart_id: &str,
        line_ids: Vec<String>,
    ) -> Result<Cart, ShopifyError> {
        self.mutate(
            queries::CART_LINES_REMOVE_OPERATION,
            queries::CART_LINES_REMOVE,
            LineIdsVariables { cart_id, line_ids },
        )
        .await
    }

    /// Replace the discount codes on a cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart update fails or user errors are returned.
    #[instrument(skip(self, discount_codes), fields(cart_id = %cart_id))]
    pub async fn update_discount_codes(
        &self,
        cart_id: &str,
        discount_codes: Vec<String>,
    ) -> Result<Cart, ShopifyError> {
        self.mutate(
            queries::CART_DISCOUNT_CODES_UPDATE_OPERATION,
            queries::CART_DISCOUNT_CODES_UPDATE,
            DiscountCodesVariables {
                cart_id,
                discount_codes,
            },
        )
        .await
    }

    /// Apply gift card codes to a cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart update fails or user errors are returned.
    #[instrument(skip(self, gift_card_codes), fields(cart_id = %cart_id))]
    pub async fn update_gift_card_codes(
        &self,
        cart_id: &str,
        gift_card_codes: Vec<String>,
    ) -> Result<Cart, ShopifyError> {
        self.mutate(
            queries::CART_GIFT_CARD_CODES_UPDATE_OPERATION,
            queries::CART_GIFT_CARD_CODES_UPDATE,
            GiftCardCodesVariables {
                cart_id,
                gift_card_codes,
            },
        )
        .await
    }
}

fn convert_graphql_error(error: graphql_client::Error) -> GraphQLError {
    GraphQLError {
        message: error.message,
        locations: error.locations.map_or_else(Vec::new, |locs| {
            locs.into_iter()
                .map(|l| GraphQLErrorLocation {
                    line: i64::from(l.line),
                    column: i64::from(l.column),
                })
                .collect()
        }),
        path: error.path.map_or_else(Vec::new, |p| {
            p.into_iter()
                .map(|fragment| match fragment {
                    graphql_client::PathFragment::Key(s) => serde_json::Value::String(s),
                    graphql_client::PathFragment::Index(i) => serde_json::Value::Number(i.into()),
                })
                .collect()
        }),
    }
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_graphql_error() {
        let error: graphql_client::Error = serde_json::from_value(serde_json::json!({
            "message": "Variable $cartId of type ID! was provided invalid value",
            "locations": [{ "line": 1, "column": 19 }],
            "path": ["cart", 0]
        }))
        .unwrap();

        let converted = convert_graphql_error(error);
        assert_eq!(converted.locations.len(), 1);
        assert_eq!(converted.locations[0].line, 1);
        assert_eq!(
            converted.path,
            vec![
                serde_json::Value::String("cart".to_string()),
                serde_json::Value::Number(0.into())
            ]
        );
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
