//! Integration test support for Cartsync.
//!
//! [`FakeRemoteCart`] stands in for the Shopify Storefront API. Every
//! `apply` call is parked as a [`RemoteCall`] until the test answers it, so
//! tests decide exactly when and in which order responses arrive.
//!
//! ```rust,ignore
//! let (remote, mut calls) = FakeRemoteCart::create();
//! let session = CartSession::spawn(remote.clone(), CartSnapshot::default());
//!
//! let pending = session.submit(add("V1", 1))?.accepted().await?;
//! calls.next().await.succeed();
//! assert_eq!(pending.outcome().await?, IntentOutcome::Confirmed);
//! ```
//!
//! # Test Categories
//!
//! - `cart_session` - Session actor scenarios against gated responses
//! - `cart_registry` - Per-visitor session registry
//! - `cart_routes` - HTTP handlers end to end through the router

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use cartsync_core::{
    AppliedGiftCard, CartMutation, CartSnapshot, CurrencyCode, DiscountCode, LineCost, LineId,
    LineItem, Merchandise, Money,
};
use cartsync_storefront::cart::{RemoteCart, RemoteError};
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{mpsc, oneshot};
use url::Url;

/// How long [`RemoteCalls::next`] waits for a request.
const CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Scheduler turns given to the session before asserting silence.
const QUIET_TURNS: usize = 32;

/// Discount codes with this prefix come back as not applicable.
pub const EXPIRED_CODE_PREFIX: &str = "EXPIRED";

/// Price of variants that weren't registered with [`FakeRemoteCart::with_variant`].
const DEFAULT_PRICE: &str = "10.00";

// =============================================================================
// Server state
// =============================================================================

#[derive(Debug, Clone)]
struct Variant {
    product_title: String,
    price: Money,
}

#[derive(Debug, Clone)]
struct ServerLine {
    id: LineId,
    merchandise_id: String,
    quantity: u32,
}

/// The fake service's copy of one cart.
#[derive(Debug, Default)]
struct ServerCart {
    lines: Vec<ServerLine>,
    discount_codes: Vec<String>,
    gift_cards: Vec<String>,
    version: i64,
}

#[derive(Debug)]
struct FakeServer {
    carts: HashMap<String, ServerCart>,
    variants: HashMap<String, Variant>,
    next_cart: u64,
    next_line: u64,
    epoch: DateTime<Utc>,
}

impl FakeServer {
    fn new() -> Self {
        Self {
            carts: HashMap::new(),
            variants: HashMap::new(),
            next_cart: 1,
            next_line: 1,
            epoch: DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(20_000),
        }
    }

    fn variant(&self, merchandise_id: &str) -> Variant {
        self.variants
            .get(merchandise_id)
            .cloned()
            .unwrap_or_else(|| Variant {
                product_title: merchandise_id.to_string(),
                price: usd(DEFAULT_PRICE),
            })
    }

    fn create_cart(&mut self) -> String {
        let id = format!("gid://shopify/Cart/{}", self.next_cart);
        self.next_cart += 1;
        self.carts.insert(id.clone(), ServerCart::default());
        id
    }

    fn new_line_id(&mut self) -> LineId {
        let id = LineId::new(format!("gid://shopify/CartLine/{}", self.next_line));
        self.next_line += 1;
        id
    }

    fn apply(
        &mut self,
        cart_id: Option<&str>,
        mutation: &CartMutation,
    ) -> Result<CartSnapshot, RemoteError> {
        let cart_id = match cart_id {
            Some(id) if self.carts.contains_key(id) => id.to_string(),
            Some(_) => return Err(rejected("The specified cart does not exist.")),
            None => self.create_cart(),
        };

        let line_id = match mutation {
            CartMutation::AddLines { .. } => Some(self.new_line_id()),
            _ => None,
        };
        let cart = self
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| rejected("The specified cart does not exist."))?;

        match mutation {
            CartMutation::AddLines {
                merchandise_id,
                quantity,
            } => {
                if let Some(line) = cart
                    .lines
                    .iter_mut()
                    .find(|line| &line.merchandise_id == merchandise_id)
                {
                    line.quantity += quantity;
                } else if let Some(id) = line_id {
                    cart.lines.push(ServerLine {
                        id,
                        merchandise_id: merchandise_id.clone(),
                        quantity: *quantity,
                    });
                }
            }
            CartMutation::UpdateLines { line_id, quantity } => {
                let line = cart
                    .lines
                    .iter_mut()
                    .find(|line| &line.id == line_id)
                    .ok_or_else(|| rejected("The merchandise line does not exist."))?;
                line.quantity = *quantity;
                cart.lines.retain(|line| line.quantity > 0);
            }
            CartMutation::RemoveLines { line_ids } => {
                cart.lines.retain(|line| !line_ids.contains(&line.id));
            }
            CartMutation::UpdateDiscountCodes { codes } => {
                cart.discount_codes.clone_from(codes);
            }
            CartMutation::AddGiftCardCodes { codes } => {
                cart.gift_cards.extend(codes.iter().cloned());
            }
        }
        cart.version += 1;

        self.snapshot(&cart_id)
            .ok_or_else(|| rejected("The specified cart does not exist."))
    }

    fn snapshot(&self, cart_id: &str) -> Option<CartSnapshot> {
        let cart = self.carts.get(cart_id)?;

        let lines: Vec<LineItem> = cart
            .lines
            .iter()
            .map(|line| {
                let variant = self.variant(&line.merchandise_id);
                let total = variant.price.times(line.quantity);
                LineItem {
                    id: line.id.clone(),
                    quantity: line.quantity,
                    merchandise: Merchandise {
                        id: line.merchandise_id.clone(),
                        title: "Default Title".to_string(),
                        product_handle: variant.product_title.to_lowercase().replace(' ', "-"),
                        product_title: variant.product_title,
                        selected_options: Vec::new(),
                        image_url: None,
                    },
                    cost: LineCost {
                        amount_per_quantity: variant.price,
                        subtotal: total,
                        total,
                    },
                }
            })
            .collect();

        let subtotal = lines
            .iter()
            .try_fold(Money::zero(CurrencyCode::USD), |sum, line| {
                sum.checked_add(line.cost.subtotal)
            })
            .unwrap_or_else(|| Money::zero(CurrencyCode::USD));

        Some(CartSnapshot {
            id: Some(cart_id.to_string()),
            total_quantity: lines.iter().map(|line| line.quantity).sum(),
            lines,
            discount_codes: cart
                .discount_codes
                .iter()
                .map(|code| DiscountCode {
                    code: code.clone(),
                    applicable: !code.starts_with(EXPIRED_CODE_PREFIX),
                })
                .collect(),
            applied_gift_cards: cart
                .gift_cards
                .iter()
                .enumerate()
                .map(|(index, code)| AppliedGiftCard {
                    id: format!("gid://shopify/AppliedGiftCard/{index}"),
                    last_characters: last_chars(code, 4),
                    amount_used: None,
                })
                .collect(),
            checkout_url: Url::parse(&format!(
                "https://shop.example.com/checkouts/{}",
                cart_id.rsplit('/').next().unwrap_or_default()
            ))
            .ok(),
            subtotal,
            updated_at: Some(self.epoch + TimeDelta::seconds(cart.version)),
        })
    }
}

// =============================================================================
// Fake remote
// =============================================================================

/// In-memory [`RemoteCart`] whose responses are released by the test.
#[derive(Debug, Clone)]
pub struct FakeRemoteCart {
    server: Arc<Mutex<FakeServer>>,
    calls: mpsc::UnboundedSender<RemoteCall>,
}

/// Receiving end for the requests a [`FakeRemoteCart`] has parked.
#[derive(Debug)]
pub struct RemoteCalls {
    receiver: mpsc::UnboundedReceiver<RemoteCall>,
}

/// A request waiting for the test to answer it.
#[derive(Debug)]
pub struct RemoteCall {
    /// Cart the request targets, `None` when it creates the cart.
    pub cart_id: Option<String>,
    /// The mutation sent.
    pub mutation: CartMutation,
    server: Arc<Mutex<FakeServer>>,
    respond: oneshot::Sender<Result<CartSnapshot, RemoteError>>,
}

fn lock(server: &Mutex<FakeServer>) -> MutexGuard<'_, FakeServer> {
    server.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FakeRemoteCart {
    /// A fake remote with no carts.
    #[must_use]
    pub fn create() -> (Arc<Self>, RemoteCalls) {
        let (calls, receiver) = mpsc::unbounded_channel();
        let remote = Self {
            server: Arc::new(Mutex::new(FakeServer::new())),
            calls,
        };
        (Arc::new(remote), RemoteCalls { receiver })
    }

    /// Register a variant's title and price.
    pub fn with_variant(&self, merchandise_id: &str, product_title: &str, price: &str) {
        lock(&self.server).variants.insert(
            merchandise_id.to_string(),
            Variant {
                product_title: product_title.to_string(),
                price: usd(price),
            },
        );
    }

    /// Create a cart holding `lines` directly on the server.
    ///
    /// Returns the cart's snapshot. Line IDs are in the same order as `lines`.
    ///
    /// # Panics
    ///
    /// Panics if the fake server rejects one of the seed lines.
    #[must_use]
    pub fn seed_cart(&self, lines: &[(&str, u32)]) -> CartSnapshot {
        let mut server = lock(&self.server);
        let cart_id = server.create_cart();
        for (merchandise_id, quantity) in lines {
            let mutation = CartMutation::AddLines {
                merchandise_id: (*merchandise_id).to_string(),
                quantity: *quantity,
            };
            if let Err(err) = server.apply(Some(&cart_id), &mutation) {
                panic!("seeding cart failed: {err}");
            }
        }
        server
            .snapshot(&cart_id)
            .unwrap_or_else(|| panic!("seeded cart {cart_id} vanished"))
    }

    /// Current server-side state of a cart.
    #[must_use]
    pub fn server_cart(&self, cart_id: &str) -> Option<CartSnapshot> {
        lock(&self.server).snapshot(cart_id)
    }
}

#[async_trait]
impl RemoteCart for FakeRemoteCart {
    async fn fetch(&self, cart_id: &str) -> Result<Option<CartSnapshot>, RemoteError> {
        Ok(lock(&self.server).snapshot(cart_id))
    }

    async fn apply(
        &self,
        cart_id: Option<&str>,
        mutation: &CartMutation,
    ) -> Result<CartSnapshot, RemoteError> {
        let (respond, response) = oneshot::channel();
        self.calls
            .send(RemoteCall {
                cart_id: cart_id.map(str::to_string),
                mutation: mutation.clone(),
                server: Arc::clone(&self.server),
                respond,
            })
            .map_err(|_| RemoteError::Transport("fake remote closed".to_string()))?;

        response
            .await
            .map_err(|_| RemoteError::Transport("request dropped".to_string()))?
    }
}

impl RemoteCalls {
    /// Wait for the next parked request.
    ///
    /// # Panics
    ///
    /// Panics if no request arrives in time.
    pub async fn next(&mut self) -> RemoteCall {
        match tokio::time::timeout(CALL_TIMEOUT, self.receiver.recv()).await {
            Ok(Some(call)) => call,
            Ok(None) => panic!("fake remote closed"),
            Err(_) => panic!("no remote call within {CALL_TIMEOUT:?}"),
        }
    }

    /// Assert that nothing else has been sent.
    ///
    /// # Panics
    ///
    /// Panics if a request is waiting.
    pub async fn assert_quiet(&mut self) {
        for _ in 0..QUIET_TURNS {
            tokio::task::yield_now().await;
        }
        if let Ok(call) = self.receiver.try_recv() {
            panic!("unexpected remote call: {:?}", call.mutation);
        }
    }
}

impl RemoteCall {
    /// Apply the mutation on the server and return the resulting cart.
    ///
    /// A mutation the server refuses is answered with that rejection instead.
    pub fn succeed(self) -> Result<CartSnapshot, RemoteError> {
        let result = lock(&self.server).apply(self.cart_id.as_deref(), &self.mutation);
        let _ = self.respond.send(result.clone());
        result
    }

    /// Answer with a `userErrors` style rejection. The server is untouched.
    pub fn reject(self, message: &str) {
        let _ = self.respond.send(Err(rejected(message)));
    }

    /// Answer with a network failure. The server is untouched.
    pub fn fail_transport(self) {
        let _ = self
            .respond
            .send(Err(RemoteError::Transport("connection reset".to_string())));
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn usd(amount: &str) -> Money {
    Money::parse(amount, "USD").unwrap_or_else(|_| Money::zero(CurrencyCode::USD))
}

fn rejected(message: &str) -> RemoteError {
    RemoteError::Rejected {
        message: message.to_string(),
        field: None,
        code: Some("INVALID".to_string()),
    }
}

fn last_chars(code: &str, count: usize) -> String {
    let chars: Vec<char> = code.chars().collect();
    chars
        .get(chars.len().saturating_sub(count)..)
        .unwrap_or_default()
        .iter()
        .collect()
}
