//! Optimistic cart reconciler.
//!
//! The [`Reconciler`] owns the last server-confirmed [`CartSnapshot`] and an
//! ordered queue of local [`Intent`]s. It is a synchronous state machine: the
//! caller feeds it shopper actions and server answers, and asks it which
//! requests to send next. It never performs I/O itself.
//!
//! # Correlation keys
//!
//! Every intent has a [`CorrelationKey`]. Per key the reconciler tracks the
//! *current* intent (the only one that may still be confirmed) and the intent
//! whose request is *in flight*. Submitting a new intent for a key supersedes
//! the current one: it is dropped from the queue right away, and if its
//! request is already on the wire, the eventual answer still refreshes the
//! baseline but never confirms it or surfaces its error.
//!
//! # Dispatch
//!
//! [`Reconciler::take_dispatchable`] hands out at most one request per key.
//! Callers invoke it once per tick, after applying every queued action, so an
//! increase followed immediately by a decrease only ever sends the decrease.
//! While no remote cart exists yet, only one request is in flight at a time so
//! that concurrent first mutations don't create several carts. Discount code
//! updates replace the whole set, so at most one of them is in flight across
//! all discount keys, and its code list is built when it is dispatched.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, warn};

use crate::cart::{
    CartAction, CartError, CartMutation, CartNotice, CartSnapshot, CorrelationKey, Intent,
    IntentPayload, ValidationError,
};
use crate::projection::{ProjectedCart, project};
use crate::types::{IntentId, IntentStatus, NoticeId};

/// Undismissed notices kept per cart; the oldest are dropped first.
const MAX_NOTICES: usize = 8;

// =============================================================================
// Public types
// =============================================================================

/// Handle returned for an accepted intent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntentHandle {
    /// The intent's ID.
    pub id: IntentId,
    /// The intent's correlation key.
    pub key: CorrelationKey,
}

/// A request the caller should send to the remote cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Intent the request carries.
    pub intent_id: IntentId,
    /// Key to report back with the response or error.
    pub key: CorrelationKey,
    /// Wire-level mutation.
    pub mutation: CartMutation,
    /// Remote cart ID, `None` when the request has to create the cart.
    pub cart_id: Option<String>,
}

/// How an intent ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentOutcome {
    /// The server applied it.
    Confirmed,
    /// The server or the transport refused it.
    Failed(CartError),
    /// A newer intent with the same key replaced it.
    Superseded,
}

/// Change notification for subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartEvent {
    /// The projected cart changed.
    Projected,
    /// A new error notice was recorded.
    Notice(CartNotice),
    /// An intent reached its final outcome.
    Resolved {
        /// The intent.
        intent_id: IntentId,
        /// Its outcome.
        outcome: IntentOutcome,
    },
}

/// Per-key bookkeeping.
#[derive(Debug, Default)]
struct KeySlot {
    /// Latest intent for the key that hasn't settled.
    current: Option<IntentId>,
    /// Intent whose request is on the wire.
    in_flight: Option<IntentId>,
}

impl KeySlot {
    const fn is_idle(&self) -> bool {
        self.current.is_none() && self.in_flight.is_none()
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Tracks pending cart changes on top of the confirmed snapshot.
#[derive(Debug)]
pub struct Reconciler {
    snapshot: CartSnapshot,
    intents: Vec<Intent>,
    slots: HashMap<CorrelationKey, KeySlot>,
    notices: Vec<CartNotice>,
    events: Vec<CartEvent>,
    projection: ProjectedCart,
    next_intent: IntentId,
    next_notice: NoticeId,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(CartSnapshot::default())
    }
}

impl Reconciler {
    /// Start from a confirmed snapshot (use [`CartSnapshot::empty`] when no
    /// remote cart exists yet).
    #[must_use]
    pub fn new(snapshot: CartSnapshot) -> Self {
        let projection = project(&snapshot, []);
        Self {
            snapshot,
            intents: Vec::new(),
            slots: HashMap::new(),
            notices: Vec::new(),
            events: Vec::new(),
            projection,
            next_intent: IntentId::new(1),
            next_notice: NoticeId::new(1),
        }
    }

    // -------------------------------------------------------------------------
    // Shopper actions
    // -------------------------------------------------------------------------

    /// Validate and queue a shopper action.
    ///
    /// Any outstanding intent with the same correlation key is superseded.
    /// The projection is recomputed before this returns.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the action is malformed or targets a
    /// line that isn't in the confirmed cart. Nothing is queued in that case.
    pub fn submit(&mut self, action: CartAction) -> Result<IntentHandle, ValidationError> {
        let payload = action.validate(&self.snapshot)?;

        let id = self.next_intent;
        self.next_intent = id.next();

        let intent = Intent::new(id, payload, Utc::now());
        let key = intent.correlation_key.clone();

        let slot = self.slots.entry(key.clone()).or_default();
        let superseded = slot.current.replace(id);

        if let Some(previous) = superseded {
            self.intents.retain(|queued| queued.id != previous);
            debug!(intent_id = %previous, superseded_by = %id, key = %key, "Intent superseded");
            self.events.push(CartEvent::Resolved {
                intent_id: previous,
                outcome: IntentOutcome::Superseded,
            });
        }

        debug!(intent_id = %id, kind = intent.kind().label(), key = %key, "Intent queued");
        self.intents.push(intent);
        self.refresh();

        Ok(IntentHandle { id, key })
    }

    /// Dismiss a notice. Returns whether it existed.
    pub fn dismiss(&mut self, notice_id: NoticeId) -> bool {
        let before = self.notices.len();
        self.notices.retain(|notice| notice.id != notice_id);
        self.notices.len() != before
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    /// Hand out the requests that may be sent now.
    ///
    /// An intent is dispatchable when it is pending, hasn't been sent, and no
    /// request for its key is in flight. Discount intents additionally wait
    /// for any other discount request to come back. Returned intents are marked in flight
    /// until [`on_server_response`](Self::on_server_response) or
    /// [`on_server_error`](Self::on_server_error) reports back for their key.
    pub fn take_dispatchable(&mut self) -> Vec<Dispatch> {
        let creating_cart = self.snapshot.id.is_none();
        if creating_cart && self.slots.values().any(|slot| slot.in_flight.is_some()) {
            return Vec::new();
        }

        let ready: Vec<IntentId> = self
            .intents
            .iter()
            .filter(|intent| intent.status.is_pending() && !intent.dispatched)
            .filter(|intent| {
                self.slots
                    .get(&intent.correlation_key)
                    .is_none_or(|slot| slot.in_flight.is_none())
            })
            .map(|intent| intent.id)
            .collect();

        let mut discount_busy = self
            .slots
            .iter()
            .any(|(key, slot)| key.is_discount() && slot.in_flight.is_some());

        let mut dispatches = Vec::with_capacity(ready.len());
        for id in ready {
            let is_discount = self
                .intent(id)
                .is_some_and(|intent| intent.correlation_key.is_discount());
            if is_discount && discount_busy {
                continue;
            }
            let Some(dispatch) = self.dispatch(id) else {
                continue;
            };
            discount_busy |= is_discount;
            debug!(
                intent_id = %dispatch.intent_id,
                key = %dispatch.key,
                operation = dispatch.mutation.operation(),
                "Dispatching intent"
            );
            dispatches.push(dispatch);
            if creating_cart {
                break;
            }
        }
        dispatches
    }

    fn dispatch(&mut self, id: IntentId) -> Option<Dispatch> {
        let mutation = self.mutation_for(id)?;
        let intent = self.intents.iter_mut().find(|intent| intent.id == id)?;
        intent.dispatched = true;

        let key = intent.correlation_key.clone();
        self.slots.entry(key.clone()).or_default().in_flight = Some(id);

        Some(Dispatch {
            intent_id: id,
            key,
            mutation,
            cart_id: self.snapshot.id.clone(),
        })
    }

    fn mutation_for(&self, id: IntentId) -> Option<CartMutation> {
        let intent = self.intents.iter().find(|intent| intent.id == id)?;
        let mutation = match &intent.payload {
            IntentPayload::Add {
                merchandise_id,
                quantity,
                ..
            } => CartMutation::AddLines {
                merchandise_id: merchandise_id.clone(),
                quantity: *quantity,
            },
            IntentPayload::UpdateQuantity { line_id, quantity: 0 }
            | IntentPayload::Remove { line_id } => CartMutation::RemoveLines {
                line_ids: vec![line_id.clone()],
            },
            IntentPayload::UpdateQuantity { line_id, quantity } => CartMutation::UpdateLines {
                line_id: line_id.clone(),
                quantity: *quantity,
            },
            IntentPayload::ApplyDiscount { .. } | IntentPayload::RemoveDiscount { .. } => {
                CartMutation::UpdateDiscountCodes {
                    codes: self.discount_codes_through(id),
                }
            }
            IntentPayload::ApplyGiftCard { code } => CartMutation::AddGiftCardCodes {
                codes: vec![code.clone()],
            },
        };
        Some(mutation)
    }

    /// Full discount code list after replaying pending discount intents up to
    /// and including `id`. Shopify replaces the whole set on every update.
    fn discount_codes_through(&self, id: IntentId) -> Vec<String> {
        let mut codes: Vec<String> = self
            .snapshot
            .discount_codes
            .iter()
            .map(|discount| discount.code.clone())
            .collect();

        for intent in self.intents.iter().filter(|i| i.status.is_pending()) {
            match &intent.payload {
                IntentPayload::ApplyDiscount { code } => {
                    if !codes.iter().any(|c| c.eq_ignore_ascii_case(code)) {
                        codes.push(code.clone());
                    }
                }
                IntentPayload::RemoveDiscount { code } => {
                    codes.retain(|c| !c.eq_ignore_ascii_case(code));
                }
                _ => {}
            }
            if intent.id == id {
                break;
            }
        }
        codes
    }

    // -------------------------------------------------------------------------
    // Server answers
    // -------------------------------------------------------------------------

    /// Merge an authoritative snapshot.
    ///
    /// Intents settled earlier are purged first. Then the in-flight intent of
    /// every key in `affected` is confirmed, unless it was superseded, and the
    /// key's in-flight slot is freed. The snapshot replaces the baseline
    /// unless it is strictly older than the current one.
    pub fn on_server_response(&mut self, snapshot: CartSnapshot, affected: &[CorrelationKey]) {
        self.intents.retain(|intent| intent.status.is_pending());

        for key in affected {
            let Some(slot) = self.slots.get_mut(key) else {
                debug!(key = %key, "Response for idle key");
                continue;
            };
            let Some(in_flight) = slot.in_flight.take() else {
                continue;
            };
            if slot.current != Some(in_flight) {
                debug!(intent_id = %in_flight, key = %key, "Superseded request completed");
                continue;
            }
            slot.current = None;

            if let Some(intent) = self.intents.iter_mut().find(|i| i.id == in_flight) {
                intent.status = IntentStatus::Confirmed;
            }
            debug!(intent_id = %in_flight, key = %key, "Intent confirmed");
            self.events.push(CartEvent::Resolved {
                intent_id: in_flight,
                outcome: IntentOutcome::Confirmed,
            });
        }
        self.slots.retain(|_, slot| !slot.is_idle());

        if snapshot.is_older_than(&self.snapshot) {
            warn!(
                incoming = ?snapshot.updated_at,
                current = ?self.snapshot.updated_at,
                "Ignoring stale cart snapshot"
            );
        } else {
            self.snapshot = snapshot;
        }

        self.refresh();
    }

    /// Fail the in-flight intent for `key`.
    ///
    /// A notice is recorded and emitted once. Errors for superseded requests
    /// only free the key.
    pub fn on_server_error(&mut self, key: &CorrelationKey, error: CartError) {
        let Some(slot) = self.slots.get_mut(key) else {
            warn!(key = %key, error = %error, "Error for idle key");
            return;
        };
        let Some(in_flight) = slot.in_flight.take() else {
            warn!(key = %key, error = %error, "Error without a request in flight");
            return;
        };

        if slot.current == Some(in_flight) {
            slot.current = None;
            self.fail(in_flight, error);
        } else {
            debug!(intent_id = %in_flight, key = %key, error = %error, "Superseded request failed");
        }
        self.slots.retain(|_, slot| !slot.is_idle());

        self.refresh();
    }

    fn fail(&mut self, id: IntentId, error: CartError) {
        let Some(intent) = self.intents.iter_mut().find(|intent| intent.id == id) else {
            return;
        };
        intent.status = IntentStatus::Failed;

        let notice_id = self.next_notice;
        self.next_notice = notice_id.next();
        let notice = CartNotice::for_failure(notice_id, id, intent.kind(), &error);

        warn!(
            intent_id = %id,
            kind = intent.kind().label(),
            retryable = notice.retryable,
            error = %error,
            "Intent failed"
        );

        self.notices.push(notice.clone());
        if let Some(overflow) = self.notices.len().checked_sub(MAX_NOTICES) {
            self.notices.drain(..overflow);
        }
        self.events.push(CartEvent::Notice(notice));
        self.events.push(CartEvent::Resolved {
            intent_id: id,
            outcome: IntentOutcome::Failed(error),
        });
    }

    fn refresh(&mut self) {
        let projection = project(&self.snapshot, &self.intents);
        if projection != self.projection {
            self.projection = projection;
            self.events.push(CartEvent::Projected);
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// The confirmed cart with every pending intent applied.
    #[must_use]
    pub const fn project(&self) -> &ProjectedCart {
        &self.projection
    }

    /// The last confirmed snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> &CartSnapshot {
        &self.snapshot
    }

    /// Status of an intent, `None` once it is superseded or purged.
    #[must_use]
    pub fn status(&self, id: IntentId) -> Option<IntentStatus> {
        self.intent(id).map(|intent| intent.status)
    }

    /// Look up a queued intent.
    #[must_use]
    pub fn intent(&self, id: IntentId) -> Option<&Intent> {
        self.intents.iter().find(|intent| intent.id == id)
    }

    /// Notices not yet dismissed, oldest first. Only the newest
    /// `MAX_NOTICES` are kept.
    #[must_use]
    pub fn notices(&self) -> &[CartNotice] {
        &self.notices
    }

    /// Drain the events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<CartEvent> {
        std::mem::take(&mut self.events)
    }

    /// Number of intents waiting for the server.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.intents
            .iter()
            .filter(|intent| intent.status.is_pending())
            .count()
    }

    /// Whether a request for `key` is in flight.
    #[must_use]
    pub fn is_in_flight(&self, key: &CorrelationKey) -> bool {
        self.slots
            .get(key)
            .is_some_and(|slot| slot.in_flight.is_some())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::cart::{DiscountCode, LineCost, LineItem, Merchandise, MerchandisePreview};
    use crate::types::{CurrencyCode, LineId, Money};

    const CART_ID: &str = "gid://shopify/Cart/c1";

    fn usd(amount: &str) -> Money {
        Money::parse(amount, "USD").unwrap()
    }

    fn line(id: &str, quantity: u32) -> LineItem {
        let unit = usd("10.00");
        LineItem {
            id: LineId::from(id),
            quantity,
            merchandise: Merchandise {
                id: format!("gid://shopify/ProductVariant/{id}"),
                title: "Default Title".to_string(),
                product_handle: "tee".to_string(),
                product_title: "Tee".to_string(),
                selected_options: vec![],
                image_url: None,
            },
            cost: LineCost {
                amount_per_quantity: unit,
                subtotal: unit.times(quantity),
                total: unit.times(quantity),
            },
        }
    }

    fn cart(lines: Vec<LineItem>) -> CartSnapshot {
        let subtotal = lines
            .iter()
            .fold(usd("0"), |acc, l| acc.checked_add(l.cost.subtotal).unwrap());
        CartSnapshot {
            id: Some(CART_ID.to_string()),
            total_quantity: lines.iter().map(|l| l.quantity).sum(),
            lines,
            subtotal,
            ..CartSnapshot::empty(CurrencyCode::USD)
        }
    }

    fn update(id: &str, quantity: i64) -> CartAction {
        CartAction::UpdateQuantity {
            line_id: LineId::from(id),
            quantity,
        }
    }

    fn remove(id: &str) -> CartAction {
        CartAction::Remove {
            line_id: LineId::from(id),
        }
    }

    fn add(variant: &str, quantity: i64) -> CartAction {
        CartAction::Add {
            merchandise_id: variant.to_string(),
            quantity,
            preview: Some(MerchandisePreview {
                product_title: "Cap".to_string(),
                price: Some(usd("5.00")),
                ..MerchandisePreview::default()
            }),
        }
    }

    fn rejected(message: &str) -> CartError {
        CartError::ServerRejected {
            message: message.to_string(),
            field: None,
            code: Some("OUT_OF_STOCK".to_string()),
        }
    }

    fn notices_in(events: &[CartEvent]) -> Vec<&CartNotice> {
        events
            .iter()
            .filter_map(|event| match event {
                CartEvent::Notice(notice) => Some(notice),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_remove_line_end_to_end() {
        let mut reconciler = Reconciler::new(cart(vec![line("L1", 2)]));

        let handle = reconciler.submit(remove("L1")).unwrap();
        assert_eq!(reconciler.project().total_quantity, 0);
        assert!(reconciler.project().is_empty());

        let dispatches = reconciler.take_dispatchable();
        assert_eq!(dispatches.len(), 1);
        assert_eq!(
            dispatches[0].mutation,
            CartMutation::RemoveLines {
                line_ids: vec![LineId::from("L1")]
            }
        );

        reconciler.on_server_response(cart(vec![]), &[handle.key.clone()]);
        assert_eq!(reconciler.status(handle.id), Some(IntentStatus::Confirmed));
        assert_eq!(reconciler.project().total_quantity, 0);
        assert!(reconciler.project().is_empty());
        assert_eq!(reconciler.pending_count(), 0);
        assert!(!reconciler.is_in_flight(&handle.key));
    }

    #[test]
    fn test_increase_then_decrease_dispatches_only_decrease() {
        let mut reconciler = Reconciler::new(cart(vec![line("L1", 2)]));

        let increase = reconciler.submit(update("L1", 3)).unwrap();
        let decrease = reconciler.submit(update("L1", 1)).unwrap();
        assert_eq!(increase.key, decrease.key);

        let dispatches = reconciler.take_dispatchable();
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].intent_id, decrease.id);
        assert_eq!(
            dispatches[0].mutation,
            CartMutation::UpdateLines {
                line_id: LineId::from("L1"),
                quantity: 1
            }
        );
        assert_eq!(reconciler.project().total_quantity, 1);
        assert_eq!(reconciler.status(increase.id), None);

        let events = reconciler.take_events();
        assert!(events.contains(&CartEvent::Resolved {
            intent_id: increase.id,
            outcome: IntentOutcome::Superseded,
        }));
    }

    #[test]
    fn test_rejected_add_reverts_and_notifies_once() {
        let before = cart(vec![line("L1", 1)]);
        let mut reconciler = Reconciler::new(before.clone());
        let baseline = reconciler.project().clone();

        let handle = reconciler.submit(add("V", 1)).unwrap();
        assert_eq!(reconciler.project().lines.len(), 2);
        assert!(reconciler.project().lines[1].is_optimistic);

        let dispatches = reconciler.take_dispatchable();
        assert_eq!(dispatches.len(), 1);
        reconciler.take_events();

        reconciler.on_server_error(&handle.key, rejected("out of stock"));
        assert_eq!(reconciler.project(), &baseline);
        assert_eq!(reconciler.snapshot(), &before);
        assert_eq!(reconciler.status(handle.id), Some(IntentStatus::Failed));

        let events = reconciler.take_events();
        let notices = notices_in(&events);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].message, "out of stock");
        assert!(!notices[0].retryable);

        // A repeated error for the same key finds nothing in flight.
        reconciler.on_server_error(&handle.key, rejected("out of stock"));
        assert!(notices_in(&reconciler.take_events()).is_empty());
        assert_eq!(reconciler.notices().len(), 1);
    }

    #[test]
    fn test_one_outstanding_intent_per_key() {
        let mut reconciler = Reconciler::new(cart(vec![line("L1", 1), line("L2", 1)]));
        reconciler.submit(update("L1", 2)).unwrap();
        reconciler.submit(remove("L1")).unwrap();
        reconciler.submit(update("L1", 5)).unwrap();
        reconciler.submit(update("L2", 4)).unwrap();

        assert_eq!(reconciler.pending_count(), 2);
        assert_eq!(reconciler.project().total_quantity, 9);
    }

    #[test]
    fn test_total_quantity_matches_visible_lines() {
        let mut reconciler = Reconciler::new(cart(vec![line("L1", 2), line("L2", 3)]));
        reconciler.submit(remove("L2")).unwrap();
        reconciler.submit(add("V", 4)).unwrap();

        let projected = reconciler.project();
        let visible: u32 = projected.lines.iter().map(|l| l.quantity).sum();
        assert_eq!(projected.total_quantity, visible);
        assert_eq!(projected.total_quantity, 6);
        assert!(projected.lines.iter().all(|l| l.quantity > 0));
    }

    #[test]
    fn test_duplicate_response_is_idempotent() {
        let mut reconciler = Reconciler::new(cart(vec![line("L1", 2)]));
        let handle = reconciler.submit(update("L1", 3)).unwrap();
        reconciler.take_dispatchable();

        let confirmed = cart(vec![line("L1", 3)]);
        reconciler.on_server_response(confirmed.clone(), &[handle.key.clone()]);
        let first = reconciler.project().clone();
        reconciler.take_events();

        reconciler.on_server_response(confirmed, &[handle.key]);
        assert_eq!(reconciler.project(), &first);
        assert!(reconciler.take_events().is_empty());
    }

    #[test]
    fn test_confirmation_leaves_no_pending_intent_for_line() {
        let mut reconciler = Reconciler::new(cart(vec![line("L1", 2)]));
        let handle = reconciler.submit(update("L1", 3)).unwrap();
        reconciler.take_dispatchable();

        reconciler.on_server_response(cart(vec![line("L1", 3)]), &[handle.key]);

        let target = LineId::from("L1");
        assert!(
            reconciler
                .intents
                .iter()
                .filter(|i| i.status.is_pending())
                .all(|i| i.target_line() != Some(&target))
        );
        assert_eq!(reconciler.project().line(&target).unwrap().quantity, 3);
    }

    #[test]
    fn test_same_key_requests_are_sequential() {
        let mut reconciler = Reconciler::new(cart(vec![line("L1", 2)]));
        let first = reconciler.submit(update("L1", 3)).unwrap();
        assert_eq!(reconciler.take_dispatchable().len(), 1);
        assert!(reconciler.is_in_flight(&first.key));

        let second = reconciler.submit(update("L1", 4)).unwrap();
        assert!(reconciler.take_dispatchable().is_empty());
        assert_eq!(reconciler.project().total_quantity, 4);

        // The superseded request lands: baseline refreshes, nothing confirms.
        reconciler.on_server_response(cart(vec![line("L1", 3)]), &[first.key.clone()]);
        assert_eq!(reconciler.status(second.id), Some(IntentStatus::Pending));
        assert_eq!(reconciler.snapshot().lines[0].quantity, 3);
        assert_eq!(reconciler.project().total_quantity, 4);
        assert!(!reconciler.take_events().iter().any(|e| matches!(
            e,
            CartEvent::Resolved {
                outcome: IntentOutcome::Confirmed,
                ..
            }
        )));

        let dispatches = reconciler.take_dispatchable();
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].intent_id, second.id);
    }

    #[test]
    fn test_superseded_request_error_is_not_surfaced() {
        let mut reconciler = Reconciler::new(cart(vec![line("L1", 2)]));
        let first = reconciler.submit(update("L1", 3)).unwrap();
        reconciler.take_dispatchable();
        let second = reconciler.submit(remove("L1")).unwrap();
        reconciler.take_events();

        reconciler.on_server_error(
            &first.key,
            CartError::Transport {
                message: "connection reset".to_string(),
            },
        );
        assert!(reconciler.notices().is_empty());
        assert!(notices_in(&reconciler.take_events()).is_empty());
        assert_eq!(reconciler.status(second.id), Some(IntentStatus::Pending));
        assert_eq!(reconciler.take_dispatchable().len(), 1);
    }

    #[test]
    fn test_disjoint_keys_dispatch_concurrently() {
        let mut reconciler = Reconciler::new(cart(vec![line("L1", 1), line("L2", 1)]));
        reconciler.submit(update("L1", 2)).unwrap();
        reconciler.submit(update("L2", 2)).unwrap();
        reconciler.submit(add("V", 1)).unwrap();
        reconciler.submit(add("V", 1)).unwrap();

        assert_eq!(reconciler.take_dispatchable().len(), 4);
        assert!(reconciler.take_dispatchable().is_empty());
    }

    #[test]
    fn test_single_request_while_cart_is_created() {
        let mut reconciler = Reconciler::new(CartSnapshot::empty(CurrencyCode::USD));
        let first = reconciler.submit(add("V1", 1)).unwrap();
        reconciler.submit(add("V2", 1)).unwrap();

        let dispatches = reconciler.take_dispatchable();
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].cart_id, None);
        assert!(reconciler.take_dispatchable().is_empty());

        reconciler.on_server_response(cart(vec![line("L1", 1)]), &[first.key]);

        let dispatches = reconciler.take_dispatchable();
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].cart_id.as_deref(), Some(CART_ID));
    }

    #[test]
    fn test_confirmed_add_replaces_optimistic_line() {
        let mut reconciler = Reconciler::new(cart(vec![]));
        let handle = reconciler.submit(add("V", 2)).unwrap();
        assert!(reconciler.project().lines[0].id.is_optimistic());
        reconciler.take_dispatchable();

        reconciler.on_server_response(cart(vec![line("L9", 2)]), &[handle.key]);
        let projected = reconciler.project();
        assert_eq!(projected.lines.len(), 1);
        assert_eq!(projected.lines[0].id, LineId::from("L9"));
        assert!(!projected.lines[0].is_optimistic);
    }

    #[test]
    fn test_stale_snapshot_keeps_baseline_but_confirms() {
        let mut current = cart(vec![line("L1", 2)]);
        current.updated_at = Some(Utc::now());
        let mut reconciler = Reconciler::new(current.clone());
        let handle = reconciler.submit(update("L1", 5)).unwrap();
        reconciler.take_dispatchable();

        let mut stale = cart(vec![line("L1", 1)]);
        stale.updated_at = current.updated_at.map(|t| t - chrono::TimeDelta::seconds(5));
        reconciler.on_server_response(stale, &[handle.key]);

        assert_eq!(reconciler.snapshot(), &current);
        assert_eq!(reconciler.status(handle.id), Some(IntentStatus::Confirmed));
    }

    #[test]
    fn test_settled_intents_purged_on_next_replacement() {
        let mut reconciler = Reconciler::new(cart(vec![line("L1", 2)]));
        let handle = reconciler.submit(update("L1", 3)).unwrap();
        reconciler.take_dispatchable();
        reconciler.on_server_response(cart(vec![line("L1", 3)]), &[handle.key]);
        assert!(reconciler.status(handle.id).is_some());

        reconciler.on_server_response(cart(vec![line("L1", 3)]), &[]);
        assert_eq!(reconciler.status(handle.id), None);
    }

    #[test]
    fn test_validation_errors_are_not_queued() {
        let mut reconciler = Reconciler::new(cart(vec![line("L1", 2)]));
        assert_eq!(
            reconciler.submit(update("L1", -1)),
            Err(ValidationError::NegativeQuantity(-1))
        );
        assert_eq!(
            reconciler.submit(remove("L404")),
            Err(ValidationError::UnknownLine(LineId::from("L404")))
        );
        assert_eq!(reconciler.submit(add("V", 0)), Err(ValidationError::EmptyAdd));
        assert_eq!(reconciler.pending_count(), 0);
        assert!(reconciler.take_events().is_empty());
    }

    #[test]
    fn test_discount_update_sends_full_code_list() {
        let mut confirmed = cart(vec![line("L1", 1)]);
        confirmed.discount_codes = vec![DiscountCode {
            code: "WELCOME".to_string(),
            applicable: true,
        }];
        let mut reconciler = Reconciler::new(confirmed);
        reconciler
            .submit(CartAction::ApplyDiscount {
                code: " SUMMER ".to_string(),
            })
            .unwrap();

        let dispatches = reconciler.take_dispatchable();
        assert_eq!(
            dispatches[0].mutation,
            CartMutation::UpdateDiscountCodes {
                codes: vec!["WELCOME".to_string(), "SUMMER".to_string()]
            }
        );
        assert_eq!(
            reconciler.project().discount_codes,
            vec!["WELCOME".to_string(), "SUMMER".to_string()]
        );
    }

    fn apply_discount(code: &str) -> CartAction {
        CartAction::ApplyDiscount {
            code: code.to_string(),
        }
    }

    fn with_codes(codes: &[&str]) -> CartSnapshot {
        let mut snapshot = cart(vec![line("L1", 1)]);
        snapshot.discount_codes = codes
            .iter()
            .map(|code| DiscountCode {
                code: (*code).to_string(),
                applicable: true,
            })
            .collect();
        snapshot
    }

    #[test]
    fn test_discount_updates_are_serialized_across_codes() {
        let mut reconciler = Reconciler::new(with_codes(&[]));
        let first = reconciler.submit(apply_discount("AAA")).unwrap();
        let second = reconciler.submit(apply_discount("BBB")).unwrap();
        assert_eq!(reconciler.project().discount_codes, vec!["AAA", "BBB"]);

        let dispatches = reconciler.take_dispatchable();
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].intent_id, first.id);
        assert_eq!(
            dispatches[0].mutation,
            CartMutation::UpdateDiscountCodes {
                codes: vec!["AAA".to_string()]
            }
        );
        assert!(!reconciler.is_in_flight(&second.key));
        assert!(reconciler.take_dispatchable().is_empty());

        reconciler.on_server_response(with_codes(&["AAA"]), &[first.key]);
        let dispatches = reconciler.take_dispatchable();
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].intent_id, second.id);
        assert_eq!(
            dispatches[0].mutation,
            CartMutation::UpdateDiscountCodes {
                codes: vec!["AAA".to_string(), "BBB".to_string()]
            }
        );

        reconciler.on_server_response(with_codes(&["AAA", "BBB"]), &[second.key]);
        assert_eq!(reconciler.status(first.id), None);
        assert_eq!(reconciler.status(second.id), Some(IntentStatus::Confirmed));
        assert_eq!(reconciler.pending_count(), 0);
        assert_eq!(reconciler.project().discount_codes, vec!["AAA", "BBB"]);
    }

    #[test]
    fn test_discount_waits_for_superseded_request() {
        let mut reconciler = Reconciler::new(with_codes(&[]));
        let first = reconciler.submit(apply_discount("AAA")).unwrap();
        reconciler.take_dispatchable();

        reconciler
            .submit(CartAction::RemoveDiscount {
                code: "aaa".to_string(),
            })
            .unwrap();
        let other = reconciler.submit(apply_discount("BBB")).unwrap();
        assert!(reconciler.take_dispatchable().is_empty());

        reconciler.on_server_response(with_codes(&["AAA"]), &[first.key]);
        let dispatches = reconciler.take_dispatchable();
        assert_eq!(dispatches.len(), 1);
        assert_eq!(
            dispatches[0].mutation,
            CartMutation::UpdateDiscountCodes { codes: vec![] }
        );
        assert!(!reconciler.is_in_flight(&other.key));
    }

    #[test]
    fn test_discount_does_not_block_line_updates() {
        let mut reconciler = Reconciler::new(with_codes(&[]));
        reconciler.submit(apply_discount("AAA")).unwrap();
        reconciler.submit(apply_discount("BBB")).unwrap();
        reconciler.submit(update("L1", 3)).unwrap();

        let dispatches = reconciler.take_dispatchable();
        assert_eq!(dispatches.len(), 2);
        assert!(dispatches.iter().any(|d| d.key.is_discount()));
        assert!(dispatches.iter().any(|d| !d.key.is_discount()));
    }

    #[test]
    fn test_notices_keep_only_the_newest() {
        let mut reconciler = Reconciler::new(cart(vec![line("L1", 2)]));
        let mut failed = Vec::new();
        for quantity in 1..=10 {
            let handle = reconciler.submit(update("L1", quantity)).unwrap();
            reconciler.take_dispatchable();
            reconciler.on_server_error(
                &handle.key,
                CartError::Transport {
                    message: "timeout".to_string(),
                },
            );
            failed.push(handle.id);
        }

        let notices = reconciler.notices();
        assert_eq!(notices.len(), MAX_NOTICES);
        assert_eq!(notices[0].intent_id, failed[10 - MAX_NOTICES]);
        assert_eq!(notices[MAX_NOTICES - 1].intent_id, failed[9]);
    }

    #[test]
    fn test_transport_error_notice_is_retryable_and_dismissible() {
        let mut reconciler = Reconciler::new(cart(vec![line("L1", 2)]));
        let handle = reconciler.submit(update("L1", 3)).unwrap();
        reconciler.take_dispatchable();

        reconciler.on_server_error(
            &handle.key,
            CartError::Transport {
                message: "timeout".to_string(),
            },
        );
        let notice = reconciler.notices()[0].clone();
        assert!(notice.retryable);
        assert_eq!(notice.intent_id, handle.id);
        assert_eq!(reconciler.project().total_quantity, 2);

        assert!(reconciler.dismiss(notice.id));
        assert!(!reconciler.dismiss(notice.id));
        assert!(reconciler.notices().is_empty());
    }

    #[test]
    fn test_update_to_zero_dispatches_removal() {
        let mut reconciler = Reconciler::new(cart(vec![line("L1", 2)]));
        reconciler.submit(update("L1", 0)).unwrap();
        assert!(reconciler.project().is_empty());
        assert_eq!(
            reconciler.take_dispatchable()[0].mutation,
            CartMutation::RemoveLines {
                line_ids: vec![LineId::from("L1")]
            }
        );
    }
}
