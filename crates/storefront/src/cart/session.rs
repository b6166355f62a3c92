//! Per-shopper cart session actor.
//!
//! Each [`CartSession`] is a handle to a task that exclusively owns one
//! [`Reconciler`]. Handlers talk to it over an unbounded command channel; the
//! task applies every command already queued (one tick), then hands out the
//! dispatchable intents and spawns one request per intent. Responses come
//! back as commands, so all reconciler state transitions happen on the actor
//! task and nothing is locked.
//!
//! - The current [`CartView`] is published on a `watch` channel.
//! - [`CartEvent`]s are published on a `broadcast` channel.
//! - Each submission resolves a `oneshot` with its [`IntentOutcome`].

use std::collections::HashMap;
use std::sync::Arc;

use cartsync_core::{
    CartAction, CartEvent, CartNotice, CartSnapshot, CorrelationKey, IntentHandle, IntentId,
    IntentOutcome, NoticeId, ProjectedCart, Reconciler, ValidationError,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{Instrument, debug, info_span, warn};

use super::remote::{RemoteCart, RemoteError};

/// Capacity of the event broadcast buffer per session.
const EVENT_BUFFER: usize = 64;

type Accepted = Result<IntentHandle, ValidationError>;

/// Errors talking to a cart session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The action was rejected before dispatch.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The session actor has stopped.
    #[error("cart session closed")]
    Closed,

    /// The initial cart could not be loaded.
    #[error("failed to load cart: {0}")]
    Load(String),
}

/// Everything the rendering layer needs for one cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CartView {
    /// Projected cart.
    pub cart: ProjectedCart,
    /// Undismissed error notices.
    pub notices: Vec<CartNotice>,
}

/// A submitted action awaiting validation.
#[derive(Debug)]
pub struct Submission {
    accepted: oneshot::Receiver<Accepted>,
    outcome: oneshot::Receiver<IntentOutcome>,
}

impl Submission {
    /// Wait for the actor to validate and queue the action.
    ///
    /// Resolves after the view including the intent has been published, so
    /// [`CartSession::view`] reflects it from then on.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` if the action was rejected, or
    /// `SessionError::Closed` if the actor stopped.
    pub async fn accepted(self) -> Result<PendingIntent, SessionError> {
        let handle = self.accepted.await.map_err(|_| SessionError::Closed)??;
        Ok(PendingIntent {
            handle,
            outcome: self.outcome,
        })
    }
}

/// A queued intent whose outcome is still open.
#[derive(Debug)]
pub struct PendingIntent {
    /// Intent handle.
    pub handle: IntentHandle,
    outcome: oneshot::Receiver<IntentOutcome>,
}

impl PendingIntent {
    /// Wait until the intent is confirmed, failed, or superseded.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the actor stopped first.
    pub async fn outcome(self) -> Result<IntentOutcome, SessionError> {
        self.outcome.await.map_err(|_| SessionError::Closed)
    }
}

enum Command {
    Submit {
        action: CartAction,
        accepted: oneshot::Sender<Accepted>,
        outcome: oneshot::Sender<IntentOutcome>,
    },
    Dismiss {
        notice_id: NoticeId,
    },
    Completed {
        key: CorrelationKey,
        result: Result<CartSnapshot, RemoteError>,
    },
}

/// Handle to a running cart session. Cheap to clone.
///
/// The actor stops once every handle is dropped.
#[derive(Clone)]
pub struct CartSession {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<CartView>,
    events: broadcast::Sender<CartEvent>,
}

impl CartSession {
    /// Start an actor for `snapshot`. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn spawn(remote: Arc<dyn RemoteCart>, snapshot: CartSnapshot) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let reconciler = Reconciler::new(snapshot);
        let (view_tx, view) = watch::channel(CartView {
            cart: reconciler.project().clone(),
            notices: Vec::new(),
        });
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let actor = SessionActor {
            reconciler,
            remote,
            commands: commands.downgrade(),
            view: view_tx,
            events: events.clone(),
            waiters: HashMap::new(),
            replies: Vec::new(),
        };
        let span = info_span!("cart_session", cart_id = ?actor.reconciler.snapshot().id);
        tokio::spawn(actor.run(receiver).instrument(span));

        Self {
            commands,
            view,
            events,
        }
    }

    /// Queue a shopper action.
    ///
    /// The command is sent synchronously, so actions submitted back to back
    /// are applied in the same tick.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the actor has stopped.
    pub fn submit(&self, action: CartAction) -> Result<Submission, SessionError> {
        let (accepted_tx, accepted) = oneshot::channel();
        let (outcome_tx, outcome) = oneshot::channel();
        self.send(Command::Submit {
            action,
            accepted: accepted_tx,
            outcome: outcome_tx,
        })?;
        Ok(Submission { accepted, outcome })
    }

    /// Dismiss an error notice.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the actor has stopped.
    pub fn dismiss(&self, notice_id: NoticeId) -> Result<(), SessionError> {
        self.send(Command::Dismiss { notice_id })
    }

    /// The latest published view.
    #[must_use]
    pub fn view(&self) -> CartView {
        self.view.borrow().clone()
    }

    /// Watch the view for changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<CartView> {
        self.view.clone()
    }

    /// Subscribe to cart events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CartEvent> {
        self.events.subscribe()
    }

    /// Wait until no intent is pending and return the view.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the actor stops first.
    pub async fn settled(&self) -> Result<CartView, SessionError> {
        let mut view = self.view.clone();
        let settled = view
            .wait_for(|view| view.cart.pending_intents == 0)
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(settled.clone())
    }

    fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }
}

// =============================================================================
// Actor
// =============================================================================

struct SessionActor {
    reconciler: Reconciler,
    remote: Arc<dyn RemoteCart>,
    /// Weak so that in-flight requests don't keep an abandoned session alive.
    commands: mpsc::WeakUnboundedSender<Command>,
    view: watch::Sender<CartView>,
    events: broadcast::Sender<CartEvent>,
    waiters: HashMap<IntentId, oneshot::Sender<IntentOutcome>>,
    /// Acceptance replies held until the tick's view is published.
    replies: Vec<(oneshot::Sender<Accepted>, Accepted)>,
}

impl SessionActor {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = receiver.recv().await {
            self.handle(command);
            while let Ok(command) = receiver.try_recv() {
                self.handle(command);
            }
            self.dispatch();
            self.publish();
            for (reply, result) in self.replies.drain(..) {
                let _ = reply.send(result);
            }
        }
        debug!("Cart session stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Submit {
                action,
                accepted,
                outcome,
            } => {
                let result = self.reconciler.submit(action);
                match &result {
                    Ok(handle) => {
                        self.waiters.insert(handle.id, outcome);
                    }
                    Err(err) => debug!(error = %err, "Rejected cart action"),
                }
                self.replies.push((accepted, result));
            }
            Command::Dismiss { notice_id } => {
                self.reconciler.dismiss(notice_id);
            }
            Command::Completed { key, result } => match result {
                Ok(snapshot) => self.reconciler.on_server_response(snapshot, &[key]),
                Err(err) => self.reconciler.on_server_error(&key, err.into()),
            },
        }
    }

    fn dispatch(&mut self) {
        for dispatch in self.reconciler.take_dispatchable() {
            let remote = Arc::clone(&self.remote);
            let commands = self.commands.clone();
            let span = info_span!(
                "cart_dispatch",
                intent_id = %dispatch.intent_id,
                key = %dispatch.key,
                operation = dispatch.mutation.operation()
            );

            tokio::spawn(
                async move {
                    let result = remote
                        .apply(dispatch.cart_id.as_deref(), &dispatch.mutation)
                        .await;
                    if let Err(err) = &result {
                        warn!(error = %err, "Remote cart request failed");
                    }
                    match commands.upgrade() {
                        Some(commands) => {
                            let _ = commands.send(Command::Completed {
                                key: dispatch.key,
                                result,
                            });
                        }
                        None => debug!("Session closed before response arrived"),
                    }
                }
                .instrument(span),
            );
        }
    }

    fn publish(&mut self) {
        for event in self.reconciler.take_events() {
            if let CartEvent::Resolved {
                intent_id,
                outcome,
            } = &event
                && let Some(waiter) = self.waiters.remove(intent_id)
            {
                let _ = waiter.send(outcome.clone());
            }
            // No subscribers is fine
            let _ = self.events.send(event);
        }

        let next = CartView {
            cart: self.reconciler.project().clone(),
            notices: self.reconciler.notices().to_vec(),
        };
        self.view.send_if_modified(|view| {
            if *view == next {
                false
            } else {
                *view = next;
                true
            }
        });
    }
}
