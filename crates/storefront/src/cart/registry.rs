//! Live cart sessions keyed by visitor.
//!
//! Sessions sit in a `moka` cache with an idle TTL. Evicting an entry drops
//! the registry's handle; the actor stops once handlers holding clones finish.

use std::sync::Arc;

use cartsync_core::CartSnapshot;
use moka::future::Cache;
use tracing::{debug, info, instrument};

use super::remote::{RemoteCart, RemoteError};
use super::session::{CartSession, SessionError};
use crate::config::CartSessionConfig;

/// Registry of running cart sessions.
#[derive(Clone)]
pub struct CartSessions {
    remote: Arc<dyn RemoteCart>,
    sessions: Cache<String, CartSession>,
}

impl CartSessions {
    /// Create an empty registry.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteCart>, config: &CartSessionConfig) -> Self {
        let sessions = Cache::builder()
            .max_capacity(config.capacity)
            .time_to_idle(config.idle_timeout)
            .build();
        Self { remote, sessions }
    }

    /// Get the session for `visitor`, starting it if needed.
    ///
    /// A new session loads `cart_id` from the remote cart when given. A cart
    /// that no longer exists starts the session empty.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Load` if the remote cart can't be fetched.
    #[instrument(skip(self), fields(visitor = %visitor))]
    pub async fn get_or_start(
        &self,
        visitor: &str,
        cart_id: Option<&str>,
    ) -> Result<CartSession, SessionError> {
        let remote = Arc::clone(&self.remote);
        let cart_id = cart_id.map(str::to_string);

        self.sessions
            .try_get_with(visitor.to_string(), async move {
                let snapshot = match cart_id {
                    Some(id) => remote.fetch(&id).await?.unwrap_or_else(|| {
                        info!(cart_id = %id, "Stored cart no longer exists, starting empty");
                        CartSnapshot::default()
                    }),
                    None => CartSnapshot::default(),
                };
                debug!(cart_id = ?snapshot.id, "Starting cart session");
                Ok::<_, RemoteError>(CartSession::spawn(remote, snapshot))
            })
            .await
            .map_err(|e| SessionError::Load(e.to_string()))
    }

    /// Drop the session for `visitor`.
    pub async fn end(&self, visitor: &str) {
        self.sessions.invalidate(visitor).await;
    }
}
