//! Hand-off between the `/callback` route and a waiting authorization flow.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::AuthError;

/// Query parameters of the OAuth redirect.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// How a callback request was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The code was handed to the waiting flow.
    Authorized,
    /// The request was refused; the message is shown to the user.
    Rejected(String),
    /// No authorization is waiting for a callback.
    NotPending,
}

struct Pending {
    state: String,
    tx: oneshot::Sender<Result<String, AuthError>>,
}

/// Registry of the (single) authorization waiting for its redirect.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    pending: Arc<Mutex<Option<Pending>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for a callback carrying `state`.
    ///
    /// Replaces any earlier pending authorization, whose waiter then fails
    /// with [`AuthError::Abandoned`].
    pub fn register(&self, state: impl Into<String>) -> PendingAuthorization {
        let state = state.into();
        let (tx, rx) = oneshot::channel();
        *self.lock() = Some(Pending {
            state: state.clone(),
            tx,
        });
        PendingAuthorization {
            rx,
            state,
            registry: self.clone(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    #[cfg(test)]
    pub(crate) fn pending_state(&self) -> Option<String> {
        self.lock().as_ref().map(|p| p.state.clone())
    }

    /// Deliver a callback request to the pending authorization.
    pub fn complete(&self, params: CallbackParams) -> CallbackOutcome {
        let mut guard = self.lock();

        let Some(pending) = guard.as_ref() else {
            warn!("OAuth callback received with no authorization pending");
            return CallbackOutcome::NotPending;
        };

        if params.state.as_deref() != Some(pending.state.as_str()) {
            warn!("OAuth callback state mismatch, ignoring request");
            return CallbackOutcome::Rejected("Invalid OAuth state".to_string());
        }

        let Some(pending) = guard.take() else {
            return CallbackOutcome::NotPending;
        };

        if let Some(error) = params.error.filter(|e| !e.is_empty()) {
            let message = match params.error_description {
                Some(description) if !description.is_empty() => format!("{error}: {description}"),
                _ => error,
            };
            warn!(error = %message, "OAuth provider returned an error");
            let _ = pending.tx.send(Err(AuthError::Denied(message.clone())));
            return CallbackOutcome::Rejected(format!("OAuth Error: {message}"));
        }

        let Some(code) = params.code.filter(|c| !c.is_empty()) else {
            warn!("OAuth callback without authorization code");
            let _ = pending.tx.send(Err(AuthError::MissingCode));
            return CallbackOutcome::Rejected("Authorization code not found".to_string());
        };

        info!("Received authorization code");
        if pending.tx.send(Ok(code)).is_err() {
            return CallbackOutcome::NotPending;
        }
        CallbackOutcome::Authorized
    }

    /// Drop the pending authorization if it is still the one for `state`.
    fn clear(&self, state: &str) -> bool {
        let mut guard = self.lock();
        if guard.as_ref().is_some_and(|p| p.state == state) {
            guard.take();
            true
        } else {
            false
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Waiter side of a registered authorization.
pub struct PendingAuthorization {
    rx: oneshot::Receiver<Result<String, AuthError>>,
    state: String,
    registry: CallbackRegistry,
}

impl PendingAuthorization {
    /// Wait for the authorization code.
    pub async fn wait(self, timeout: Duration) -> Result<String, AuthError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AuthError::Abandoned),
            Err(_) => {
                self.registry.clear(&self.state);
                Err(AuthError::Timeout(timeout))
            }
        }
    }
}
