//! Live token used by API clients.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::oauth::{OAuthClient, Token};
use super::store::TokenStore;
use super::AuthError;
use crate::metrics::Metrics;

struct TokenState {
    token: Token,
    user_id: String,
}

/// Owns the current token and keeps the token file in sync with it.
pub struct TokenManager {
    client: OAuthClient,
    store: TokenStore,
    state: Mutex<TokenState>,
    metrics: Option<Arc<Metrics>>,
}

impl TokenManager {
    pub fn new(client: OAuthClient, store: TokenStore, token: Token, user_id: String) -> Self {
        Self {
            client,
            store,
            state: Mutex::new(TokenState { token, user_id }),
            metrics: None,
        }
    }

    /// Report token expiry and refreshes to `metrics`.
    #[must_use]
    pub fn with_metrics(self, metrics: Arc<Metrics>) -> Self {
        Self {
            metrics: Some(metrics),
            ..self
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Current bearer token, refreshed first when it has expired.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let mut state = self.state.lock().await;

        if state.token.is_expired() && state.token.has_refresh_token() {
            debug!(expiry = ?state.token.expiry, "Access token expired, refreshing");
            self.refresh_locked(&mut state).await?;
        }

        Ok(state.token.access_token.clone())
    }

    /// Like [`access_token`](Self::access_token), but a failed refresh of an
    /// expired token discards the stored token and requires re-authorization.
    pub async fn access_token_or_invalidate(&self) -> Result<String, AuthError> {
        match self.access_token().await {
            Ok(token) => Ok(token),
            Err(e) => Err(self.invalidate_after(e)),
        }
    }

    pub async fn user_id(&self) -> String {
        self.state.lock().await.user_id.clone()
    }

    pub async fn expiry(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.token.expiry
    }

    /// Record the resolved account ID and persist it with the token.
    pub async fn set_user_id(&self, user_id: impl Into<String>) -> Result<(), AuthError> {
        let mut state = self.state.lock().await;
        state.user_id = user_id.into();
        self.store.save(&state.token, &state.user_id)?;
        info!(user_id = %state.user_id, "Saved token with user ID");
        Ok(())
    }

    /// Refresh the token and persist the result.
    pub async fn refresh(&self) -> Result<Token, AuthError> {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await?;
        Ok(state.token.clone())
    }

    /// Remove the persisted token so the next start re-runs authorization.
    pub fn invalidate(&self) -> Result<bool, AuthError> {
        self.store.remove()
    }

    /// Refresh; on failure discard the stored token and require
    /// re-authorization.
    pub async fn refresh_or_invalidate(&self) -> Result<String, AuthError> {
        match self.refresh().await {
            Ok(token) => Ok(token.access_token),
            Err(e) => Err(self.invalidate_after(e)),
        }
    }

    fn invalidate_after(&self, e: AuthError) -> AuthError {
        error!(error = %e, "Failed to refresh token");
        if let Err(remove_err) = self.invalidate() {
            error!(error = %remove_err, "Failed to remove token file");
        }
        AuthError::ReauthorizationRequired(e.to_string())
    }

    async fn refresh_locked(&self, state: &mut TokenState) -> Result<(), AuthError> {
        let token = self.client.refresh(&state.token.refresh_token).await?;

        if let Err(e) = self.store.save(&token, &state.user_id) {
            warn!(error = %e, "Failed to persist refreshed token");
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_token(token.expiry);
            metrics.record_token_refresh();
        }

        state.token = token;
        Ok(())
    }
}
