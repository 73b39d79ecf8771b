//! Twitter API v2 client for the bookmark endpoints.

use std::sync::Arc;
use std::time::Duration;

use notify::Notifier;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::types::{Bookmark, BookmarksResponse, UserLookupResponse};
use super::TwitterError;
use crate::auth::store::needs_user_lookup;
use crate::auth::{authorize, CallbackRegistry, OAuthClient, TokenManager, TokenStore};
use crate::cache::ProcessedCache;
use crate::metrics::Metrics;

/// Production API host.
pub const DEFAULT_API_BASE: &str = "https://api.twitter.com";

/// Largest page the bookmarks endpoint returns.
const MAX_RESULTS: &str = "100";

/// Everything [`TwitterClient::connect`] needs to obtain a usable token.
pub struct ConnectOptions<'a> {
    pub oauth: OAuthClient,
    pub store: TokenStore,
    /// Account handle, without `@`.
    pub username: String,
    pub api_base: String,
    /// Registry the running `/callback` route delivers to.
    pub callbacks: &'a CallbackRegistry,
    pub notifier: &'a Notifier,
    pub metrics: Option<Arc<Metrics>>,
    pub authorization_timeout: Duration,
}

/// Result of removing already processed bookmarks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Bookmarks currently in the account.
    pub listed: usize,
    pub removed: usize,
    pub failed: usize,
}

/// What to do when the token needs a refresh, either because it expired or
/// because the API answered 401.
#[derive(Debug, Clone, Copy)]
enum OnUnauthorized {
    /// Refresh and retry; refresh errors are returned as-is.
    Refresh,
    /// Refresh and retry; a refresh failure discards the stored token.
    RefreshOrInvalidate,
}

/// Twitter API client bound to one account.
pub struct TwitterClient {
    http: Client,
    api_base: String,
    username: String,
    tokens: TokenManager,
}

impl TwitterClient {
    /// Create a client from an existing token manager.
    pub fn new(
        tokens: TokenManager,
        username: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            username: username.into(),
            tokens,
        }
    }

    /// Load the stored token (or run the authorization flow when there is
    /// none), resolve the account ID, and persist both.
    pub async fn connect(options: ConnectOptions<'_>) -> Result<Self, TwitterError> {
        let ConnectOptions {
            oauth,
            store,
            username,
            api_base,
            callbacks,
            notifier,
            metrics,
            authorization_timeout,
        } = options;

        let (token, user_id) = if let Some(stored) = store.load()? {
            info!(path = %store.path().display(), "Loaded token from file");
            (stored.token, stored.user_id)
        } else {
            let token = authorize(&oauth, callbacks, notifier, authorization_timeout).await?;
            store.save(&token, "")?;
            (token, String::new())
        };

        let mut tokens = TokenManager::new(oauth, store, token, user_id.clone());
        if let Some(metrics) = metrics {
            metrics.record_token(tokens.expiry().await);
            tokens = tokens.with_metrics(metrics);
        }

        let client = Self::new(tokens, username, api_base);

        if needs_user_lookup(&user_id) {
            let resolved = client.lookup_user_id().await?;
            client.tokens.set_user_id(resolved).await?;
        }

        info!(
            username = %client.username,
            user_id = %client.tokens.user_id().await,
            "Twitter client ready"
        );
        Ok(client)
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Resolve the configured handle to its numeric account ID.
    #[instrument(skip(self), fields(username = %self.username))]
    pub async fn lookup_user_id(&self) -> Result<String, TwitterError> {
        let url = format!("{}/2/users/by/username/{}", self.api_base, self.username);
        let response = self
            .send_authorized(Method::GET, &url, &[], OnUnauthorized::Refresh)
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TwitterError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let lookup: UserLookupResponse = response.json().await?;
        match lookup.data {
            Some(user) => {
                info!(user_id = %user.id, "Resolved Twitter user ID");
                Ok(user.id)
            }
            None => Err(TwitterError::UserLookup {
                username: self.username.clone(),
                reason: lookup
                    .errors
                    .into_iter()
                    .map(|e| e.detail)
                    .find(|d| !d.is_empty())
                    .unwrap_or_else(|| "user not found".to_string()),
            }),
        }
    }

    /// Fetch the account's bookmarks (first page, up to 100).
    ///
    /// A rate-limited request yields an empty list. A 401 that cannot be
    /// fixed by refreshing removes the token file.
    #[instrument(skip(self))]
    pub async fn list_bookmarks(&self) -> Result<Vec<Bookmark>, TwitterError> {
        let user_id = self.tokens.user_id().await;
        let url = format!("{}/2/users/{user_id}/bookmarks", self.api_base);
        let query = [
            ("max_results", MAX_RESULTS),
            ("tweet.fields", "id,text,author_id,created_at"),
            ("user.fields", "id,name,username"),
            ("expansions", "author_id"),
        ];

        let response = self
            .send_authorized(Method::GET, &url, &query, OnUnauthorized::RefreshOrInvalidate)
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            warn!(body = %body, "Twitter API rate limit hit on bookmarks endpoint");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TwitterError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let bookmarks = response.json::<BookmarksResponse>().await?.into_bookmarks();
        info!(count = bookmarks.len(), "Found bookmarks");
        Ok(bookmarks)
    }

    /// Remove a tweet from the account's bookmarks. Already removed
    /// bookmarks (404) count as success.
    #[instrument(skip(self))]
    pub async fn remove_bookmark(&self, tweet_id: &str) -> Result<(), TwitterError> {
        let user_id = self.tokens.user_id().await;
        let url = format!("{}/2/users/{user_id}/bookmarks/{tweet_id}", self.api_base);

        let response = self
            .send_authorized(Method::DELETE, &url, &[], OnUnauthorized::Refresh)
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => {
                debug!("Removed bookmark");
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                debug!("Bookmark was not found, treating as removed");
                Ok(())
            }
            StatusCode::FORBIDDEN => Err(TwitterError::Forbidden),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(TwitterError::Api {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    /// Remove every bookmark already recorded in `cache`, pausing after each
    /// successful removal.
    pub async fn cleanup_processed(
        &self,
        cache: &ProcessedCache,
        pause: Duration,
    ) -> Result<CleanupReport, TwitterError> {
        info!("Starting cleanup of processed bookmarks");

        let bookmarks = self.list_bookmarks().await?;
        let mut report = CleanupReport {
            listed: bookmarks.len(),
            ..CleanupReport::default()
        };

        if bookmarks.is_empty() {
            info!("No bookmarks found for cleanup");
            return Ok(report);
        }

        for bookmark in bookmarks.iter().filter(|b| cache.is_processed(&b.id)) {
            if let Err(e) = self.remove_bookmark(&bookmark.id).await {
                warn!(tweet_id = %bookmark.id, error = %e, "Failed to remove processed bookmark");
                report.failed += 1;
                continue;
            }
            report.removed += 1;
            tokio::time::sleep(pause).await;
        }

        info!(
            removed = report.removed,
            failed = report.failed,
            "Cleanup complete"
        );

        if report.failed > 0 {
            return Err(TwitterError::CleanupIncomplete {
                removed: report.removed,
                failed: report.failed,
            });
        }
        Ok(report)
    }

    /// Send a bearer-authenticated request, refreshing and retrying once on 401.
    async fn send_authorized(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        on_unauthorized: OnUnauthorized,
    ) -> Result<Response, TwitterError> {
        let token = match on_unauthorized {
            OnUnauthorized::Refresh => self.tokens.access_token().await?,
            OnUnauthorized::RefreshOrInvalidate => self.tokens.access_token_or_invalidate().await?,
        };
        let response = self.send(method.clone(), url, query, &token).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(url, "Received 401 Unauthorized, attempting to refresh token");
        let token = match on_unauthorized {
            OnUnauthorized::Refresh => self.tokens.refresh().await?.access_token,
            OnUnauthorized::RefreshOrInvalidate => self.tokens.refresh_or_invalidate().await?,
        };

        info!(url, "Retrying request after token refresh");
        Ok(self.send(method, url, query, &token).await?)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        token: &str,
    ) -> Result<Response, reqwest::Error> {
        self.http
            .request(method, url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
    }
}
