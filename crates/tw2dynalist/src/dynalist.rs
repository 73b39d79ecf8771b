//! Dynalist inbox API client.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

/// Inbox endpoint of the Dynalist API.
pub const DYNALIST_INBOX_URL: &str = "https://dynalist.io/api/v1/inbox/add";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Dynalist API errors.
#[derive(Debug, Error)]
pub enum DynalistError {
    /// HTTP request failed
    #[error("failed to send request: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body is not a Dynalist response
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("dynalist rate limit: {0}")]
    RateLimited(String),

    #[error("dynalist invalid token: {0}")]
    InvalidToken(String),

    #[error("dynalist unauthorized: {0}")]
    Unauthorized(String),

    /// Any other `_code`
    #[error("dynalist API error [{code}]: {message}")]
    Api { code: String, message: String },
}

impl DynalistError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Bounded retry for rate-limited requests.
///
/// The delay before attempt `n + 1` is `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

#[derive(Debug, Serialize)]
struct InboxRequest<'a> {
    token: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct InboxResponse {
    #[serde(rename = "_code")]
    code: String,
    #[serde(rename = "_msg", default)]
    message: String,
}

/// Client for appending items to the Dynalist inbox.
#[derive(Debug, Clone)]
pub struct DynalistClient {
    client: Client,
    token: String,
    endpoint: String,
    retry: RetryPolicy,
}

impl DynalistClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DynalistError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            token: token.into(),
            endpoint: DYNALIST_INBOX_URL.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Send requests to `endpoint` instead of the production inbox URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Add an item to the inbox, retrying on rate limits only.
    ///
    /// Returns the last rate-limit error once the attempts are exhausted.
    #[instrument(skip(self, content, note))]
    pub async fn add_to_inbox(&self, content: &str, note: &str) -> Result<(), DynalistError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.add_once(content, note).await {
                Err(e) if e.is_rate_limited() && attempt < max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Dynalist rate limited, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Single request without retries.
    pub async fn add_once(&self, content: &str, note: &str) -> Result<(), DynalistError> {
        let request = InboxRequest {
            token: &self.token,
            content,
            note: (!note.is_empty()).then_some(note),
        };

        debug!(endpoint = %self.endpoint, "Sending request to Dynalist API");

        let body = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .bytes()
            .await?;

        let response: InboxResponse = serde_json::from_slice(&body)?;

        match response.code.as_str() {
            "Ok" => {
                debug!("Added item to Dynalist inbox");
                Ok(())
            }
            "TooManyRequests" => {
                warn!(message = %response.message, "Dynalist rate limit hit");
                Err(DynalistError::RateLimited(response.message))
            }
            "InvalidToken" => {
                error!(message = %response.message, "Dynalist token is invalid");
                Err(DynalistError::InvalidToken(response.message))
            }
            "Unauthorized" => {
                error!(message = %response.message, "Dynalist unauthorized");
                Err(DynalistError::Unauthorized(response.message))
            }
            _ => {
                error!(code = %response.code, message = %response.message, "Dynalist API error");
                Err(DynalistError::Api {
                    code: response.code,
                    message: response.message,
                })
            }
        }
    }
}
