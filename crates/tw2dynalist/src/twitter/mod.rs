//! Twitter/X bookmark source.
//!
//! Lists and removes bookmarks through the v2 API with an OAuth2 user token.

mod client;
mod types;

use thiserror::Error;

use crate::auth::AuthError;

pub use client::{CleanupReport, ConnectOptions, TwitterClient, DEFAULT_API_BASE};
pub use types::{tweet_url, Bookmark, UNKNOWN_USERNAME};

/// Twitter API errors.
#[derive(Debug, Error)]
pub enum TwitterError {
    /// Token acquisition, refresh or persistence failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response
    #[error("Twitter API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// Bookmark removal needs the `bookmark.write` scope
    #[error("insufficient permissions for bookmark removal - re-authorization required")]
    Forbidden,

    /// The account handle could not be resolved
    #[error("user lookup for @{username} failed: {reason}")]
    UserLookup { username: String, reason: String },

    /// Some processed bookmarks could not be removed
    #[error("cleanup completed with {failed} failures")]
    CleanupIncomplete { removed: usize, failed: usize },
}

impl TwitterError {
    /// Whether a human has to run the authorization flow again.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            Self::Auth(AuthError::ReauthorizationRequired(_)) | Self::Forbidden
        )
    }
}
