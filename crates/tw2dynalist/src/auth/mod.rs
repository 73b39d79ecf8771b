//! OAuth2 authorization for the Twitter v2 API.
//!
//! Implements the authorization-code flow with PKCE (S256), token
//! persistence, proactive and reactive refresh, and the re-authorization
//! lifecycle:
//!
//! - [`pkce`]: verifier/challenge and state generation
//! - [`oauth`]: authorize URL, code exchange and refresh against the token endpoint
//! - [`store`]: the `0600` token file
//! - [`callback`]: hand-off between the `/callback` HTTP route and a waiting flow
//! - [`flow`]: the interactive acquisition
//! - [`manager`]: the live token used by API clients

pub mod callback;
pub mod flow;
pub mod manager;
pub mod oauth;
pub mod pkce;
pub mod store;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use callback::{CallbackOutcome, CallbackParams, CallbackRegistry, PendingAuthorization};
pub use flow::{authorize, AUTHORIZATION_TIMEOUT};
pub use manager::TokenManager;
pub use oauth::{OAuthClient, OAuthConfig, Token};
pub use pkce::PkceChallenge;
pub use store::{StoredToken, TokenStore};

/// Authorization errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The token endpoint rejected the request
    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    /// Refresh was requested but the token has no refresh token
    #[error("no refresh token available")]
    NoRefreshToken,

    /// Reading, writing or removing the token file failed
    #[error("token file {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The token file is not valid JSON
    #[error("failed to parse token file {path}: {source}")]
    StoreParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Configured OAuth endpoint is not a valid URL
    #[error("invalid authorization URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The user or provider denied the authorization request
    #[error("OAuth error: {0}")]
    Denied(String),

    /// The callback arrived without an authorization code
    #[error("authorization code not found")]
    MissingCode,

    /// No callback arrived in time
    #[error("authorization timed out after {0:?}")]
    Timeout(Duration),

    /// The pending authorization was replaced or dropped
    #[error("authorization was abandoned")]
    Abandoned,

    /// The token could not be refreshed and was discarded
    #[error("failed to refresh token, re-authentication required: {0}")]
    ReauthorizationRequired(String),
}
