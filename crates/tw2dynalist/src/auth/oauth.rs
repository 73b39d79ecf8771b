//! OAuth2 client for the authorization and token endpoints.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::pkce::PkceChallenge;
use super::AuthError;

/// Twitter's OAuth2 authorization endpoint.
pub const TWITTER_AUTH_URL: &str = "https://twitter.com/i/oauth2/authorize";
/// Twitter's OAuth2 token endpoint.
pub const TWITTER_TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";
/// Scopes needed to read and delete bookmarks and to keep a refresh token.
pub const TWITTER_SCOPES: &[&str] = &[
    "tweet.read",
    "users.read",
    "bookmark.read",
    "bookmark.write",
    "offline.access",
];

/// A token is treated as expired this long before its actual expiry.
const EXPIRY_LEEWAY_SECS: i64 = 10;

/// OAuth2 client settings.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// Settings for Twitter's endpoints and the bookmark scopes.
    pub fn twitter(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_url: redirect_url.into(),
            auth_url: TWITTER_AUTH_URL.to_string(),
            token_url: TWITTER_TOKEN_URL.to_string(),
            scopes: TWITTER_SCOPES.iter().map(ToString::to_string).collect(),
        }
    }
}

/// An OAuth2 bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Token {
    /// Whether the token is expired (or about to be).
    ///
    /// Tokens without an expiry, or with an expiry before the Unix epoch
    /// (a zero timestamp), never expire.
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) if expiry.timestamp() > 0 => {
                Utc::now() + ChronoDuration::seconds(EXPIRY_LEEWAY_SECS) >= expiry
            }
            _ => false,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_token(self, previous_refresh_token: &str) -> Token {
        Token {
            access_token: self.access_token,
            token_type: self.token_type,
            refresh_token: self
                .refresh_token
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| previous_refresh_token.to_string()),
            expiry: self
                .expires_in
                .and_then(ChronoDuration::try_seconds)
                .map(|lifetime| Utc::now() + lifetime),
        }
    }
}

/// OAuth2 client for the authorization-code flow with PKCE.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: OAuthConfig,
    http: Client,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the URL the user opens to grant access.
    pub fn authorize_url(&self, state: &str, pkce: &PkceChallenge) -> Result<Url, AuthError> {
        let scope = self.config.scopes.join(" ");
        let url = Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("scope", scope.as_str()),
                ("state", state),
                ("code_challenge", pkce.challenge()),
                ("code_challenge_method", pkce.method()),
                ("access_type", "offline"),
            ],
        )?;
        Ok(url)
    }

    /// Exchange an authorization code for a token.
    #[instrument(skip(self, code, verifier))]
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<Token, AuthError> {
        debug!("Exchanging authorization code for token");

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("code_verifier", verifier),
            ("client_id", self.config.client_id.as_str()),
        ];

        let token = self.request_token(&params, "").await?;
        info!(expiry = ?token.expiry, "Obtained access token");
        Ok(token)
    }

    /// Obtain a new access token with a refresh token.
    ///
    /// When the response carries no new refresh token the old one is kept.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<Token, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::NoRefreshToken);
        }

        debug!("Refreshing access token");

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];

        let token = self.request_token(&params, refresh_token).await?;
        info!(expiry = ?token.expiry, "Refreshed access token");
        Ok(token)
    }

    async fn request_token(
        &self,
        params: &[(&str, &str)],
        previous_refresh_token: &str,
    ) -> Result<Token, AuthError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Token request failed");
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.into_token(previous_refresh_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OAuthClient {
        let mut config = OAuthConfig::twitter("cid", "secret", "http://localhost:8080/callback");
        config.token_url = format!("{}/2/oauth2/token", server.uri());
        OAuthClient::new(config)
    }

    #[test]
    fn test_authorize_url_parameters() {
        let client = OAuthClient::new(OAuthConfig::twitter(
            "cid",
            "secret",
            "http://localhost:8080/callback",
        ));
        let pkce = PkceChallenge::from_verifier("verifier");
        let url = client.authorize_url("xyz", &pkce).unwrap();

        assert_eq!(url.host_str(), Some("twitter.com"));
        assert_eq!(url.path(), "/i/oauth2/authorize");

        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "cid");
        assert_eq!(query["redirect_uri"], "http://localhost:8080/callback");
        assert_eq!(
            query["scope"],
            "tweet.read users.read bookmark.read bookmark.write offline.access"
        );
        assert_eq!(query["state"], "xyz");
        assert_eq!(query["code_challenge"], pkce.challenge());
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["access_type"], "offline");
    }

    #[test]
    fn test_token_expiry() {
        let mut token = Token {
            access_token: "a".to_string(),
            token_type: "bearer".to_string(),
            refresh_token: String::new(),
            expiry: None,
        };
        assert!(!token.is_expired());

        token.expiry = Some(Utc::now() + ChronoDuration::hours(2));
        assert!(!token.is_expired());

        token.expiry = Some(Utc::now() + ChronoDuration::seconds(5));
        assert!(token.is_expired());

        token.expiry = Some(Utc::now() - ChronoDuration::minutes(1));
        assert!(token.is_expired());
    }

    #[test]
    fn test_zero_expiry_never_expires() {
        let token: Token = serde_json::from_str(
            r#"{"access_token":"a","token_type":"bearer","expiry":"0001-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn test_exchange_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .and(header_exists("Authorization"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .and(body_string_contains("code_verifier=the-verifier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "bearer",
                "expires_in": 7200,
                "access_token": "access-1",
                "scope": "tweet.read users.read bookmark.read bookmark.write offline.access",
                "refresh_token": "refresh-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = client_for(&server)
            .exchange_code("the-code", "the-verifier")
            .await
            .unwrap();

        assert_eq!(token.access_token, "access-1");
        assert_eq!(token.refresh_token, "refresh-1");
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn test_refresh_keeps_old_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "bearer",
                "expires_in": 7200,
                "access_token": "access-2"
            })))
            .mount(&server)
            .await;

        let token = client_for(&server).refresh("old-refresh").await.unwrap();
        assert_eq!(token.access_token, "access-2");
        assert_eq!(token.refresh_token, "old-refresh");
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let server = MockServer::start().await;
        let err = client_for(&server).refresh("").await.unwrap_err();
        assert!(matches!(err, AuthError::NoRefreshToken));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_token_endpoint_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_request"}"#),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).refresh("stale").await.unwrap_err();
        match err {
            AuthError::TokenEndpoint { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_request"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
