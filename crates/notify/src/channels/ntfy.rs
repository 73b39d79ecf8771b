//! ntfy push notification channel.
//!
//! Messages are published as plain text to `<server>/<topic>`; the event title,
//! priority and tags travel in ntfy's `Title`, `Priority` and `Tags` headers.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::events::NotifyEvent;
use crate::NotifyChannel;

/// Topic used when `NTFY_TOPIC` is not set.
pub const DEFAULT_TOPIC: &str = "tw2dynalist";

/// Connection settings for an ntfy server.
#[derive(Debug, Clone, Default)]
pub struct NtfyConfig {
    /// Base URL, e.g. `https://ntfy.sh`. `None` disables the channel.
    pub server: Option<String>,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// ntfy notification channel.
pub struct NtfyChannel {
    config: NtfyConfig,
    client: reqwest::Client,
}

impl NtfyChannel {
    /// Create an ntfy channel with explicit settings.
    #[must_use]
    pub fn new(config: NtfyConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn topic_url(&self, server: &str) -> String {
        format!(
            "{}/{}",
            server.trim_end_matches('/'),
            self.config.topic.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl NotifyChannel for NtfyChannel {
    fn name(&self) -> &'static str {
        "ntfy"
    }

    fn enabled(&self) -> bool {
        self.config.server.is_some()
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        let Some(server) = self.config.server.as_deref() else {
            debug!(channel = "ntfy", "ntfy server not configured, skipping");
            return Ok(());
        };

        let url = self.topic_url(server);
        let severity = event.severity();

        debug!(channel = "ntfy", url = %url, title = %event.title(), "Sending notification");

        let mut request = self
            .client
            .post(&url)
            .header("Title", event.title())
            .header("Priority", severity.priority().to_string())
            .header("Tags", severity.tag())
            .body(event.message());

        if let Some(click) = event.click_url() {
            request = request.header("Click", click);
        }

        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_deref());
        }

        let response = request.send().await?;

        if response.status() == StatusCode::OK {
            debug!(channel = "ntfy", "Notification sent successfully");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            warn!(
                channel = "ntfy",
                status = %status,
                body = %body,
                "ntfy publish request failed"
            );

            Err(ChannelError::Status {
                channel: "ntfy",
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel_for(server: &MockServer) -> NtfyChannel {
        NtfyChannel::new(NtfyConfig {
            server: Some(server.uri()),
            topic: "bookmarks".to_string(),
            username: None,
            password: None,
        })
    }

    #[tokio::test]
    async fn test_send_posts_message_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bookmarks"))
            .and(header("Title", "Bookmark Check Failed"))
            .and(header("Priority", "4"))
            .and(header("Tags", "warning"))
            .and(body_string_contains("rate limited"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = channel_for(&server);
        channel
            .send(&NotifyEvent::cycle_failed("rate limited"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_uses_basic_auth_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bookmarks"))
            .and(header_exists("Authorization"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = NtfyChannel::new(NtfyConfig {
            server: Some(format!("{}/", server.uri())),
            topic: "bookmarks".to_string(),
            username: Some("bot".to_string()),
            password: Some("secret".to_string()),
        });
        channel
            .send(&NotifyEvent::items_forwarded(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_authorization_event_sets_click_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Click", "https://twitter.com/i/oauth2/authorize?x=1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        channel_for(&server)
            .send(&NotifyEvent::authorization_required(
                "https://twitter.com/i/oauth2/authorize?x=1",
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_non_ok_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = channel_for(&server)
            .send(&NotifyEvent::items_forwarded(1))
            .await
            .unwrap_err();

        match err {
            ChannelError::Status { status, body, .. } => {
                assert_eq!(status, 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unset_server_is_noop() {
        let channel = NtfyChannel::new(NtfyConfig {
            topic: DEFAULT_TOPIC.to_string(),
            ..NtfyConfig::default()
        });
        assert!(!channel.enabled());
        channel
            .send(&NotifyEvent::items_forwarded(1))
            .await
            .unwrap();
    }
}
