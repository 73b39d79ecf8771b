//! Error types for the notification system.

use thiserror::Error;

/// Errors that can occur when sending notifications.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The notification service answered with a non-success status
    #[error("{channel} returned {status}: {body}")]
    Status {
        channel: &'static str,
        status: u16,
        body: String,
    },
}
