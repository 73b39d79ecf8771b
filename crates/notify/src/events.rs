//! Notification event types for the bookmark bot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity levels for alerts and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - normal operations
    Info,
    /// Warning - something needs attention
    Warning,
    /// Critical - immediate action required
    Critical,
}

impl Severity {
    /// ntfy message priority (1-5) for this severity.
    #[must_use]
    pub const fn priority(&self) -> u8 {
        match self {
            Self::Info => 3,
            Self::Warning => 4,
            Self::Critical => 5,
        }
    }

    /// ntfy tag (rendered as an emoji by ntfy clients).
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Info => "information_source",
            Self::Warning => "warning",
            Self::Critical => "rotating_light",
        }
    }

    /// Get display name for this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Critical => "Critical",
        }
    }
}

/// Events that can trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    // =========================================================================
    // Authorization lifecycle
    // =========================================================================
    /// No token is stored; a human has to open the authorization URL.
    AuthorizationRequired {
        url: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// The stored token could not be refreshed and was discarded.
    ReauthorizationRequired {
        reason: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Processing cycle
    // =========================================================================
    /// A processing cycle failed before any bookmark was handled.
    CycleFailed {
        error: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// New bookmarks were forwarded to the Dynalist inbox.
    ItemsForwarded {
        count: usize,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// One-shot removal of already processed bookmarks finished.
    CleanupFinished {
        removed: usize,
        failed: usize,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl NotifyEvent {
    /// Build an [`NotifyEvent::AuthorizationRequired`] stamped now.
    #[must_use]
    pub fn authorization_required(url: impl Into<String>) -> Self {
        Self::AuthorizationRequired {
            url: url.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build a [`NotifyEvent::ReauthorizationRequired`] stamped now.
    #[must_use]
    pub fn reauthorization_required(reason: impl Into<String>) -> Self {
        Self::ReauthorizationRequired {
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build a [`NotifyEvent::CycleFailed`] stamped now.
    #[must_use]
    pub fn cycle_failed(error: impl Into<String>) -> Self {
        Self::CycleFailed {
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build an [`NotifyEvent::ItemsForwarded`] stamped now.
    #[must_use]
    pub fn items_forwarded(count: usize) -> Self {
        Self::ItemsForwarded {
            count,
            timestamp: Utc::now(),
        }
    }

    /// Build a [`NotifyEvent::CleanupFinished`] stamped now.
    #[must_use]
    pub fn cleanup_finished(removed: usize, failed: usize) -> Self {
        Self::CleanupFinished {
            removed,
            failed,
            timestamp: Utc::now(),
        }
    }

    /// Get a short title for this event type.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::AuthorizationRequired { .. } => "Twitter Authorization Required".to_string(),
            Self::ReauthorizationRequired { .. } => {
                "Twitter Re-authorization Required".to_string()
            }
            Self::CycleFailed { .. } => "Bookmark Check Failed".to_string(),
            Self::ItemsForwarded { count, .. } => {
                let noun = if *count == 1 { "Bookmark" } else { "Bookmarks" };
                format!("{count} {noun} Saved to Dynalist")
            }
            Self::CleanupFinished { .. } => "Bookmark Cleanup Finished".to_string(),
        }
    }

    /// Get the message body for this event.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::AuthorizationRequired { url, .. } => {
                format!("Open this URL to authorize tw2dynalist:\n{url}")
            }
            Self::ReauthorizationRequired { reason, .. } => format!(
                "The stored token was removed ({reason}). Restart tw2dynalist and complete the authorization flow again."
            ),
            Self::CycleFailed { error, .. } => format!("Failed to fetch bookmarks: {error}"),
            Self::ItemsForwarded { count, .. } => {
                format!("Forwarded {count} new bookmark(s) to the Dynalist inbox.")
            }
            Self::CleanupFinished {
                removed, failed, ..
            } => {
                if *failed == 0 {
                    format!("Removed {removed} processed bookmark(s).")
                } else {
                    format!("Removed {removed} processed bookmark(s), {failed} removal(s) failed.")
                }
            }
        }
    }

    /// Get the severity for this event.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::ItemsForwarded { .. } => Severity::Info,
            Self::CleanupFinished { failed, .. } => {
                if *failed == 0 {
                    Severity::Info
                } else {
                    Severity::Warning
                }
            }
            Self::AuthorizationRequired { .. } | Self::CycleFailed { .. } => Severity::Warning,
            Self::ReauthorizationRequired { .. } => Severity::Critical,
        }
    }

    /// URL a notification click should open, if any.
    #[must_use]
    pub fn click_url(&self) -> Option<&str> {
        match self {
            Self::AuthorizationRequired { url, .. } => Some(url),
            _ => None,
        }
    }

    /// Get the timestamp for this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::AuthorizationRequired { timestamp, .. }
            | Self::ReauthorizationRequired { timestamp, .. }
            | Self::CycleFailed { timestamp, .. }
            | Self::ItemsForwarded { timestamp, .. }
            | Self::CleanupFinished { timestamp, .. } => *timestamp,
        }
    }
}
