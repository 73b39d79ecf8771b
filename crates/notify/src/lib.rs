//! Notification system for tw2dynalist bot events.
//!
//! This crate provides a fire-and-forget notification system for pushing
//! alerts to a phone or desktop (via [ntfy](https://ntfy.sh)) when the bot
//! needs a human, fails a cycle, or forwards bookmarks.
//!
//! # Usage
//!
//! ```no_run
//! use notify::{Notifier, NotifyEvent, NtfyConfig};
//!
//! # async fn run() {
//! let notifier = Notifier::from_ntfy(NtfyConfig {
//!     server: Some("https://ntfy.sh".to_string()),
//!     topic: "tw2dynalist".to_string(),
//!     ..NtfyConfig::default()
//! });
//!
//! // Send a notification (fire-and-forget)
//! notifier.notify(NotifyEvent::items_forwarded(3));
//! # }
//! ```
//!
//! Without a server the notifier has no channels and `notify` is a no-op.
//!
//! # Architecture
//!
//! - [`NotifyChannel`] trait defines the interface for notification channels
//! - [`NtfyChannel`] implements ntfy publishing
//! - [`Notifier`] dispatches events to all enabled channels

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod error;
pub mod events;

pub use channels::ntfy::{NtfyChannel, NtfyConfig};
pub use channels::NotifyChannel;
pub use error::ChannelError;
pub use events::{NotifyEvent, Severity};

use std::sync::Arc;
use tracing::{debug, error, info};

/// Central notification dispatcher.
///
/// The `Notifier` manages multiple notification channels and dispatches
/// events to all enabled channels in a fire-and-forget manner.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
    disabled: bool,
}

impl Notifier {
    /// Create a notifier publishing to a single ntfy server.
    ///
    /// Channels whose server is unset are dropped, so the notifier ends up
    /// with no channels and every `notify` call is a no-op.
    #[must_use]
    pub fn from_ntfy(config: NtfyConfig) -> Self {
        let ntfy = NtfyChannel::new(config);
        let mut channels: Vec<Arc<dyn NotifyChannel>> = vec![];

        if ntfy.enabled() {
            info!("ntfy notifications enabled");
            channels.push(Arc::new(ntfy));
        } else {
            info!("No notification channels configured");
        }

        Self::with_channels(channels)
    }

    /// Create a notifier with specific channels.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self {
            channels,
            disabled: false,
        }
    }

    /// Create a disabled notifier (for testing or when notifications are off).
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            channels: vec![],
            disabled: true,
        }
    }

    /// Check if any notification channels are enabled.
    #[must_use]
    pub fn has_channels(&self) -> bool {
        !self.disabled && !self.channels.is_empty()
    }

    /// Get the number of enabled channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        if self.disabled {
            0
        } else {
            self.channels.len()
        }
    }

    /// Send a notification to all enabled channels (fire-and-forget).
    ///
    /// Spawns one task per channel and returns immediately. Errors are logged
    /// but not propagated to the caller. Must be called from within a Tokio
    /// runtime.
    pub fn notify(&self, event: NotifyEvent) {
        if !self.has_channels() {
            debug!("No active notification channels, skipping event");
            return;
        }

        let event = Arc::new(event);

        for channel in &self.channels {
            let channel = Arc::clone(channel);
            let event = Arc::clone(&event);

            tokio::spawn(async move {
                let channel_name = channel.name();

                if !channel.enabled() {
                    debug!(channel = channel_name, "Channel disabled, skipping");
                    return;
                }

                match channel.send(&event).await {
                    Ok(()) => {
                        debug!(channel = channel_name, "Notification sent");
                    }
                    Err(e) => {
                        error!(
                            channel = channel_name,
                            error = %e,
                            "Failed to send notification"
                        );
                    }
                }
            });
        }
    }

    /// Send a notification and wait for all channels to complete.
    ///
    /// Unlike `notify()`, this method waits for all notifications to be sent
    /// and collects any errors.
    pub async fn notify_and_wait(
        &self,
        event: NotifyEvent,
    ) -> Vec<(String, Result<(), ChannelError>)> {
        if !self.has_channels() {
            return vec![];
        }

        let mut results = vec![];

        for channel in &self.channels {
            let channel_name = channel.name().to_string();
            let result = channel.send(&event).await;
            results.push((channel_name, result));
        }

        results
    }
}
