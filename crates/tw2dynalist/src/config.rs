//! Configuration for the bookmark bot, loaded from environment variables.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use notify::NtfyConfig;
use thiserror::Error;

use crate::telemetry::LogFormat;

/// Default processed-set file.
pub const DEFAULT_CACHE_FILE: &str = "cache.json";
/// Default token file.
pub const DEFAULT_TOKEN_FILE: &str = "token.json";
/// Default interval between bookmark checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Default HTTP listener port (OAuth callback and dashboard).
pub const DEFAULT_CALLBACK_PORT: u16 = 8080;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is unset or empty
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    /// `CHECK_INTERVAL` is not a duration string
    #[error("invalid CHECK_INTERVAL {value:?}: {reason}")]
    InvalidInterval { value: String, reason: String },

    /// `CALLBACK_PORT` is not a port number
    #[error("invalid CALLBACK_PORT {0:?}")]
    InvalidPort(String),
}

/// Runtime configuration.
#[derive(Clone)]
pub struct Config {
    // Dynalist
    pub dynalist_token: String,

    // Twitter OAuth2
    pub twitter_client_id: String,
    pub twitter_client_secret: String,
    pub twitter_redirect_url: String,
    /// Account handle, without the leading `@`.
    pub twitter_username: String,

    // File paths
    pub cache_file_path: PathBuf,
    pub token_file_path: PathBuf,

    // Behaviour
    pub check_interval: Duration,
    pub remove_bookmarks: bool,
    pub cleanup_processed_bookmarks: bool,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,

    // HTTP server
    pub callback_port: u16,

    // Notifications
    pub ntfy: NtfyConfig,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));
        let flag = |name: &str| {
            get(name)
                .map(|v| {
                    let v = v.trim();
                    v.eq_ignore_ascii_case("true") || v == "1"
                })
                .unwrap_or(false)
        };

        let check_interval = match get("CHECK_INTERVAL") {
            Some(value) => parse_interval(&value)?,
            None => DEFAULT_CHECK_INTERVAL,
        };

        let callback_port = match get("CALLBACK_PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or(ConfigError::InvalidPort(value))?,
            None => DEFAULT_CALLBACK_PORT,
        };

        Ok(Self {
            dynalist_token: require("DYNALIST_TOKEN")?,
            twitter_client_id: require("TWITTER_CLIENT_ID")?,
            twitter_client_secret: require("TWITTER_CLIENT_SECRET")?,
            twitter_redirect_url: require("TWITTER_REDIRECT_URL")?,
            twitter_username: require("TW_USER")?
                .trim()
                .trim_start_matches('@')
                .to_string(),

            cache_file_path: get("CACHE_FILE_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE), PathBuf::from),
            token_file_path: get("TOKEN_FILE_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_TOKEN_FILE), PathBuf::from),

            check_interval,
            remove_bookmarks: flag("REMOVE_BOOKMARKS"),
            cleanup_processed_bookmarks: flag("CLEANUP_PROCESSED_BOOKMARKS"),

            log_level: get("LOG_LEVEL").unwrap_or_else(|| "INFO".to_string()),
            log_format: get("LOG_FORMAT").map_or(LogFormat::Text, |v| LogFormat::parse(&v)),

            callback_port,

            ntfy: NtfyConfig {
                server: get("NTFY_SERVER"),
                topic: get("NTFY_TOPIC")
                    .unwrap_or_else(|| notify::channels::ntfy::DEFAULT_TOPIC.to_string()),
                username: get("NTFY_USERNAME"),
                password: get("NTFY_PASSWORD"),
            },
        })
    }
}

/// Parse a duration string such as `5m`, `1h30m` or `90s`.
pub fn parse_interval(value: &str) -> Result<Duration, ConfigError> {
    let interval = humantime::parse_duration(value.trim()).map_err(|e| {
        ConfigError::InvalidInterval {
            value: value.to_string(),
            reason: e.to_string(),
        }
    })?;

    if interval.is_zero() {
        return Err(ConfigError::InvalidInterval {
            value: value.to_string(),
            reason: "interval must be greater than zero".to_string(),
        });
    }

    Ok(interval)
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("dynalist_token", &"<redacted>")
            .field("twitter_client_id", &self.twitter_client_id)
            .field("twitter_client_secret", &"<redacted>")
            .field("twitter_redirect_url", &self.twitter_redirect_url)
            .field("twitter_username", &self.twitter_username)
            .field("cache_file_path", &self.cache_file_path)
            .field("token_file_path", &self.token_file_path)
            .field("check_interval", &self.check_interval)
            .field("remove_bookmarks", &self.remove_bookmarks)
            .field(
                "cleanup_processed_bookmarks",
                &self.cleanup_processed_bookmarks,
            )
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("callback_port", &self.callback_port)
            .field("ntfy_server", &self.ntfy.server)
            .field("ntfy_topic", &self.ntfy.topic)
            .finish_non_exhaustive()
    }
}
