//! Tracing subscriber setup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable single-line output.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value; anything but `json` is text.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Map a `LOG_LEVEL` value to a tracing filter directive.
///
/// Returns `None` for levels that are not recognised.
#[must_use]
pub fn level_directive(level: &str) -> Option<&'static str> {
    match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Some("trace"),
        "DEBUG" => Some("debug"),
        "INFO" => Some("info"),
        "WARN" | "WARNING" => Some("warn"),
        "ERROR" => Some("error"),
        _ => None,
    }
}

/// Filter used when `RUST_LOG` is unset.
///
/// `verbose` raises this crate and the notifier to debug and leaves
/// dependencies at `level`.
fn default_filter(level: Option<&str>, verbose: bool) -> String {
    let level = level.unwrap_or("info");
    if verbose {
        format!("{level},tw2dynalist=debug,notify=debug,hyper=warn,reqwest=warn")
    } else {
        format!("{level},hyper=warn,reqwest=warn")
    }
}

/// Initialize the global tracing subscriber.
///
/// An explicit `RUST_LOG` wins over `log_level`; `verbose` forces debug for
/// this crate's targets.
pub fn init_tracing(log_level: &str, format: LogFormat, verbose: bool) {
    let directive = level_directive(log_level);

    let filter = match std::env::var("RUST_LOG") {
        Ok(rust_log) if !rust_log.is_empty() => EnvFilter::new(rust_log),
        _ => EnvFilter::new(default_filter(directive, verbose)),
    };

    let (text, json) = match format {
        LogFormat::Text => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();

    if directive.is_none() {
        tracing::warn!(log_level, "Unknown LOG_LEVEL, falling back to INFO");
    }
}
