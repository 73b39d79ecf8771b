//! Runtime status and counters shown on the dashboard.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Starting,
    Processing,
    Running,
    Error,
}

impl Status {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "Starting",
            Self::Processing => "Processing",
            Self::Running => "Running",
            Self::Error => "Error",
        }
    }
}

/// Point-in-time copy of the metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub start_time: DateTime<Utc>,
    pub uptime_secs: i64,
    pub status: Status,
    pub last_check_time: Option<DateTime<Utc>>,
    pub next_check_time: Option<DateTime<Utc>>,
    pub total_bookmarks_processed: u64,
    pub total_dynalist_saves: u64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
    /// Human readable, e.g. `1h`.
    pub check_interval: String,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub token_refresh_count: u64,
}

#[derive(Debug)]
struct Inner {
    start_time: DateTime<Utc>,
    status: Status,
    last_check_time: Option<DateTime<Utc>>,
    next_check_time: Option<DateTime<Utc>>,
    total_bookmarks_processed: u64,
    total_dynalist_saves: u64,
    last_error: Option<String>,
    last_error_time: Option<DateTime<Utc>>,
    check_interval: Duration,
    token_expires_at: Option<DateTime<Utc>>,
    token_refresh_count: u64,
}

/// Shared metrics record. Cheap to update from any task.
#[derive(Debug)]
pub struct Metrics {
    inner: Mutex<Inner>,
}

impl Metrics {
    pub fn new(check_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                start_time: Utc::now(),
                status: Status::Starting,
                last_check_time: None,
                next_check_time: None,
                total_bookmarks_processed: 0,
                total_dynalist_saves: 0,
                last_error: None,
                last_error_time: None,
                check_interval,
                token_expires_at: None,
                token_refresh_count: 0,
            }),
        }
    }

    pub fn update_status(&self, status: Status) {
        self.lock().status = status;
    }

    /// Record a finished check and schedule the next one an interval from now.
    pub fn record_check(&self, processed: usize, saves: usize) {
        let now = Utc::now();
        let mut inner = self.lock();
        inner.last_check_time = Some(now);
        inner.next_check_time = chrono::Duration::from_std(inner.check_interval)
            .ok()
            .map(|interval| now + interval);
        inner.total_bookmarks_processed += processed as u64;
        inner.total_dynalist_saves += saves as u64;
    }

    /// Record an error and switch to [`Status::Error`].
    pub fn record_error(&self, error: impl Into<String>) {
        let mut inner = self.lock();
        inner.last_error = Some(error.into());
        inner.last_error_time = Some(Utc::now());
        inner.status = Status::Error;
    }

    pub fn record_token(&self, expires_at: Option<DateTime<Utc>>) {
        self.lock().token_expires_at = expires_at;
    }

    pub fn record_token_refresh(&self) {
        self.lock().token_refresh_count += 1;
    }

    pub fn status(&self) -> Status {
        self.lock().status
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock();
        MetricsSnapshot {
            start_time: inner.start_time,
            uptime_secs: (Utc::now() - inner.start_time).num_seconds(),
            status: inner.status,
            last_check_time: inner.last_check_time,
            next_check_time: inner.next_check_time,
            total_bookmarks_processed: inner.total_bookmarks_processed,
            total_dynalist_saves: inner.total_dynalist_saves,
            last_error: inner.last_error.clone(),
            last_error_time: inner.last_error_time,
            check_interval: humantime::format_duration(inner.check_interval).to_string(),
            token_expires_at: inner.token_expires_at,
            token_refresh_count: inner.token_refresh_count,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
