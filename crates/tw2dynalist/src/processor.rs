//! One bookmark-forwarding cycle.
//!
//! Fetches bookmarks from the source, skips the ones recorded in the cache,
//! pushes the rest to the inbox, marks them processed, optionally removes
//! them from the source, and saves the cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notify::{Notifier, NotifyEvent};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cache::ProcessedCache;
use crate::dynalist::{DynalistClient, DynalistError};
use crate::metrics::{Metrics, Status};
use crate::twitter::{Bookmark, TwitterClient, TwitterError};

/// Pause between forwarded items.
pub const DEFAULT_ITEM_PAUSE: Duration = Duration::from_millis(200);

/// Where bookmarks come from.
#[async_trait]
pub trait BookmarkSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Bookmark>, TwitterError>;

    async fn remove(&self, id: &str) -> Result<(), TwitterError>;
}

/// Where bookmarks are forwarded to.
#[async_trait]
pub trait InboxSink: Send + Sync {
    async fn push(&self, content: &str, note: &str) -> Result<(), DynalistError>;
}

#[async_trait]
impl BookmarkSource for TwitterClient {
    async fn fetch(&self) -> Result<Vec<Bookmark>, TwitterError> {
        self.list_bookmarks().await
    }

    async fn remove(&self, id: &str) -> Result<(), TwitterError> {
        self.remove_bookmark(id).await
    }
}

#[async_trait]
impl InboxSink for DynalistClient {
    async fn push(&self, content: &str, note: &str) -> Result<(), DynalistError> {
        self.add_to_inbox(content, note).await
    }
}

/// Counts for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Bookmarks returned by the source.
    pub fetched: usize,
    /// Newly forwarded and marked.
    pub processed: usize,
    /// Already in the cache.
    pub skipped: usize,
    /// Rejected by the sink; retried next cycle.
    pub failed: usize,
    /// Removed from the source after forwarding.
    pub removed: usize,
}

/// Processing behaviour switches.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorOptions {
    pub remove_bookmarks: bool,
    pub item_pause: Duration,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            remove_bookmarks: false,
            item_pause: DEFAULT_ITEM_PAUSE,
        }
    }
}

/// Runs bookmark-forwarding cycles.
pub struct Processor {
    source: Arc<dyn BookmarkSource>,
    sink: Arc<dyn InboxSink>,
    cache: Arc<ProcessedCache>,
    metrics: Arc<Metrics>,
    notifier: Arc<Notifier>,
    options: ProcessorOptions,
}

impl Processor {
    pub fn new(
        source: Arc<dyn BookmarkSource>,
        sink: Arc<dyn InboxSink>,
        cache: Arc<ProcessedCache>,
        metrics: Arc<Metrics>,
        notifier: Arc<Notifier>,
        options: ProcessorOptions,
    ) -> Self {
        Self {
            source,
            sink,
            cache,
            metrics,
            notifier,
            options,
        }
    }

    /// Run one cycle.
    ///
    /// A failed fetch is recorded in the metrics, notified, and returned;
    /// per-item failures are only counted.
    pub async fn process_bookmarks(&self) -> Result<CycleReport, TwitterError> {
        info!("Starting to process bookmarks");
        self.metrics.update_status(Status::Processing);

        let bookmarks = match self.source.fetch().await {
            Ok(bookmarks) => bookmarks,
            Err(e) => {
                error!(error = %e, "Failed to get bookmarks");
                self.metrics.record_error(e.to_string());
                self.metrics.update_status(Status::Error);
                if e.requires_reauthorization() {
                    self.notifier
                        .notify(NotifyEvent::reauthorization_required(e.to_string()));
                } else {
                    self.notifier.notify(NotifyEvent::cycle_failed(e.to_string()));
                }
                return Err(e);
            }
        };

        info!(count = bookmarks.len(), "Found bookmarked tweets");

        let mut report = CycleReport {
            fetched: bookmarks.len(),
            ..CycleReport::default()
        };

        for bookmark in &bookmarks {
            if self.cache.is_processed(&bookmark.id) {
                report.skipped += 1;
                continue;
            }

            let content = format!("Tweet: {}", bookmark.text);
            let note = format!("URL: {}", bookmark.url);

            if let Err(e) = self.sink.push(&content, &note).await {
                error!(tweet_id = %bookmark.id, error = %e, "Error adding tweet to Dynalist");
                report.failed += 1;
                continue;
            }

            self.cache.mark_processed(&bookmark.id);
            report.processed += 1;
            info!(tweet_id = %bookmark.id, url = %bookmark.url, "Saved tweet to Dynalist");

            if self.options.remove_bookmarks {
                match self.source.remove(&bookmark.id).await {
                    Ok(()) => report.removed += 1,
                    Err(e) => {
                        warn!(tweet_id = %bookmark.id, error = %e, "Failed to remove bookmark");
                    }
                }
            }

            tokio::time::sleep(self.options.item_pause).await;
        }

        if let Err(e) = self.cache.save() {
            error!(error = %e, "Error saving cache");
        }

        self.metrics.record_check(report.processed, report.processed);
        self.metrics.update_status(Status::Running);

        if report.processed > 0 {
            self.notifier
                .notify(NotifyEvent::items_forwarded(report.processed));
        }

        info!(
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            removed = report.removed,
            "Bookmark processing complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    use crate::auth::AuthError;

    #[derive(Default)]
    struct FakeSource {
        bookmarks: Vec<Bookmark>,
        fail_with_reauth: bool,
        removed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BookmarkSource for FakeSource {
        async fn fetch(&self) -> Result<Vec<Bookmark>, TwitterError> {
            if self.fail_with_reauth {
                return Err(TwitterError::Auth(AuthError::ReauthorizationRequired(
                    "invalid_grant".to_string(),
                )));
            }
            Ok(self.bookmarks.clone())
        }

        async fn remove(&self, id: &str) -> Result<(), TwitterError> {
            self.removed.lock().unwrap().push(id.to_string());
            if id == "bad" {
                return Err(TwitterError::Forbidden);
            }
            Ok(())
        }
    }

    /// Records pushes; rejects items whose content contains "reject".
    #[derive(Default)]
    struct FakeSink {
        pushed: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl InboxSink for FakeSink {
        async fn push(&self, content: &str, note: &str) -> Result<(), DynalistError> {
            if content.contains("reject") {
                return Err(DynalistError::RateLimited("slow down".to_string()));
            }
            self.pushed
                .lock()
                .unwrap()
                .push((content.to_string(), note.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        _dir: TempDir,
        cache: Arc<ProcessedCache>,
        metrics: Arc<Metrics>,
        source: Arc<FakeSource>,
        sink: Arc<FakeSink>,
        processor: Processor,
    }

    fn fixture(source: FakeSource, remove_bookmarks: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(ProcessedCache::open(dir.path().join("cache.json")).unwrap());
        let metrics = Arc::new(Metrics::new(Duration::from_secs(3600)));
        let source = Arc::new(source);
        let sink = Arc::new(FakeSink::default());

        let processor = Processor::new(
            source.clone(),
            sink.clone(),
            cache.clone(),
            metrics.clone(),
            Arc::new(Notifier::disabled()),
            ProcessorOptions {
                remove_bookmarks,
                item_pause: Duration::ZERO,
            },
        );

        Fixture {
            _dir: dir,
            cache,
            metrics,
            source,
            sink,
            processor,
        }
    }

    fn bookmarks(ids: &[&str]) -> Vec<Bookmark> {
        ids.iter()
            .map(|id| Bookmark::new(*id, format!("text {id}"), "alice"))
            .collect()
    }

    #[tokio::test]
    async fn test_new_bookmarks_are_forwarded_and_cached() {
        let f = fixture(
            FakeSource {
                bookmarks: bookmarks(&["1", "2"]),
                ..FakeSource::default()
            },
            false,
        );

        let report = f.processor.process_bookmarks().await.unwrap();

        assert_eq!(
            report,
            CycleReport {
                fetched: 2,
                processed: 2,
                ..CycleReport::default()
            }
        );
        assert_eq!(
            f.sink.pushed.lock().unwrap()[0],
            (
                "Tweet: text 1".to_string(),
                "URL: https://twitter.com/alice/status/1".to_string()
            )
        );
        assert!(f.cache.is_processed("1"));
        assert!(f.cache.is_processed("2"));
        assert!(f.cache.path().is_file());
        assert!(f.source.removed.lock().unwrap().is_empty());

        let snapshot = f.metrics.snapshot();
        assert_eq!(snapshot.status, Status::Running);
        assert_eq!(snapshot.total_bookmarks_processed, 2);
        assert_eq!(snapshot.total_dynalist_saves, 2);
        assert!(snapshot.next_check_time.is_some());
    }

    #[tokio::test]
    async fn test_cached_bookmarks_are_never_resubmitted() {
        let f = fixture(
            FakeSource {
                bookmarks: bookmarks(&["1", "2", "3"]),
                ..FakeSource::default()
            },
            false,
        );
        f.cache.mark_processed("2");

        let first = f.processor.process_bookmarks().await.unwrap();
        assert_eq!(first.processed, 2);
        assert_eq!(first.skipped, 1);

        let second = f.processor.process_bookmarks().await.unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.skipped, 3);

        let pushed = f.sink.pushed.lock().unwrap();
        assert_eq!(pushed.len(), 2);
        assert!(pushed.iter().all(|(content, _)| content != "Tweet: text 2"));
    }

    #[tokio::test]
    async fn test_sink_failure_is_not_marked() {
        let mut items = bookmarks(&["1"]);
        items.push(Bookmark::new("2", "please reject me", "bob"));
        let f = fixture(
            FakeSource {
                bookmarks: items,
                ..FakeSource::default()
            },
            false,
        );

        let report = f.processor.process_bookmarks().await.unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        assert!(f.cache.is_processed("1"));
        assert!(!f.cache.is_processed("2"));
    }

    #[tokio::test]
    async fn test_removal_after_forwarding() {
        let f = fixture(
            FakeSource {
                bookmarks: bookmarks(&["1", "bad"]),
                ..FakeSource::default()
            },
            true,
        );

        let report = f.processor.process_bookmarks().await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.removed, 1);
        assert_eq!(
            f.source.removed.lock().unwrap().as_slice(),
            ["1".to_string(), "bad".to_string()]
        );
        // a failed removal still counts as processed
        assert!(f.cache.is_processed("bad"));
    }

    #[tokio::test]
    async fn test_fetch_failure_sets_error_status() {
        let f = fixture(
            FakeSource {
                fail_with_reauth: true,
                ..FakeSource::default()
            },
            false,
        );

        let err = f.processor.process_bookmarks().await.unwrap_err();
        assert!(err.requires_reauthorization());

        let snapshot = f.metrics.snapshot();
        assert_eq!(snapshot.status, Status::Error);
        assert!(snapshot.last_error.unwrap().contains("re-authentication"));
        assert!(snapshot.last_check_time.is_none());
    }
}
