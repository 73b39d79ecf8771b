//! End-to-end tests of the bookmark processing cycle.
//!
//! Twitter (API and token endpoint) and Dynalist are both served by
//! `wiremock`; the cache and token files live in a temporary directory.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use notify::Notifier;
use tempfile::TempDir;
use tw2dynalist::auth::{OAuthClient, OAuthConfig, Token, TokenManager, TokenStore};
use tw2dynalist::{
    CycleReport, DynalistClient, Metrics, ProcessedCache, Processor, ProcessorOptions,
    RetryPolicy, Status, TwitterClient,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    dir: TempDir,
    twitter: MockServer,
    dynalist: MockServer,
    metrics: Arc<Metrics>,
}

impl Harness {
    async fn start() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            twitter: MockServer::start().await,
            dynalist: MockServer::start().await,
            metrics: Arc::new(Metrics::new(Duration::from_secs(3600))),
        }
    }

    fn token_store(&self) -> TokenStore {
        TokenStore::new(self.dir.path().join("token.json"))
    }

    fn cache_path(&self) -> std::path::PathBuf {
        self.dir.path().join("data").join("cache.json")
    }

    fn twitter_client(&self) -> TwitterClient {
        let token = Token {
            access_token: "access".to_string(),
            token_type: "bearer".to_string(),
            refresh_token: "refresh".to_string(),
            expiry: Some(Utc::now() + chrono::Duration::hours(1)),
        };
        let store = self.token_store();
        store.save(&token, "42").unwrap();

        let mut oauth = OAuthConfig::twitter("cid", "secret", "http://localhost/callback");
        oauth.token_url = format!("{}/2/oauth2/token", self.twitter.uri());

        let tokens = TokenManager::new(OAuthClient::new(oauth), store, token, "42".to_string())
            .with_metrics(self.metrics.clone());
        TwitterClient::new(tokens, "jack", self.twitter.uri())
    }

    fn processor(&self, cache: Arc<ProcessedCache>, remove_bookmarks: bool) -> Processor {
        let dynalist = DynalistClient::new("dyn-secret")
            .unwrap()
            .with_endpoint(format!("{}/api/v1/inbox/add", self.dynalist.uri()))
            .with_retry(RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(5),
            });

        Processor::new(
            Arc::new(self.twitter_client()),
            Arc::new(dynalist),
            cache,
            self.metrics.clone(),
            Arc::new(Notifier::disabled()),
            ProcessorOptions {
                remove_bookmarks,
                item_pause: Duration::ZERO,
            },
        )
    }

    async fn mount_bookmarks(&self, ids: &[&str]) {
        let data: Vec<_> = ids
            .iter()
            .map(|id| serde_json::json!({"id": id, "text": format!("tweet {id}"), "author_id": "10"}))
            .collect();

        Mock::given(method("GET"))
            .and(path("/2/users/42/bookmarks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": data,
                "includes": {"users": [{"id": "10", "name": "Alice", "username": "alice"}]}
            })))
            .mount(&self.twitter)
            .await;
    }
}

fn dynalist_reply(code: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({"_code": code, "_msg": ""}))
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_bookmarks_are_forwarded_exactly_once() {
    let h = Harness::start().await;
    h.mount_bookmarks(&["1", "2"]).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/inbox/add"))
        .and(body_string_contains("URL: https://twitter.com/alice/status/"))
        .respond_with(dynalist_reply("Ok"))
        .expect(2)
        .mount(&h.dynalist)
        .await;

    let cache = Arc::new(ProcessedCache::open(h.cache_path()).unwrap());
    let processor = h.processor(cache, false);

    let first = processor.process_bookmarks().await.unwrap();
    assert_eq!(
        first,
        CycleReport {
            fetched: 2,
            processed: 2,
            ..CycleReport::default()
        }
    );

    let second = processor.process_bookmarks().await.unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 2);

    let reopened = ProcessedCache::open(h.cache_path()).unwrap();
    assert!(reopened.is_processed("1"));
    assert!(reopened.is_processed("2"));

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.status, Status::Running);
    assert_eq!(snapshot.total_dynalist_saves, 2);
}

#[tokio::test]
async fn test_legacy_cache_entries_are_skipped() {
    let h = Harness::start().await;
    std::fs::create_dir_all(h.cache_path().parent().unwrap()).unwrap();
    std::fs::write(
        h.cache_path(),
        r#"{"processed_tweets": {"1": true, "2": false}}"#,
    )
    .unwrap();

    h.mount_bookmarks(&["1", "2"]).await;
    Mock::given(method("POST"))
        .and(body_string_contains("Tweet: tweet 2"))
        .respond_with(dynalist_reply("Ok"))
        .expect(1)
        .mount(&h.dynalist)
        .await;

    let cache = Arc::new(ProcessedCache::open(h.cache_path()).unwrap());
    let report = h.processor(cache, false).process_bookmarks().await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.processed, 1);

    // rewritten in the flat shape
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(h.cache_path()).unwrap()).unwrap();
    assert_eq!(saved, serde_json::json!({"1": true, "2": true}));
}

#[tokio::test]
async fn test_rate_limited_item_is_left_for_next_cycle() {
    let h = Harness::start().await;
    h.mount_bookmarks(&["1", "2"]).await;
    Mock::given(method("POST"))
        .and(body_string_contains("Tweet: tweet 1"))
        .respond_with(dynalist_reply("TooManyRequests"))
        .expect(3)
        .mount(&h.dynalist)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("Tweet: tweet 2"))
        .respond_with(dynalist_reply("Ok"))
        .expect(1)
        .mount(&h.dynalist)
        .await;

    let cache = Arc::new(ProcessedCache::open(h.cache_path()).unwrap());
    let report = h
        .processor(cache.clone(), false)
        .process_bookmarks()
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.processed, 1);
    assert!(!cache.is_processed("1"));
    assert!(cache.is_processed("2"));
}

#[tokio::test]
async fn test_forwarded_bookmarks_are_removed() {
    let h = Harness::start().await;
    h.mount_bookmarks(&["1", "2"]).await;
    Mock::given(method("POST"))
        .respond_with(dynalist_reply("Ok"))
        .mount(&h.dynalist)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/2/users/42/bookmarks/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"data": {"bookmarked": false}}),
        ))
        .expect(1)
        .mount(&h.twitter)
        .await;
    // already gone
    Mock::given(method("DELETE"))
        .and(path("/2/users/42/bookmarks/2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&h.twitter)
        .await;

    let cache = Arc::new(ProcessedCache::open(h.cache_path()).unwrap());
    let report = h.processor(cache, true).process_bookmarks().await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.removed, 2);
}

#[tokio::test]
async fn test_rejected_refresh_requires_reauthorization() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/2/users/42/bookmarks"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.twitter)
        .await;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string(
            r#"{"error":"invalid_request","error_description":"Value passed for the token was invalid."}"#,
        ))
        .expect(1)
        .mount(&h.twitter)
        .await;
    Mock::given(method("POST"))
        .respond_with(dynalist_reply("Ok"))
        .expect(0)
        .mount(&h.dynalist)
        .await;

    let cache = Arc::new(ProcessedCache::open(h.cache_path()).unwrap());
    let processor = h.processor(cache, false);
    assert!(h.token_store().exists());

    let err = processor.process_bookmarks().await.unwrap_err();

    assert!(err.requires_reauthorization());
    assert!(!h.token_store().exists());

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.status, Status::Error);
    assert!(snapshot.last_error.is_some());
    assert!(snapshot.last_check_time.is_none());
}
