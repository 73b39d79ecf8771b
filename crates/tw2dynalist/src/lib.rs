//! Twitter/X bookmark to Dynalist inbox forwarder.
//!
//! This crate provides:
//! - OAuth2 (PKCE) token acquisition, persistence and refresh for Twitter
//! - A Twitter API v2 client for listing and removing bookmarks
//! - A Dynalist inbox client with rate-limit retries
//! - A persistent set of processed bookmark IDs
//! - The processing cycle, a fixed-interval scheduler, and an HTTP server
//!   with a status dashboard and the OAuth callback

pub mod auth;
pub mod cache;
pub mod config;
pub mod dynalist;
pub mod metrics;
pub mod processor;
pub mod scheduler;
pub mod server;
pub mod telemetry;
pub mod twitter;

// Re-export main types
pub use cache::ProcessedCache;
pub use config::Config;
pub use dynalist::{DynalistClient, RetryPolicy};
pub use metrics::{Metrics, MetricsSnapshot, Status};
pub use processor::{BookmarkSource, CycleReport, InboxSink, Processor, ProcessorOptions};
pub use scheduler::Scheduler;
pub use twitter::{Bookmark, TwitterClient};
