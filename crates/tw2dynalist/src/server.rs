//! HTTP server: status dashboard, metrics API, health check, and the OAuth
//! redirect target.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::{CallbackOutcome, CallbackParams, CallbackRegistry};
use crate::metrics::{Metrics, MetricsSnapshot};

const DASHBOARD: &str = "dashboard";

const DASHBOARD_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta http-equiv="refresh" content="30">
  <title>tw2dynalist</title>
  <style>
    body { font-family: sans-serif; margin: 2em; }
    table { border-collapse: collapse; }
    td { padding: 4px 12px; border-bottom: 1px solid #ddd; }
    .status-Running { color: #2e7d32; }
    .status-Processing { color: #1565c0; }
    .status-Starting { color: #6d6d6d; }
    .status-Error { color: #c62828; }
  </style>
</head>
<body>
  <h1>tw2dynalist</h1>
  <table>
    <tr><td>Status</td><td class="status-{{status}}">{{status}}</td></tr>
    <tr><td>Uptime</td><td>{{uptime}}</td></tr>
    <tr><td>Check Interval</td><td>{{check_interval}}</td></tr>
    <tr><td>Last Check</td><td>{{last_check}}</td></tr>
    <tr><td>Next Check</td><td>{{next_check}}</td></tr>
    <tr><td>Bookmarks Processed</td><td>{{total_bookmarks_processed}}</td></tr>
    <tr><td>Dynalist Saves</td><td>{{total_dynalist_saves}}</td></tr>
    <tr><td>Token Expires</td><td>{{token_expires}}</td></tr>
    <tr><td>Token Refreshes</td><td>{{token_refresh_count}}</td></tr>
    {{#if last_error}}
    <tr><td>Last Error</td><td class="status-Error">{{last_error}} ({{last_error_time}})</td></tr>
    {{/if}}
  </table>
</body>
</html>
"#;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<Metrics>,
    pub callbacks: CallbackRegistry,
    templates: Arc<Handlebars<'static>>,
}

impl AppState {
    pub fn new(
        metrics: Arc<Metrics>,
        callbacks: CallbackRegistry,
    ) -> Result<Self, handlebars::TemplateError> {
        let mut templates = Handlebars::new();
        templates.register_template_string(DASHBOARD, DASHBOARD_TEMPLATE)?;

        Ok(Self {
            metrics,
            callbacks,
            templates: Arc::new(templates),
        })
    }
}

/// Build the HTTP router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/api/metrics", get(metrics_json))
        .route("/health", get(health_check))
        .route("/callback", get(oauth_callback))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn metrics_json(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn dashboard(State(state): State<AppState>) -> Result<Html<String>, StatusCode> {
    let view = DashboardView::from(state.metrics.snapshot());

    state
        .templates
        .render(DASHBOARD, &view)
        .map(Html)
        .map_err(|e| {
            error!(error = %e, "Failed to render dashboard");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// OAuth redirect target.
async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    match state.callbacks.complete(params) {
        CallbackOutcome::Authorized => (
            StatusCode::OK,
            "Authorization Successful! You can close this window.".to_string(),
        ),
        CallbackOutcome::Rejected(reason) => {
            warn!(%reason, "Rejected OAuth callback");
            (StatusCode::BAD_REQUEST, reason)
        }
        CallbackOutcome::NotPending => {
            warn!("OAuth callback received with no authorization in progress");
            (
                StatusCode::CONFLICT,
                "No authorization in progress".to_string(),
            )
        }
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

// =============================================================================
// Dashboard view
// =============================================================================

#[derive(Debug, Serialize)]
struct DashboardView {
    status: &'static str,
    uptime: String,
    check_interval: String,
    last_check: String,
    next_check: String,
    total_bookmarks_processed: u64,
    total_dynalist_saves: u64,
    token_expires: String,
    token_refresh_count: u64,
    last_error: Option<String>,
    last_error_time: String,
}

impl From<MetricsSnapshot> for DashboardView {
    fn from(snapshot: MetricsSnapshot) -> Self {
        let uptime = Duration::from_secs(u64::try_from(snapshot.uptime_secs).unwrap_or(0));

        Self {
            status: snapshot.status.as_str(),
            uptime: humantime::format_duration(uptime).to_string(),
            check_interval: snapshot.check_interval,
            last_check: format_time(snapshot.last_check_time, "Never"),
            next_check: format_time(snapshot.next_check_time, "Not scheduled"),
            total_bookmarks_processed: snapshot.total_bookmarks_processed,
            total_dynalist_saves: snapshot.total_dynalist_saves,
            token_expires: format_time(snapshot.token_expires_at, "Unknown"),
            token_refresh_count: snapshot.token_refresh_count,
            last_error: snapshot.last_error,
            last_error_time: format_time(snapshot.last_error_time, ""),
        }
    }
}

fn format_time(time: Option<DateTime<Utc>>, fallback: &str) -> String {
    time.map_or_else(
        || fallback.to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::metrics::Status;

    fn state() -> AppState {
        AppState::new(
            Arc::new(Metrics::new(Duration::from_secs(3600))),
            CallbackRegistry::new(),
        )
        .unwrap()
    }

    async fn get_path(state: AppState, uri: &str) -> (StatusCode, String) {
        let response = build_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_path(state(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value, json!({"status": "healthy"}));
    }

    #[tokio::test]
    async fn test_metrics_json() {
        let state = state();
        state.metrics.record_check(4, 4);
        state.metrics.update_status(Status::Running);

        let (status, body) = get_path(state, "/api/metrics").await;
        assert_eq!(status, StatusCode::OK);

        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["status"], "Running");
        assert_eq!(value["total_bookmarks_processed"], 4);
        assert_eq!(value["check_interval"], "1h");
        assert!(value["next_check_time"].is_string());
    }

    #[tokio::test]
    async fn test_dashboard_before_first_check() {
        let (status, body) = get_path(state(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"<meta http-equiv="refresh" content="30">"#));
        assert!(body.contains("Starting"));
        assert!(body.contains("Never"));
        assert!(body.contains("Not scheduled"));
        assert!(!body.contains("Last Error"));
    }

    #[tokio::test]
    async fn test_dashboard_escapes_last_error() {
        let state = state();
        state.metrics.record_error("<script>bad</script>");

        let (_, body) = get_path(state, "/").await;
        assert!(body.contains("Last Error"));
        assert!(body.contains("&lt;script&gt;"));
        assert!(!body.contains("<script>bad"));
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let (status, _) = get_path(state(), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_callback_delivers_code() {
        let state = state();
        let pending = state.callbacks.register("expected");

        let (status, body) = get_path(state, "/callback?state=expected&code=the-code").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Authorization Successful"));

        let code = pending.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(code, "the-code");
    }

    #[tokio::test]
    async fn test_callback_state_mismatch() {
        let state = state();
        let _pending = state.callbacks.register("expected");

        let (status, body) = get_path(state.clone(), "/callback?state=forged&code=x").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid OAuth state");
        assert!(state.callbacks.is_pending());
    }

    #[tokio::test]
    async fn test_callback_without_pending_authorization() {
        let (status, _) = get_path(state(), "/callback?state=a&code=b").await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
