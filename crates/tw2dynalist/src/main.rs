//! tw2dynalist - forwards Twitter/X bookmarks to the Dynalist inbox.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notify::{Notifier, NotifyEvent};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tw2dynalist::auth::{
    CallbackRegistry, OAuthClient, OAuthConfig, TokenStore, AUTHORIZATION_TIMEOUT,
};
use tw2dynalist::config::{parse_interval, Config};
use tw2dynalist::processor::{Processor, ProcessorOptions, DEFAULT_ITEM_PAUSE};
use tw2dynalist::server::{self, AppState};
use tw2dynalist::twitter::{ConnectOptions, TwitterClient, TwitterError, DEFAULT_API_BASE};
use tw2dynalist::{telemetry, DynalistClient, Metrics, ProcessedCache, Scheduler, Status};

/// Upper bound on graceful HTTP shutdown.
const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after each bookmark removed during cleanup.
const CLEANUP_PAUSE: Duration = Duration::from_millis(500);

/// tw2dynalist - save Twitter/X bookmarks to the Dynalist inbox.
#[derive(Parser)]
#[command(name = "tw2dynalist")]
#[command(about = "Forward Twitter/X bookmarks to the Dynalist inbox")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Interval between bookmark checks (overrides CHECK_INTERVAL)
    #[arg(long, global = true, value_parser = parse_interval)]
    check_interval: Option<Duration>,

    /// HTTP listener port (overrides CALLBACK_PORT)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Processed-bookmark cache file (overrides CACHE_FILE_PATH)
    #[arg(long, global = true)]
    cache_file: Option<PathBuf>,

    /// OAuth token file (overrides TOKEN_FILE_PATH)
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
pub enum Commands {
    /// Run the bot: dashboard, scheduled checks, graceful shutdown (default)
    Run,

    /// Run a single processing cycle and exit (for CronJob use)
    Poll,

    /// Run the authorization flow and store the token
    Auth {
        /// Discard an existing token file first
        #[arg(long)]
        force: bool,
    },

    /// Remove already processed bookmarks from the account and exit
    Cleanup,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(interval) = self.check_interval {
            config.check_interval = interval;
        }
        if let Some(port) = self.port {
            config.callback_port = port;
        }
        if let Some(path) = &self.cache_file {
            config.cache_file_path.clone_from(path);
        }
        if let Some(path) = &self.token_file {
            config.token_file_path.clone_from(path);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env().context("failed to load configuration")?;
    cli.apply_overrides(&mut config);

    telemetry::init_tracing(&config.log_level, config.log_format, cli.verbose);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting tw2dynalist");
    debug!(?config, "Loaded configuration");

    let app = App::new(config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(app).await,
        Commands::Poll => run_poll(app).await,
        Commands::Auth { force } => run_auth(app, force).await,
        Commands::Cleanup => run_cleanup(app).await,
    }
}

// =============================================================================
// Shared wiring
// =============================================================================

struct App {
    config: Config,
    metrics: Arc<Metrics>,
    cache: Arc<ProcessedCache>,
    notifier: Arc<Notifier>,
    callbacks: CallbackRegistry,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let cache = ProcessedCache::open(&config.cache_file_path).with_context(|| {
            format!(
                "failed to open cache file {}",
                config.cache_file_path.display()
            )
        })?;

        Ok(Self {
            metrics: Arc::new(Metrics::new(config.check_interval)),
            notifier: Arc::new(Notifier::from_ntfy(config.ntfy.clone())),
            cache: Arc::new(cache),
            callbacks: CallbackRegistry::new(),
            config,
        })
    }

    /// Bind the listener and serve the router until `shutdown` is cancelled.
    async fn start_server(
        &self,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<std::io::Result<()>>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.callback_port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {addr}"))?;

        let state = AppState::new(self.metrics.clone(), self.callbacks.clone())
            .context("failed to register dashboard template")?;
        let router = server::build_router(state);

        Ok(tokio::spawn(server::serve(listener, router, async move {
            shutdown.cancelled().await;
        })))
    }

    /// Connect to Twitter, authorizing through `/callback` when no token is
    /// stored. The HTTP server must be running.
    async fn connect(&self) -> Result<TwitterClient> {
        let oauth = OAuthClient::new(OAuthConfig::twitter(
            &self.config.twitter_client_id,
            &self.config.twitter_client_secret,
            &self.config.twitter_redirect_url,
        ));

        TwitterClient::connect(ConnectOptions {
            oauth,
            store: TokenStore::new(&self.config.token_file_path),
            username: self.config.twitter_username.clone(),
            api_base: DEFAULT_API_BASE.to_string(),
            callbacks: &self.callbacks,
            notifier: &self.notifier,
            metrics: Some(self.metrics.clone()),
            authorization_timeout: AUTHORIZATION_TIMEOUT,
        })
        .await
        .context("failed to initialize Twitter client")
    }

    /// Connect while honouring SIGINT/SIGTERM. `None` means a signal arrived
    /// first.
    async fn connect_or_shutdown(&self) -> Result<Option<TwitterClient>> {
        tokio::select! {
            client = self.connect() => client.map(Some),
            () = shutdown_signal() => Ok(None),
        }
    }

    fn processor(&self, client: Arc<TwitterClient>) -> Result<Processor> {
        let dynalist = DynalistClient::new(&self.config.dynalist_token)
            .context("failed to build Dynalist client")?;

        Ok(Processor::new(
            client,
            Arc::new(dynalist),
            self.cache.clone(),
            self.metrics.clone(),
            self.notifier.clone(),
            ProcessorOptions {
                remove_bookmarks: self.config.remove_bookmarks,
                item_pause: DEFAULT_ITEM_PAUSE,
            },
        ))
    }

    /// Remove processed bookmarks from the account and notify the result.
    async fn cleanup(&self, client: &TwitterClient) -> Result<()> {
        match client.cleanup_processed(&self.cache, CLEANUP_PAUSE).await {
            Ok(report) => {
                self.notifier
                    .notify(NotifyEvent::cleanup_finished(report.removed, report.failed));
                Ok(())
            }
            Err(e) => {
                if let TwitterError::CleanupIncomplete { removed, failed } = &e {
                    self.notifier
                        .notify(NotifyEvent::cleanup_finished(*removed, *failed));
                }
                Err(e).context("bookmark cleanup failed")
            }
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn run(app: App) -> Result<()> {
    let server_shutdown = CancellationToken::new();
    let server = app.start_server(server_shutdown.clone()).await?;

    let Some(client) = app.connect_or_shutdown().await? else {
        info!("Shutdown requested before the Twitter client was ready");
        return stop_server(server_shutdown, server).await;
    };
    let client = Arc::new(client);

    if app.config.cleanup_processed_bookmarks {
        if let Err(e) = app.cleanup(&client).await {
            warn!(error = %e, "Continuing after cleanup failure");
        }
    }

    let processor = Arc::new(app.processor(client)?);
    let scheduler = Arc::new(Scheduler::new(app.config.check_interval));

    info!(
        interval = %humantime::format_duration(app.config.check_interval),
        remove_bookmarks = app.config.remove_bookmarks,
        "Bot started"
    );
    app.metrics.update_status(Status::Running);

    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler
                .run(move || {
                    let processor = processor.clone();
                    async move {
                        if let Err(e) = processor.process_bookmarks().await {
                            warn!(error = %e, "Bookmark check failed, retrying next interval");
                        }
                    }
                })
                .await;
        })
    };

    shutdown_signal().await;
    info!("Shutting down bot");

    scheduler.stop();
    if let Err(e) = runner.await {
        error!(error = %e, "Scheduler task failed");
    }

    stop_server(server_shutdown, server).await
}

async fn run_poll(app: App) -> Result<()> {
    let server_shutdown = CancellationToken::new();
    let server = app.start_server(server_shutdown.clone()).await?;

    let Some(client) = app.connect_or_shutdown().await? else {
        return stop_server(server_shutdown, server).await;
    };
    let processor = app.processor(Arc::new(client))?;
    let result = processor.process_bookmarks().await;

    stop_server(server_shutdown, server).await?;

    let report = result.context("bookmark check failed")?;
    println!("\nPoll Cycle Summary");
    println!("   Fetched: {}", report.fetched);
    println!("   Processed: {}", report.processed);
    println!("   Skipped: {}", report.skipped);
    println!("   Failed: {}", report.failed);
    println!("   Removed: {}", report.removed);
    Ok(())
}

async fn run_auth(app: App, force: bool) -> Result<()> {
    let store = TokenStore::new(&app.config.token_file_path);
    if force {
        let removed = store
            .remove()
            .context("failed to remove existing token file")?;
        if removed {
            info!(path = %store.path().display(), "Removed existing token file");
        }
    } else if store.exists() {
        info!(
            path = %store.path().display(),
            "Token file already exists, use --force to re-authorize"
        );
    }

    let server_shutdown = CancellationToken::new();
    let server = app.start_server(server_shutdown.clone()).await?;
    let client = app.connect_or_shutdown().await;
    stop_server(server_shutdown, server).await?;

    if let Some(client) = client? {
        println!(
            "Authorized @{} (token stored in {})",
            client.username(),
            store.path().display()
        );
    }
    Ok(())
}

async fn run_cleanup(app: App) -> Result<()> {
    let server_shutdown = CancellationToken::new();
    let server = app.start_server(server_shutdown.clone()).await?;

    let Some(client) = app.connect_or_shutdown().await? else {
        return stop_server(server_shutdown, server).await;
    };
    let result = app.cleanup(&client).await;

    stop_server(server_shutdown, server).await?;
    result
}

// =============================================================================
// Shutdown
// =============================================================================

async fn stop_server(
    shutdown: CancellationToken,
    server: JoinHandle<std::io::Result<()>>,
) -> Result<()> {
    shutdown.cancel();

    match tokio::time::timeout(SERVER_SHUTDOWN_TIMEOUT, server).await {
        Ok(joined) => {
            joined
                .context("HTTP server task failed")?
                .context("HTTP server error")?;
            info!("HTTP server stopped");
        }
        Err(_) => warn!(
            timeout_secs = SERVER_SHUTDOWN_TIMEOUT.as_secs(),
            "HTTP server did not shut down in time"
        ),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
