//! segck-server - segment annotation service
//!
//! Loads a project (`source/` segments plus `annotation/` records), then
//! serves segments to annotators over HTTP with exclusive per-segment locks
//! and pushes stats to every connected browser over SSE.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use segck_common::config::{self, ClipperBackend, CliOverrides, Settings};
use segck_common::events::EventBus;
use segck_common::SegmentStore;
use segck_server::clip::build_clipper;
use segck_server::{build_router, AppState, ClipContext};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Capacity of the stats broadcast channel
const EVENT_BUS_CAPACITY: usize = 100;

/// Command-line arguments for segck-server
#[derive(Parser, Debug)]
#[command(name = "segck-server")]
#[command(about = "Segment annotation server")]
#[command(version)]
struct Args {
    /// Project folder containing `source/` and `annotation/`
    #[arg(short = 'd', long, env = "SEGCK_PROJECT_DIR")]
    project_dir: Option<PathBuf>,

    /// Host to bind
    #[arg(long, env = "SEGCK_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "SEGCK_PORT")]
    port: Option<u16>,

    /// TOML config file (default: <config dir>/segck/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Audio clipping tool
    #[arg(long, value_parser = parse_backend)]
    clipper: Option<ClipperBackend>,

    /// Folder with the browser client, served at /
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,
}

fn parse_backend(s: &str) -> std::result::Result<ClipperBackend, String> {
    s.parse().map_err(|e: segck_common::Error| e.to_string())
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            project_dir: self.project_dir.clone(),
            host: self.host.clone(),
            port: self.port,
            static_dir: self.static_dir.clone(),
            clipper: self.clipper,
            log_level: self.log_level.clone(),
        }
    }
}

fn init_tracing(default_level: &str) {
    let default_directive = format!(
        "segck_server={0},segck_common={0},tower_http=info",
        default_level
    );
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Read before tracing is up: the file may set the log level
    let toml_config = config::resolve_toml_config(args.config.as_deref());
    let log_level = args
        .log_level
        .clone()
        .or_else(|| toml_config.as_ref().ok().map(|c| c.logging.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    init_tracing(&log_level);

    info!(
        "Starting segck-server v{} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let toml_config = toml_config.context("Failed to load config file")?;
    let settings =
        Settings::resolve(args.overrides(), toml_config).context("Invalid configuration")?;
    info!("Project dir: {}", settings.project_dir.display());

    let store = match SegmentStore::open(&settings.project_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to load project: {}", e);
            return Err(e).context("Failed to load project");
        }
    };
    info!("Loaded {} segments", store.segment_count());

    let clipper = build_clipper(&settings.clipper)
        .with_context(|| format!("Failed to initialize {} clipper", settings.clipper.backend))?;
    info!("Audio clipper: {}", clipper.name());

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let clip_context = ClipContext {
        left_ms: settings.clipper.left_context_ms,
        right_ms: settings.clipper.right_context_ms,
    };
    let state = AppState::new(store, event_bus, clipper, clip_context)
        .with_static_dir(settings.static_dir.clone());
    if let Some(dir) = &settings.static_dir {
        info!("Serving static files from {}", dir.display());
    }

    let app = build_router(state);

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
