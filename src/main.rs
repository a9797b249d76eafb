//! Harvester Binary Entry Point
//!
//! Runs the collection service with its HTTP API.
//! Core functionality is provided by the `harvester` library crate.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use harvester::{
    collector::{CollectionSupervisor, CursorTracker, HttpSource},
    config::{AppConfig, parse_duration},
    server::{AppState, create_router},
    storage::{StorageBuilder, StorageHandles},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Harvester - per-group upstream collector
#[derive(Parser, Debug)]
#[command(name = "harvester", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (built-in defaults when omitted)
    #[arg(short, long, env = "HARVESTER_CONFIG")]
    config: Option<String>,

    /// Server bind address (overrides config file)
    #[arg(long, env = "HARVESTER_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "HARVESTER_SERVER_PORT")]
    server_port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(long, env = "HARVESTER_DB_URL")]
    db_url: Option<String>,

    /// Upstream URL (overrides config file)
    #[arg(long, env = "HARVESTER_SOURCE_URL")]
    source_url: Option<String>,

    /// Collection interval, e.g. `1s`, `500ms` (overrides config file)
    #[arg(long, env = "HARVESTER_INTERVAL", value_parser = parse_duration)]
    interval: Option<Duration>,
}

impl Cli {
    /// Load the config file (or defaults) and apply overrides (CLI > ENV > config file).
    fn resolve_config(&self) -> Result<AppConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path);
                AppConfig::load(path)?
            }
            None => {
                tracing::info!("No configuration file given, using defaults");
                AppConfig::default()
            }
        };

        if let Some(bind) = &self.server_bind {
            config.server.bind = bind.clone();
        }
        if let Some(port) = self.server_port {
            config.server.port = port;
        }
        if let Some(url) = &self.db_url {
            config.database.url = url.clone();
        }
        if let Some(url) = &self.source_url {
            config.source.url = url.clone();
        }
        if let Some(interval) = self.interval {
            config.source.interval = interval;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,harvester=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Harvester - per-group upstream collector");

    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    tracing::info!(
        "Server: {}:{}, Database: {}",
        config.server.bind,
        config.server.port,
        config.database.url,
    );
    tracing::info!(
        "Upstream: {} (interval {}, timeout {})",
        config.source.url,
        humantime::format_duration(config.source.interval),
        humantime::format_duration(config.source.timeout),
    );

    // Build storage layer
    let handles = StorageBuilder::new(&config.database.url)
        .pool_size(config.database.pool_size)
        .channel_capacity(config.database.channel_capacity)
        .build()
        .await?;

    tracing::info!("Storage initialized");

    let source = Arc::new(HttpSource::new(&config.source)?);
    let supervisor = Arc::new(CollectionSupervisor::new(
        source,
        handles.writer.clone(),
        config.source.interval,
    ));
    let cursor = Arc::new(CursorTracker::new(handles.reader.clone()));

    let app = create_router(AppState {
        supervisor: Arc::clone(&supervisor),
        cursor,
        reader: handles.reader.clone(),
    });

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Web server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown(supervisor, handles).await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}

/// Stop every collecting group, then the storage actor.
async fn shutdown(supervisor: Arc<CollectionSupervisor>, handles: StorageHandles) {
    tracing::info!("Stopping collection tasks...");
    supervisor.shutdown().await;

    tracing::info!("Shutting down storage...");
    if let Err(e) = handles.shutdown().await {
        tracing::error!("Failed to shutdown storage: {}", e);
    }
}
