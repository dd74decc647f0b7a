//! Offtrack Player - main entry point
//!
//! Opens the local media database and serves the media route, the control
//! API, and the event stream.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use offtrack_common::config::TomlConfig;
use offtrack_common::db::init_database;
use offtrack_player::api::{self, AppContext};
use offtrack_player::config::{Config, ConfigOverrides};
use offtrack_player::state::SharedState;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for offtrack-player
#[derive(Parser, Debug)]
#[command(name = "offtrack-player")]
#[command(about = "Offline music player: local media store and range-serving playback core")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "OFFTRACK_PORT")]
    port: Option<u16>,

    /// Root folder holding the database
    #[arg(short, long, env = "OFFTRACK_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Bootstrap TOML file (default: <config dir>/offtrack/config.toml)
    #[arg(short, long, env = "OFFTRACK_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration file")?;
    let config = Config::resolve(
        ConfigOverrides {
            root_folder: args.root_folder,
            port: args.port,
        },
        toml,
    );

    // Initialize tracing
    let level = config.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("offtrack_player={level},offtrack_common={level},tower_http=debug").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Offtrack Player {} ({} {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP")
    );
    info!("Root folder: {}", config.root_folder.display());

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to open database")?;

    let state = Arc::new(SharedState::new());
    let ctx = AppContext::new(pool.clone(), &config, state)
        .await
        .context("Failed to initialize playback session")?;

    info!("Media route: {}/audio/<id>", config.media_scope);

    api::run(ctx, config.port, shutdown_signal())
        .await
        .context("Server error")?;

    pool.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
