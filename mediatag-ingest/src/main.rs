//! mediatag-ingest - object labelling and tag indexing service
//!
//! Receives object store notifications, labels new images with the
//! detection service, writes the labels back onto the object and indexes
//! them. Primary objects (`.fbx` by default) trigger aggregation of their
//! folder's companion image tags.
//!
//! Two modes:
//! - `serve`: HTTP intake (`POST /events`, `GET /health`)
//! - `invoke <file|->`: process one notification and print the outcome

use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediatag_common::config::{load_or_default, CONFIG_PATH_ENV};
use mediatag_ingest::config::resolve_config;
use mediatag_ingest::services::Clients;
use mediatag_ingest::{AppState, Pipeline};

/// Command-line arguments for mediatag-ingest
#[derive(Parser, Debug)]
#[command(name = "mediatag-ingest")]
#[command(about = "Labels stored images and indexes their tags")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP notification intake
    Serve {
        /// Port to listen on (overrides MEDIATAG_PORT and the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Process one notification from a file, or stdin with "-"
    Invoke {
        event: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config =
        load_or_default(args.config.as_deref()).context("Failed to load configuration file")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mediatag-ingest");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Build: {} ({}, {})", env!("GIT_HASH"), env!("BUILD_PROFILE"), env!("BUILD_TIMESTAMP"));

    let config = resolve_config(&toml_config).context("Invalid configuration")?;
    info!(
        table = %config.index.table_name,
        group_table = %config.index.group_table_name,
        policy = %config.pipeline.tag_value_policy,
        "Configuration resolved"
    );

    // Created once; every invocation shares these handles
    let clients = Clients::connect(&config)
        .await
        .context("Failed to initialize clients")?;
    let pipeline = Pipeline::new(&clients, config.pipeline.clone());

    match args.command {
        Command::Serve { port } => serve(pipeline, port.unwrap_or(config.port)).await,
        Command::Invoke { event } => invoke(pipeline, event).await,
    }
}

async fn serve(pipeline: Pipeline, port: u16) -> Result<()> {
    let app = mediatag_ingest::build_router(AppState::new(pipeline));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Notification intake: http://{}/events", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn invoke(pipeline: Pipeline, event: PathBuf) -> Result<()> {
    let payload = if event.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read event from stdin")?;
        buf
    } else {
        tokio::fs::read(&event)
            .await
            .with_context(|| format!("Failed to read event file {}", event.display()))?
    };

    let outcome = pipeline.handle_event(&payload).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
