//! gs-server - GreenScout scouting data server
//!
//! Accepts match and pit submissions over HTTP, files them into stage
//! directories, and runs the ingestion loop that writes them to the team
//! spreadsheet.

use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gs_common::config::{resolve_config_path, ServerConfig};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gs_server::db::{self, Role, UserStore};
use gs_server::ingest::{IngestConfig, Ingestor};
use gs_server::roster::TeamRoster;
use gs_server::sheet::{fill_match_numbers, GoogleSheetsSink};
use gs_server::store::FileStore;
use gs_server::{build_router, AppState};

/// Command-line arguments for gs-server
#[derive(Parser, Debug)]
#[command(name = "gs-server")]
#[command(about = "GreenScout scouting data server")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "GS_CONFIG")]
    config: Option<PathBuf>,

    /// Root of the stage directories, overrides json_root
    #[arg(long, env = "GS_ROOT")]
    root: Option<PathBuf>,

    /// Event key, overrides event_key
    #[arg(long, env = "GS_EVENT_KEY")]
    event_key: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and ingestion loop (default)
    Serve,

    /// Issue a certificate and print it
    IssueCertificate {
        #[arg(long)]
        username: String,

        /// scouter, admin or super
        #[arg(long, default_value = "scouter")]
        role: String,
    },

    /// Write match numbers into column A of the RawData sheet
    FillMatches {
        #[arg(long)]
        from: u32,

        #[arg(long)]
        to: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let mut config = ServerConfig::load(config_path.as_deref()).context("Failed to load config")?;
    if let Some(root) = args.root {
        config.json_root = root;
    }
    if let Some(event_key) = args.event_key {
        config.event_key = event_key;
    }

    init_tracing(&config.logging.level);

    info!("Starting gs-server v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => warn!("Config: none found, using built-in defaults"),
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::IssueCertificate { username, role } => {
            let role: Role = role.parse()?;
            let pool = db::init_database_pool(&config.database_path).await?;
            let certificate = UserStore::new(pool).issue_certificate(&username, role).await?;
            println!("{}", certificate);
            Ok(())
        }
        Command::FillMatches { from, to } => {
            let sink = sheets_sink(&config)?;
            fill_match_numbers(&sink, from, to).await?;
            Ok(())
        }
    }
}

fn init_tracing(level: &str) {
    let default_filter = format!("gs_server={level},gs_common={level},tower_http={level}");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn sheets_sink(config: &ServerConfig) -> Result<GoogleSheetsSink> {
    if config.sheets_token.is_none() {
        warn!("sheets_token is not set; spreadsheet writes will fail");
    }
    GoogleSheetsSink::new(
        config.sheets_api_base.clone(),
        config.spreadsheet_id.clone(),
        config.sheets_token.clone(),
    )
    .context("Failed to build spreadsheet client")
}

async fn serve(config: ServerConfig) -> Result<()> {
    config.validate()?;
    info!("Event: {}", config.event_key);
    info!("Multi-scouting: {}", config.multi_scouting);

    let store = FileStore::new(&config.json_root);
    store
        .ensure_layout()
        .with_context(|| format!("Failed to create stage directories under {}", config.json_root.display()))?;
    info!("Stage root: {}", store.root().display());

    info!("Database: {}", config.database_path.display());
    let pool = db::init_database_pool(&config.database_path).await?;
    let users = UserStore::new(pool);

    let roster = match TeamRoster::load(&config.team_list_path(), config.event_key.clone()) {
        Ok(roster) => roster,
        Err(e) => {
            warn!("{}; pit visits will be filed to Errored", e);
            TeamRoster::new(config.event_key.clone(), Vec::new())
        }
    };

    let ingestor = Arc::new(
        Ingestor::new(
            store.clone(),
            Arc::new(sheets_sink(&config)?),
            Arc::new(roster),
            IngestConfig::from(&config),
        )
        .with_ledger(Arc::new(users.clone())),
    );

    let state = AppState::new(store, users, config.event_key.clone());
    let mut app = build_router(state);
    if config.logging.http {
        app = app.layer(TraceLayer::new_for_http());
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;
    info!("Listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    tokio::select! {
        result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .into_future() => {
            result.context("Server error")?;
        }
        result = ingestor.run() => {
            if let Err(e) = result {
                error!("Ingestion stopped: {}", e);
                return Err(e).context("Ingestion loop failed, investigate before restarting");
            }
        }
    }

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
