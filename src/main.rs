//! Mock API Server - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use mock_api_server::server::AppState;
use mock_api_server::store::InMemoryProjectStore;
use mock_api_server::{build_app, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mock-api-server",
    about = "Project-based mock API server - path patterns, dynamic resources, and latency simulation",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mock-api.yaml")]
    config: PathBuf,

    /// Address to listen on (overrides the configuration file)
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Print default config if requested
    if args.print_config {
        let default_config = include_str!("../config/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    // Load configuration
    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        ServerConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no projects)");
        ServerConfig::default()
    };

    // Validate and exit if requested
    if args.validate {
        config.validate()?;
        println!(
            "Configuration is valid ({} projects defined)",
            config.projects.len()
        );
        return Ok(());
    }

    // Apply CLI overrides
    if let Some(listen) = args.listen {
        config.settings.listen = listen;
    }

    // Build store and router
    let addr = config.settings.listen;
    let store = InMemoryProjectStore::with_projects(config.projects);
    let state = Arc::new(AppState::new(Arc::new(store), config.settings));
    let app = build_app(state);

    // Start serving
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Mock API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
