//! Faucet service binary

use anyhow::Context;
use clap::Parser;
use drip_common::utils::logging::init_logging;
use drip_faucet::rpc::{ChainDaemon, DaemonRpcClient, WalletRpcClient, WalletService};
use drip_faucet::{api, FaucetConfig, FaucetService, Ledger};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

/// Faucet service CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind host
    #[arg(long)]
    host: Option<String>,

    /// Bind port
    #[arg(long)]
    port: Option<u16>,

    /// Ledger database location
    #[arg(long)]
    db_location: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Load configuration
    let mut config = FaucetConfig::load(args.config.as_deref())?;

    // Override with CLI arguments
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(db_location) = args.db_location {
        config.db_location = db_location;
    }
    if args.debug {
        config.logging.level = "debug".to_string();
    }
    config.validate()?;

    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))?;

    info!("Starting faucet v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Bind host: {}:{}", config.host, config.port);
    info!("  Daemon: {}", config.daemon_endpoint);
    info!("  Wallet: {}", config.wallet_endpoint);
    info!("  Drip amount: {} atomic units", config.drip_amount_atomic);
    info!("  Drip cooldown: {}ms", config.drip_cooldown_ms);
    info!("  Send interval: {}ms", config.send_interval_ms);
    info!("  IP limit: {} requests / {}ms", config.ip_max_requests, config.ip_cooldown_ms);

    // Initialize ledger
    let ledger = Ledger::open(&config.db_location)?;
    let stats = ledger.statistics()?;
    info!("Previous statistics:");
    info!("  Total drips: {}", stats.drips);
    info!("  Unique accounts: {}", stats.unique_accounts);

    // Probe backends before accepting requests
    let daemon = DaemonRpcClient::new(&config.daemon_endpoint)?;
    let daemon_info = daemon
        .get_info()
        .await
        .with_context(|| format!("daemon unreachable at {}", config.daemon_endpoint))?;
    info!("Successful daemon fetch ({} v{}, topoheight {})", daemon_info.network, daemon_info.version, daemon_info.topoheight);

    let wallet = WalletRpcClient::new(&config.wallet_endpoint, &config.wallet_username, &config.wallet_password)?;
    let wallet_address = wallet
        .get_address()
        .await
        .with_context(|| format!("wallet unreachable at {}", config.wallet_endpoint))?;
    info!("Successful wallet fetch: {}", wallet_address);

    let service = Arc::new(FaucetService::new(config.clone(), ledger, Arc::new(wallet), Arc::new(daemon))?);
    info!("Faucet service initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Batch dispatcher
    let dispatcher = Arc::new(service.dispatcher()).spawn(config.send_interval(), shutdown_rx);

    // Start server
    let listener = api::bind_listener(&config)
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        api::router(service.clone()).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutting down gracefully");
    let _ = shutdown_tx.send(true);
    if let Err(e) = dispatcher.await {
        warn!("Dispatcher task ended abnormally: {:?}", e);
    }
    service.ledger().flush().await?;

    Ok(())
}

/// Graceful shutdown signal
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
            Ok(mut stream) => {
                stream.recv().await;
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
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
