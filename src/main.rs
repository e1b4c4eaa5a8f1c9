//! Counterflow Bot - counter-trades retail buy pressure on a tracked token
//!
//! # WARNING
//! - This bot trades with real money. Only use funds you can afford to lose.
//! - Profitability is not guaranteed; every swap pays fees and slippage.
//! - Runs live in process memory only; a restart forgets in-flight sequences.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use counterflow::balance::RpcBalanceInspector;
use counterflow::config::Config;
use counterflow::sequencer::{run_worker, LiquidationSequencer};
use counterflow::stream::{FeedListener, FeedListenerConfig};
use counterflow::trading::{JupiterClient, SwapPipeline};
use counterflow::wallet::load_liquidation_wallets;

/// Counterflow Bot - automated counter-trading across a rotating wallet pool
#[derive(Parser)]
#[command(name = "counterflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the listener and liquidation worker
    Start {
        /// Detect and log qualifying buys without trading
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current configuration (secrets masked)
    Config,

    /// Check RPC connectivity
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("counterflow=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    // Missing or invalid configuration is fatal at startup, nowhere else
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Start { dry_run } => start(&config, dry_run).await,
        Commands::Config => {
            println!("{}", config.masked_display());
            Ok(())
        }
        Commands::Health => health(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Wire up the detection-and-reaction pipeline and run until interrupted
async fn start(config: &Config, dry_run: bool) -> Result<()> {
    if dry_run {
        warn!("Dry-run mode: qualifying buys will be logged, not traded");
    }

    let wallets = load_liquidation_wallets(&config.wallets.liquidation_keys)?;

    let rpc = Arc::new(RpcClient::new_with_commitment(
        config.rpc.endpoint.clone(),
        CommitmentConfig::confirmed(),
    ));

    let jupiter = JupiterClient::new(config.jupiter.clone());
    let pipeline = Arc::new(SwapPipeline::new(
        jupiter,
        rpc.clone(),
        config.trading.clone(),
        &config.rpc,
    ));
    let inspector = Arc::new(RpcBalanceInspector::new(rpc, config.token_mint()));

    let sequencer = Arc::new(LiquidationSequencer::new(
        wallets,
        pipeline,
        inspector,
        config.sequencer.clone(),
        config.trading.token_mint.clone(),
        dry_run,
    ));

    // Capacity 1: runs execute strictly one at a time; events arriving while
    // a run is queued are dropped by the listener
    let (event_tx, event_rx) = mpsc::channel(1);

    let excluded: HashSet<String> = config.wallets.excluded_signers.iter().cloned().collect();
    let listener = FeedListener::new(
        FeedListenerConfig {
            ws_endpoint: config.feed.ws_endpoint.clone(),
            reconnect_delay_ms: config.feed.reconnect_delay_ms,
        },
        config.token_mint(),
        excluded,
        config.trading.min_buy_threshold_lamports,
        event_tx,
    );
    listener.start();

    info!(mint = %config.trading.token_mint, "Counterflow running");

    tokio::select! {
        _ = run_worker(sequencer, event_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            listener.stop();
        }
    }

    Ok(())
}

/// Probe the RPC endpoint
async fn health(config: &Config) -> Result<()> {
    let rpc = RpcClient::new(config.rpc.endpoint.clone());
    let version = rpc.get_version().await?;
    info!("RPC OK, node version {}", version.solana_core);
    Ok(())
}
