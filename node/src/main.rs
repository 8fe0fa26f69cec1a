// Copyright (c) 2026 WineFi. MIT License.
// See LICENSE for details.

//! # WineFi Node
//!
//! Entry point for the `winefi-node` binary. Parses CLI arguments, sets up
//! logging and metrics, opens storage and serves the HTTP/WS API.
//!
//! Subcommands:
//!
//! - `run`            — serve the tokenization API
//! - `keygen`         — print a fresh ledger keypair
//! - `encrypt-secret` — encrypt a seed with the master key
//! - `version`        — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;

use winefi_protocol::crypto::keys::LedgerKeypair;
use winefi_protocol::ledger::{HorizonClient, LedgerClient};
use winefi_protocol::lifecycle::Tokenizer;
use winefi_protocol::storage::TokenizationDb;
use winefi_protocol::vault::SecretVault;

use cli::{Commands, WinefiCli};
use logging::LogFormat;
use metrics::{MeteredLedger, NodeMetrics};

/// Broadcast channel capacity for lifecycle events. Lifecycle steps are
/// seconds apart, so a slow subscriber has plenty of room before lagging.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = WinefiCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Keygen(args) => keygen(args),
        Commands::EncryptSecret(args) => encrypt_secret(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Serves the API and the metrics endpoint until SIGINT/SIGTERM.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "winefi_node=info,winefi_protocol=info,tower_http=info",
        args.log_format,
    );

    let config = Arc::new(args.to_config().context("invalid configuration")?);
    tracing::info!(
        network = %config.network,
        horizon = %config.horizon_url,
        http_port = args.http_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        funding_key = config.funding_secret.is_some(),
        treasury = config.treasury_public_key.is_some(),
        "starting winefi-node"
    );
    if config.treasury_public_key.is_none() {
        tracing::warn!("PLATFORM_TREASURY_PUBLIC_KEY not set; /distribute will fail");
    }

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = TokenizationDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), lots = db.lot_count(), "database opened");

    // --- Custody ---
    let vault = Arc::new(
        SecretVault::new(&args.encryption_key).context("ENCRYPTION_KEY is not usable")?,
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Ledger ---
    let horizon = HorizonClient::from_config(&config).context("failed to build Horizon client")?;
    let ledger: Arc<dyn LedgerClient> =
        Arc::new(MeteredLedger::new(Arc::new(horizon), Arc::clone(&node_metrics)));

    let tokenizer = Tokenizer::new(Arc::clone(&config), ledger, db.clone(), vault);

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        network: config.network,
        tokenizer,
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.http_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    if let Err(e) = db.flush() {
        tracing::error!("failed to flush database: {}", e);
    }
    tracing::info!("winefi-node stopped");
    Ok(())
}

/// Prints a fresh keypair. The secret only goes to stdout when asked for.
fn keygen(args: cli::KeygenArgs) -> Result<()> {
    let keypair = LedgerKeypair::random();
    println!("Public key : {}", keypair.public_key());
    if args.show_secret {
        println!("Secret seed: {}", keypair.secret());
    } else {
        eprintln!("Secret seed not shown. Re-run with --show-secret to print it.");
    }
    Ok(())
}

/// Encrypts a seed the same way prepare stores distribution keys.
fn encrypt_secret(args: cli::EncryptSecretArgs) -> Result<()> {
    let secret = match args.secret {
        Some(s) => s,
        None => {
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("failed to read secret from stdin")?;
            line
        }
    };
    let secret = secret.trim();
    LedgerKeypair::from_secret(secret).map_err(|e| anyhow!("not a valid secret seed: {e}"))?;

    let vault = SecretVault::new(&args.encryption_key).context("ENCRYPTION_KEY is not usable")?;
    let blob = vault.encrypt(secret).context("encryption failed")?;
    println!("{blob}");
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("winefi-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc       {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler can't be
/// installed, that branch never fires and the other one still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
