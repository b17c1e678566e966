//! RWS gateway: Redis streams over WebSocket — entry point.
//!
//! Reads the endpoint configuration, starts one listener per configured
//! address and bridges every accepted WebSocket connection to the Redis
//! streams its endpoint names.
//!
//! # Usage
//!
//! ```text
//! rws-gateway [OPTIONS]
//!
//! Options:
//!   --config <FILE>        Configuration file, YAML or `.toml` [default: config.yaml]
//!   --init                 Write a template configuration and exit
//!   --local-assets <DIR>   Serve test page assets from DIR, re-read per request
//!   -v, --version          Print version and exit
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable           | Default       | Description                  |
//! |--------------------|---------------|------------------------------|
//! | `RWS_CONFIG`       | `config.yaml` | Configuration file           |
//! | `RWS_LOCAL_ASSETS` | unset         | Test page asset directory    |
//! | `RUST_LOG`         | `info`        | Log filter                   |
//!
//! Exits 0 after Ctrl+C and non-zero when the configuration, TLS material or
//! a listening address is unusable.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::{ArgAction, Parser};
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rws_gateway::application::{BrokerConnector, TestPage};
use rws_gateway::infrastructure::{load_route_tables, run_listener, write_template, RedisConnector};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Redis streams to WebSocket gateway.
#[derive(Debug, Parser)]
#[command(
    name = "rws-gateway",
    about = "Streams Redis stream entries to WebSocket clients",
    version,
    disable_version_flag = true
)]
struct Cli {
    /// Configuration file.  A `.toml` file is read as TOML, anything else as YAML.
    #[arg(long, default_value = "config.yaml", env = "RWS_CONFIG")]
    config: PathBuf,

    /// Write a template configuration to `--config` if it does not exist, then exit.
    #[arg(long)]
    init: bool,

    /// Serve the test page and its assets from this directory instead of the
    /// built-in copies.  Files are re-read on every request.
    #[arg(long, env = "RWS_LOCAL_ASSETS")]
    local_assets: Option<PathBuf>,

    /// Print version and exit.
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,
}

impl Cli {
    fn test_page(&self) -> anyhow::Result<TestPage> {
        match &self.local_assets {
            Some(dir) => Ok(TestPage::local(dir)),
            None => TestPage::embedded().context("built-in test page is invalid"),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.init {
        write_template(&cli.config)?;
        return Ok(());
    }

    let tables = load_route_tables(&cli.config)
        .with_context(|| format!("invalid configuration in {}", cli.config.display()))?;
    info!(
        "RWS gateway {} starting with {} listener(s) from {}",
        env!("CARGO_PKG_VERSION"),
        tables.len(),
        cli.config.display()
    );
    if let Some(dir) = &cli.local_assets {
        info!("serving test page assets from {}", dir.display());
    }

    // Cleared by Ctrl+C; every accept loop polls it.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C — shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let connector: Arc<dyn BrokerConnector> = Arc::new(RedisConnector);
    let mut listeners = JoinSet::new();
    for table in tables {
        let test_page = cli.test_page()?;
        listeners.spawn(run_listener(
            table,
            test_page,
            Arc::clone(&connector),
            Arc::clone(&running),
        ));
    }

    while let Some(joined) = listeners.join_next().await {
        let result = joined.context("listener task panicked")?;
        if let Err(e) = result {
            running.store(false, Ordering::Relaxed);
            return Err(e);
        }
    }

    info!("RWS gateway stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
