//! Inline HTTP security gate.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────────────┐
//!                        │                     WAF PROXY                      │
//!                        │                                                    │
//!   Client Request       │  ┌─────────┐   ┌──────────┐   ┌──────┐   ┌─────┐  │
//!   ─────────────────────┼─▶│denylist │──▶│rate limit│──▶│match │──▶│fwd  │──┼──▶ Origin
//!                        │  └────┬────┘   └────┬─────┘   └──┬───┘   └──┬──┘  │
//!                        │       │ 403         │ 429 + ban  │ 403+ban  │     │
//!   Client Response      │       ▼             ▼            ▼          ▼     │
//!   ◀────────────────────┼──────────────── audit log (one record) ──────────┤
//!                        │                                                    │
//!                        │  ┌───────────────────────────────────────────────┐ │
//!                        │  │ storage (SQLite) · admin API · observability │ │
//!                        │  └───────────────────────────────────────────────┘ │
//!                        └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use waf_proxy::config::{load_config, validate_config, GateConfig};
use waf_proxy::lifecycle::{signals, startup, Shutdown};
use waf_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "waf-proxy")]
#[command(version)]
#[command(about = "Inline HTTP security gate", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Proxy listen address (overrides listener.bind_address)
    #[arg(long)]
    listen: Option<String>,

    /// Origin host:port (overrides upstream.address)
    #[arg(long)]
    upstream: Option<String>,

    /// Requests admitted per source per window
    #[arg(long)]
    rate_limit: Option<u64>,

    /// Rate window length in seconds
    #[arg(long)]
    window_secs: Option<u64>,

    /// SQLite database path
    #[arg(long)]
    database: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut GateConfig) {
        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let Some(upstream) = &self.upstream {
            config.upstream.address = upstream.clone();
        }
        if let Some(max_requests) = self.rate_limit {
            config.rate_limit.max_requests = max_requests;
        }
        if let Some(window_secs) = self.window_secs {
            config.rate_limit.window_secs = window_secs;
        }
        if let Some(database) = &self.database {
            config.storage.database_path = database.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GateConfig::default(),
    };
    cli.apply(&mut config);
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("invalid configuration: {}", error);
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    logging::init_logging(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "waf-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        rate_limit = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        database = %config.storage.database_path,
        "Configuration loaded"
    );

    let shutdown = Arc::new(Shutdown::new());
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        trigger.trigger();
    });

    startup::run(config, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
