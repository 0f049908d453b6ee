//! Startup orchestration.
//!
//! # Order
//! ```text
//! storage → metrics → admin listener → proxy listener
//! ```
//!
//! Any startup error is fatal; the proxy listener binds last so traffic only
//! arrives once every collaborator is ready.

use std::io;

use axum::http::uri::InvalidUri;
use metrics_exporter_prometheus::BuildError;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::admin::setup_admin_router;
use crate::config::GateConfig;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::storage::{Database, StorageError};

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open database: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid upstream address: {0}")]
    Upstream(#[from] InvalidUri),

    #[error("invalid address '{0}'")]
    Address(String),

    #[error("failed to bind {address}: {source}")]
    Bind { address: String, source: io::Error },

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}

/// Bring up every subsystem and serve until `shutdown` fires.
pub async fn run(config: GateConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    let db = Database::open(&config.storage.database_path)?;

    if config.observability.metrics_enabled {
        let addr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::Address(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    if config.admin.enabled {
        let listener = bind(&config.admin.bind_address).await?;
        let router = setup_admin_router(&db, &config.admin);
        let mut admin_shutdown = shutdown.subscribe();
        tracing::info!(address = %config.admin.bind_address, "Admin API listening");

        tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        });
    }

    let server = HttpServer::new(config, &db)?;
    let listener = bind(&server.config().listener.bind_address).await?;
    server
        .run(listener, shutdown.subscribe())
        .await
        .map_err(StartupError::Serve)
}
