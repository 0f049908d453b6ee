//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all gate handler
//! - Wire up middleware (tracing)
//! - Buffer inbound requests into a `RequestContext`
//! - Hand every request to the decision pipeline
//! - Run rate-counter housekeeping alongside the listener

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::{uri::InvalidUri, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use http_body_util::LengthLimitError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::GateConfig;
use crate::http::forward::Forwarder;
use crate::http::request::RequestContext;
use crate::security::matcher::PatternMatcher;
use crate::security::pipeline::Pipeline;
use crate::security::rate_limit::RateLimiter;
use crate::security::signatures::SignatureCatalog;
use crate::storage::Database;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub max_body_size: usize,
}

/// HTTP server for the security gate.
pub struct HttpServer {
    router: Router,
    pipeline: Arc<Pipeline>,
    config: GateConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and database.
    pub fn new(config: GateConfig, db: &Database) -> Result<Self, InvalidUri> {
        let forwarder = Forwarder::new(&config.upstream)?;
        let matcher = PatternMatcher::new(SignatureCatalog::new(), db.rules());
        let pipeline = Arc::new(Pipeline::new(
            db.denylist(),
            RateLimiter::from_config(&config.rate_limit),
            matcher,
            forwarder,
            db.audit(),
        ));

        let state = AppState {
            pipeline: pipeline.clone(),
            max_body_size: config.security.max_body_size,
        };

        let router = Self::build_router(state);
        Ok(Self {
            router,
            pipeline,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", any(gate_handler))
            .route("/{*path}", any(gate_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for embedding or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            "HTTP server starting"
        );

        let limiter = self.pipeline.limiter().clone();
        let mut housekeeping_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.window());
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let purged = limiter.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, tracked = limiter.tracked(), "Expired rate counters evicted");
                        }
                    }
                    _ = housekeeping_shutdown.recv() => break,
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }
}

/// Catch-all handler: buffer the request and run the pipeline.
async fn gate_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();

    match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => {
            let ctx = RequestContext::new(addr.ip(), parts.method, &parts.uri, parts.headers, bytes);
            state.pipeline.process(&ctx).await.into_response()
        }
        Err(e) => {
            let too_large = e.into_inner().downcast_ref::<LengthLimitError>().is_some();
            if too_large {
                let ctx = RequestContext::new(
                    addr.ip(),
                    parts.method,
                    &parts.uri,
                    parts.headers,
                    Bytes::new(),
                );
                state.pipeline.refuse_oversized(&ctx).await.into_response()
            } else {
                tracing::warn!(peer = %addr, "Failed to read request body");
                (StatusCode::BAD_REQUEST, "Failed to read request body").into_response()
            }
        }
    }
}
