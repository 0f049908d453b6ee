//! Admin API: denylist and rule management, audit log queries.
//!
//! Served on its own listener; every route requires the configured bearer key.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{delete, get},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::AdminConfig;
use crate::storage::{AuditLog, Database, DenylistStore, RuleStore};
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub denylist: DenylistStore,
    pub rules: RuleStore,
    pub audit: AuditLog,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(db: &Database, api_key: &str) -> Self {
        Self {
            denylist: db.denylist(),
            rules: db.rules(),
            audit: db.audit(),
            api_key: Arc::from(api_key),
        }
    }
}

#[allow(deprecated)]
pub fn setup_admin_router(db: &Database, config: &AdminConfig) -> Router {
    let state = AdminState::new(db, &config.api_key);

    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/denylist", get(list_denylist).post(add_denylist))
        .route("/api/denylist/{ip}", delete(remove_denylist))
        .route("/api/rules", get(list_rules).post(create_rule))
        .route("/api/rules/{id}", delete(delete_rule))
        .route("/api/logs", get(get_logs))
        .route("/api/stats", get(get_stats))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
}
