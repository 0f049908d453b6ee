use std::net::IpAddr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::storage::{self, AuditStats, LogEntry, Rule, RuleError, StorageError};

const DEFAULT_LOG_LIMIT: usize = 100;
const MAX_LOG_LIMIT: usize = 1000;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Deserialize)]
pub struct DenylistRequest {
    pub ip: Option<String>,
}

#[derive(Deserialize)]
pub struct RuleRequest {
    pub pattern: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
pub struct LogQuery {
    pub limit: Option<usize>,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn storage_failure(e: StorageError) -> Response {
    tracing::error!(error = %e, "Admin storage operation failed");
    error(StatusCode::INTERNAL_SERVER_ERROR, "Storage unavailable")
}

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn list_denylist(State(state): State<AdminState>) -> Result<Json<Vec<String>>, Response> {
    let denylist = state.denylist;
    let listed = storage::blocking(move || denylist.list()).await.map_err(storage_failure)?;
    Ok(Json(listed.into_iter().collect()))
}

pub async fn add_denylist(
    State(state): State<AdminState>,
    Json(request): Json<DenylistRequest>,
) -> Response {
    let Some(ip) = request.ip.and_then(|ip| ip.trim().parse::<IpAddr>().ok()) else {
        return error(StatusCode::BAD_REQUEST, "Invalid IP");
    };
    let ip = ip.to_string();
    let denylist = state.denylist;
    let address = ip.clone();

    match storage::blocking(move || denylist.add(&address)).await {
        Ok(_) => Json(serde_json::json!({ "status": format!("IP {} blacklisted", ip) })).into_response(),
        Err(e) => storage_failure(e),
    }
}

pub async fn remove_denylist(State(state): State<AdminState>, Path(ip): Path<String>) -> Response {
    // Stored addresses are canonical, so match on the canonical form
    let Ok(ip) = ip.trim().parse::<IpAddr>().map(|ip| ip.to_string()) else {
        return error(StatusCode::BAD_REQUEST, "Invalid IP");
    };
    let denylist = state.denylist;
    let address = ip.clone();

    match storage::blocking(move || denylist.remove(&address)).await {
        Ok(true) => Json(serde_json::json!({ "status": format!("IP {} removed from blacklist", ip) }))
            .into_response(),
        Ok(false) => error(StatusCode::NOT_FOUND, "IP not found"),
        Err(e) => storage_failure(e),
    }
}

pub async fn list_rules(State(state): State<AdminState>) -> Result<Json<Vec<Rule>>, Response> {
    let rules = state.rules;
    storage::blocking(move || rules.list())
        .await
        .map(Json)
        .map_err(storage_failure)
}

pub async fn create_rule(State(state): State<AdminState>, Json(request): Json<RuleRequest>) -> Response {
    let pattern = request.pattern.unwrap_or_default();
    let rules = state.rules;
    let (stored_pattern, stored_description) = (pattern.clone(), request.description.clone());

    match storage::blocking(move || rules.add(&stored_pattern, &stored_description)).await {
        Ok(id) => (
            StatusCode::CREATED,
            Json(Rule {
                id,
                pattern,
                description: request.description,
            }),
        )
            .into_response(),
        Err(RuleError::EmptyPattern) => error(StatusCode::BAD_REQUEST, "Pattern is required"),
        Err(RuleError::InvalidPattern(e)) => {
            tracing::debug!(error = %e, "Rejected invalid rule pattern");
            error(StatusCode::BAD_REQUEST, "Invalid regex pattern")
        }
        Err(RuleError::Storage(e)) => storage_failure(e),
    }
}

pub async fn delete_rule(State(state): State<AdminState>, Path(id): Path<i64>) -> Response {
    let rules = state.rules;
    match storage::blocking(move || rules.remove(id)).await {
        Ok(true) => Json(serde_json::json!({ "status": "Rule deleted" })).into_response(),
        Ok(false) => error(StatusCode::NOT_FOUND, "Rule not found"),
        Err(e) => storage_failure(e),
    }
}

pub async fn get_logs(
    State(state): State<AdminState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<LogEntry>>, Response> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);
    let audit = state.audit;
    storage::blocking(move || audit.recent(limit))
        .await
        .map(Json)
        .map_err(storage_failure)
}

pub async fn get_stats(State(state): State<AdminState>) -> Result<Json<AuditStats>, Response> {
    let audit = state.audit;
    storage::blocking(move || audit.stats())
        .await
        .map(Json)
        .map_err(storage_failure)
}
