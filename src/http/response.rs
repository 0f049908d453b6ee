//! Verdict rendering.
//!
//! # Responsibilities
//! - Map each rejection to its status code and JSON error body
//! - Relay forwarded origin responses as-is
//!
//! # Design Decisions
//! - Rejection bodies always carry the machine-readable `reason`
//!   that was written to the audit log

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::http::forward::UpstreamResponse;
use crate::security::pipeline::Verdict;

/// JSON body returned for every rejection.
#[derive(Debug, Serialize)]
pub struct RejectionBody {
    pub error: String,
    pub reason: String,
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl IntoResponse for Verdict {
    fn into_response(self) -> Response {
        let reason = self.reason();
        let (status, error) = match self {
            Verdict::Forwarded(response) => return response.into_response(),
            Verdict::Denylisted => (StatusCode::FORBIDDEN, "Blocked: IP blacklisted".to_string()),
            Verdict::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Blocked: Rate limit exceeded".to_string(),
            ),
            Verdict::Malicious(label) => (
                StatusCode::FORBIDDEN,
                format!("Blocked: Malicious request ({})", label),
            ),
            Verdict::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Blocked: Payload too large".to_string(),
            ),
        };

        (status, Json(RejectionBody { error, reason })).into_response()
    }
}
