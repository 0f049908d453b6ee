//! Upstream forwarding.
//!
//! # Responsibilities
//! - Replay an admitted request against the origin unchanged
//! - Enforce connect and total deadlines
//! - Relay the origin's status, headers and body
//! - Turn every connection-level failure into a synthesized 500
//!
//! # Design Decisions
//! - No retries: one attempt per request
//! - Bodies are buffered, so framing headers are not relayed

use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::uri::{Authority, Scheme};
use axum::http::{header, HeaderMap, Request, StatusCode, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::config::UpstreamConfig;
use crate::http::request::RequestContext;
use crate::observability::metrics;

/// Why a forwarding attempt produced no origin response.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid upstream target: {0}")]
    InvalidTarget(#[from] axum::http::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("upstream timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("failed to read upstream body: {0}")]
    Body(#[from] axum::Error),
}

/// The origin's answer, or a synthesized failure.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// The fixed response for an unreachable or failing origin.
    pub fn server_error(error: &ForwardError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: HeaderMap::new(),
            body: Bytes::from(format!("Server error: {}", error)),
        }
    }
}

/// Proxies admitted requests to the single configured origin.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    authority: Authority,
    timeout: Duration,
    max_response_bytes: usize,
}

impl Forwarder {
    pub fn new(config: &UpstreamConfig) -> Result<Self, axum::http::uri::InvalidUri> {
        let authority: Authority = config.address.parse()?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_millis(config.connect_timeout_ms)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            authority,
            timeout: Duration::from_millis(config.timeout_ms),
            max_response_bytes: config.max_response_bytes,
        })
    }

    /// Forward `ctx` and return the origin's response. Never fails.
    pub async fn forward(&self, ctx: &RequestContext) -> UpstreamResponse {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.try_forward(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(ForwardError::Timeout(self.timeout)),
        };

        match result {
            Ok(response) => {
                metrics::record_upstream(response.status.as_u16(), start);
                response
            }
            Err(e) => {
                tracing::error!(
                    request_id = %ctx.request_id(),
                    upstream = %self.authority,
                    error = %e,
                    "Upstream error"
                );
                metrics::record_upstream_failure(&e);
                UpstreamResponse::server_error(&e)
            }
        }
    }

    async fn try_forward(&self, ctx: &RequestContext) -> Result<UpstreamResponse, ForwardError> {
        let uri = Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(ctx.target().clone())
            .build()?;

        let mut request = Request::builder()
            .method(ctx.method().clone())
            .uri(uri)
            .body(Body::from(ctx.body().clone()))?;
        *request.headers_mut() = ctx.headers().clone();

        let response: hyper::Response<hyper::body::Incoming> = self.client.request(request).await?;
        let (mut parts, body) = response.into_parts();
        let body = axum::body::to_bytes(Body::new(body), self.max_response_bytes).await?;

        // Re-framed by our own server after buffering
        parts.headers.remove(header::TRANSFER_ENCODING);
        parts.headers.remove(header::CONNECTION);

        Ok(UpstreamResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn ctx() -> RequestContext {
        RequestContext::new(
            "127.0.0.1".parse().unwrap(),
            Method::GET,
            &"/".parse().unwrap(),
            HeaderMap::new(),
            Bytes::new(),
        )
    }

    #[tokio::test]
    async fn test_unreachable_origin_synthesizes_500() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let forwarder = Forwarder::new(&UpstreamConfig {
            address: addr.to_string(),
            ..Default::default()
        })
        .unwrap();

        let response = forwarder.forward(&ctx()).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(String::from_utf8_lossy(&response.body).starts_with("Server error: "));
    }

    #[tokio::test]
    async fn test_silent_origin_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold connections without ever answering
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let forwarder = Forwarder::new(&UpstreamConfig {
            address: addr.to_string(),
            timeout_ms: 200,
            ..Default::default()
        })
        .unwrap();

        let start = Instant::now();
        let response = forwarder.forward(&ctx()).await;
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            String::from_utf8_lossy(&response.body),
            "Server error: upstream timed out after 200ms"
        );
    }

    #[test]
    fn test_rejects_bad_authority() {
        assert!(Forwarder::new(&UpstreamConfig {
            address: "bad host:80".into(),
            ..Default::default()
        })
        .is_err());
    }
}
