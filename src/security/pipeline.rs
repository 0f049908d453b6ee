//! The decision pipeline.
//!
//! # State Machine
//! ```text
//! RequestContext
//!     → denylisted?    yes → 403 "blacklisted"
//!     → over rate?     yes → denylist + 429 "rate limit exceeded"
//!     → classified?    yes → denylist + 403 "malicious: <label>"
//!     → forward        → origin status/body (or synthesized 500)
//!     → exactly one audit record, whatever the branch
//! ```

use std::sync::Arc;

use crate::http::forward::{Forwarder, UpstreamResponse};
use crate::http::request::RequestContext;
use crate::observability::metrics;
use crate::security::matcher::{Classification, PatternMatcher};
use crate::security::rate_limit::RateLimiter;
use crate::storage::{self, AuditLog, DenylistStore, Outcome};

/// Final decision for one request.
#[derive(Debug, Clone)]
pub enum Verdict {
    Denylisted,
    RateLimited,
    Malicious(Classification),
    /// Body exceeded the configured limit before inspection.
    PayloadTooLarge,
    Forwarded(UpstreamResponse),
}

impl Verdict {
    pub fn outcome(&self) -> Outcome {
        match self {
            Verdict::Forwarded(_) => Outcome::Allowed,
            _ => Outcome::Blocked,
        }
    }

    /// Machine-readable reason, empty for forwarded requests.
    pub fn reason(&self) -> String {
        match self {
            Verdict::Denylisted => "blacklisted".to_string(),
            Verdict::RateLimited => "rate limit exceeded".to_string(),
            Verdict::Malicious(label) => format!("malicious: {}", label),
            Verdict::PayloadTooLarge => "payload too large".to_string(),
            Verdict::Forwarded(_) => String::new(),
        }
    }

    /// Pipeline stage that produced the verdict.
    pub fn stage(&self) -> &'static str {
        match self {
            Verdict::Denylisted => "denylist",
            Verdict::RateLimited => "rate_limit",
            Verdict::Malicious(_) => "signature",
            Verdict::PayloadTooLarge => "body_limit",
            Verdict::Forwarded(_) => "forward",
        }
    }
}

/// Orchestrates the stores, limiter, matcher and forwarder.
///
/// Store lookups and regex evaluation run on the blocking pool; the async
/// workers only await them.
pub struct Pipeline {
    denylist: DenylistStore,
    limiter: RateLimiter,
    matcher: Arc<PatternMatcher>,
    forwarder: Forwarder,
    audit: AuditLog,
}

impl Pipeline {
    pub fn new(
        denylist: DenylistStore,
        limiter: RateLimiter,
        matcher: PatternMatcher,
        forwarder: Forwarder,
        audit: AuditLog,
    ) -> Self {
        Self {
            denylist,
            limiter,
            matcher: Arc::new(matcher),
            forwarder,
            audit,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Run the full pipeline for one request and record the outcome.
    pub async fn process(&self, ctx: &RequestContext) -> Verdict {
        let verdict = self.decide(ctx).await;
        self.record(ctx, &verdict).await;
        verdict
    }

    /// Refuse a request whose body exceeded the size limit.
    ///
    /// The denylist still answers first, so a denylisted source sees
    /// `blacklisted` whatever it sends.
    pub async fn refuse_oversized(&self, ctx: &RequestContext) -> Verdict {
        let verdict = if self.is_denylisted(ctx).await {
            Verdict::Denylisted
        } else {
            Verdict::PayloadTooLarge
        };
        self.record(ctx, &verdict).await;
        verdict
    }

    async fn decide(&self, ctx: &RequestContext) -> Verdict {
        if self.is_denylisted(ctx).await {
            return Verdict::Denylisted;
        }

        if !self.limiter.allow(ctx.source()) {
            self.escalate(ctx, "rate_limit").await;
            return Verdict::RateLimited;
        }

        if let Some(label) = self.classify(ctx).await {
            self.escalate(ctx, "signature").await;
            return Verdict::Malicious(label);
        }

        Verdict::Forwarded(self.forwarder.forward(ctx).await)
    }

    /// Lookup failures fail open; the rate and signature stages still apply.
    async fn is_denylisted(&self, ctx: &RequestContext) -> bool {
        let denylist = self.denylist.clone();
        let source = ctx.source().to_string();

        match storage::blocking(move || denylist.contains(&source)).await {
            Ok(listed) => listed,
            Err(e) => {
                tracing::error!(
                    request_id = %ctx.request_id(),
                    source = %ctx.source(),
                    error = %e,
                    "Denylist lookup failed"
                );
                false
            }
        }
    }

    async fn classify(&self, ctx: &RequestContext) -> Option<Classification> {
        let matcher = self.matcher.clone();
        let text = ctx.normalized_text();

        match tokio::task::spawn_blocking(move || matcher.classify(&text)).await {
            Ok(label) => label,
            Err(e) => {
                tracing::error!(request_id = %ctx.request_id(), error = %e, "Classification task failed");
                None
            }
        }
    }

    async fn escalate(&self, ctx: &RequestContext, cause: &'static str) {
        let denylist = self.denylist.clone();
        let source = ctx.source().to_string();

        match storage::blocking(move || denylist.add(&source)).await {
            Ok(_) => metrics::record_escalation(cause),
            Err(e) => tracing::error!(
                request_id = %ctx.request_id(),
                source = %ctx.source(),
                cause,
                error = %e,
                "Failed to denylist source"
            ),
        }
    }

    async fn record(&self, ctx: &RequestContext, verdict: &Verdict) {
        let outcome = verdict.outcome();
        let reason = verdict.reason();
        metrics::record_decision(outcome, verdict.stage());

        match verdict {
            Verdict::Forwarded(response) => tracing::debug!(
                request_id = %ctx.request_id(),
                source = %ctx.source(),
                method = %ctx.method(),
                path = %ctx.path(),
                status = response.status.as_u16(),
                "Request forwarded"
            ),
            _ => tracing::warn!(
                request_id = %ctx.request_id(),
                source = %ctx.source(),
                method = %ctx.method(),
                path = %ctx.path(),
                reason = %reason,
                "Request blocked"
            ),
        }

        let audit = self.audit.clone();
        let received_at = ctx.received_at();
        let source = ctx.source().to_string();
        let method = ctx.method().to_string();
        let path = ctx.path().to_string();
        let body = ctx.body_text().into_owned();

        let written = storage::blocking(move || {
            audit.record_at(received_at, &source, &method, &path, &body, outcome, &reason)
        })
        .await;
        if let Err(e) = written {
            metrics::record_audit_failure();
            tracing::error!(request_id = %ctx.request_id(), error = %e, "Failed to write audit record");
        }
    }
}
