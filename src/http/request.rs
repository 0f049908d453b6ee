//! Inbound request capture.
//!
//! # Responsibilities
//! - Buffer the request into an immutable `RequestContext`
//! - Decode path and query for inspection
//! - Keep the raw target, headers and body for byte-identical forwarding
//!
//! # Design Decisions
//! - The normalized text is derived, never stored, so it cannot drift from
//!   the fields it is built from
//! - Query decoding is plain percent-decoding; `+` is left as-is

use std::borrow::Cow;
use std::net::IpAddr;

use axum::body::Bytes;
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderMap, Method, Uri};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Everything the pipeline needs to know about one inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Uuid,
    source: String,
    method: Method,
    path: String,
    query: String,
    target: PathAndQuery,
    headers: HeaderMap,
    body: Bytes,
    received_at: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(source: IpAddr, method: Method, uri: &Uri, headers: HeaderMap, body: Bytes) -> Self {
        let target = uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Self {
            request_id: Uuid::new_v4(),
            source: source.to_string(),
            path: percent_decode(uri.path()),
            query: uri.query().map(percent_decode).unwrap_or_default(),
            method,
            target,
            headers,
            body,
            received_at: Utc::now(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Source address as text (the denylist and rate limiter key).
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Percent-decoded path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Percent-decoded query string, empty if absent.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Original path and query, exactly as received.
    pub fn target(&self) -> &PathAndQuery {
        &self.target
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Lowercased `method path query body`, the text signatures are written against.
    pub fn normalized_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.method.as_str(),
            self.path,
            self.query,
            self.body_text()
        )
        .to_lowercase()
    }
}

fn percent_decode(raw: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ctx(method: Method, uri: &str, body: &str) -> RequestContext {
        RequestContext::new(
            "127.0.0.1".parse().unwrap(),
            method,
            &uri.parse().unwrap(),
            HeaderMap::new(),
            Bytes::from(body.to_string()),
        )
    }

    #[test]
    fn test_normalized_text_layout() {
        let ctx = ctx(Method::POST, "/Login?User=Admin", "Password=Hunter2");
        assert_eq!(ctx.normalized_text(), "post /login user=admin password=hunter2");
    }

    #[test]
    fn test_empty_query_and_body_keep_separators() {
        let ctx = ctx(Method::GET, "/", "");
        assert_eq!(ctx.normalized_text(), "get /  ");
    }

    #[test]
    fn test_decoding() {
        let ctx = ctx(Method::GET, "/a%20b/%2e%2e/?q=%3Cscript%3E+x%27", "");
        assert_eq!(ctx.path(), "/a b/../");
        assert_eq!(ctx.query(), "q=<script>+x'");
        assert_eq!(ctx.target().as_str(), "/a%20b/%2e%2e/?q=%3Cscript%3E+x%27");
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let ctx = ctx(Method::GET, "/%FF?q=%C3", "");
        assert_eq!(ctx.path(), "/\u{FFFD}");
        assert_eq!(ctx.query(), "q=\u{FFFD}");
    }

    #[test]
    fn test_preserves_headers_and_source() {
        let mut headers = HeaderMap::new();
        headers.insert("x-custom", HeaderValue::from_static("Keep-Me"));
        let ctx = RequestContext::new(
            "2001:db8::1".parse().unwrap(),
            Method::PUT,
            &"/items/7".parse().unwrap(),
            headers,
            Bytes::from_static(b"\x00\x01"),
        );

        assert_eq!(ctx.source(), "2001:db8::1");
        assert_eq!(ctx.headers().get("x-custom").unwrap(), "Keep-Me");
        assert_eq!(ctx.body().as_ref(), b"\x00\x01");
        assert_eq!(ctx.query(), "");
    }
}
