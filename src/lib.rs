//! Inline HTTP security gate library

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod storage;

pub use config::GateConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
