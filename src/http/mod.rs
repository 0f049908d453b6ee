//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, catch-all handler)
//!     → request.rs (buffer into RequestContext, decode for inspection)
//!     → [security::pipeline decides]
//!     → forward.rs (replay to origin, when admitted)
//!     → response.rs (render verdict)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use forward::{ForwardError, Forwarder, UpstreamResponse};
pub use request::RequestContext;
pub use server::HttpServer;
