//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → pipeline.rs (fixed evaluation order)
//!         → storage::denylist (banned sources)
//!         → rate_limit.rs (per-source fixed window)
//!         → matcher.rs (signatures.rs, then custom rules)
//!     → Forward, or reject with a reason
//! ```
//!
//! # Design Decisions
//! - Rate and signature violations escalate to a permanent ban
//! - No trust in client input: matching runs on decoded, lowercased text

pub mod matcher;
pub mod pipeline;
pub mod rate_limit;
pub mod signatures;

pub use matcher::{Classification, PatternMatcher};
pub use pipeline::{Pipeline, Verdict};
pub use rate_limit::RateLimiter;
pub use signatures::{AttackCategory, SignatureCatalog};
