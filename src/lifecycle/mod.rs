//! Process lifecycle: bring-up, signal handling, coordinated stop.
//!
//! ```text
//! startup.rs   open SQLite → metrics exporter → admin listener → gate listener
//! signals.rs   ctrl-c / SIGTERM → Shutdown::trigger
//! shutdown.rs  broadcast fan-out to the gate, the admin API and counter housekeeping
//! ```
//!
//! The denylist, rules and audit log live in SQLite, so a restart loses only
//! the in-memory rate counters.

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
