//! Bundled affixes.
//!
//! Small reference middlewares that exercise the stack contract:
//! - `noop.rs`: forwards everything, advertised
//! - `trace.rs`: logs every operation, never advertised
//! - `stats.rs`: per-connection traffic counters, cloned on copy

pub mod noop;
pub mod stats;
pub mod trace;

pub use noop::NoopAffix;
pub use stats::{StatsAffix, StatsSnapshot};
pub use trace::TraceAffix;
