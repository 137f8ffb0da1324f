//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every subsystem emits tracing events with structured fields
//!     (connection_id, peer_addr, stack, affix)
//!     → logging.rs (subscriber: EnvFilter + fmt layer)
//!     → stdout
//! ```
//!
//! # Design Decisions
//! - RUST_LOG wins over the configured level
//! - Affixes log at debug/trace so a quiet default costs nothing per packet

pub mod logging;
