//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Assemble affix stack → Bind listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGINT / SIGTERM → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - The stack is fully assembled before any listener is bound, so its
//!   shape never changes while traffic flows
//! - Shutdown has a deadline: connections still open after it are abandoned

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
