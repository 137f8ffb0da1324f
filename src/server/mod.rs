//! Echo service over an affix stack.
//!
//! # Data Flow
//! ```text
//! Listener::accept (stack copy per connection)
//!     → connection task: recv → send back, through the copy
//! Datagram listener (optional)
//!     → recv through a stack copy → reply through the same copy
//! Shutdown
//!     → stop accepting → close listeners → drain with deadline
//! ```

pub mod echo;

pub use echo::{EchoServer, ServerError};
