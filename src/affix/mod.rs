//! Affix stack subsystem.
//!
//! # Data Flow
//! ```text
//! caller
//!     → AffixStack / head AffixNode
//!     → node's Affix (intercept or forward to `below`)
//!     → next AffixNode ... → NetworkApi sentinel (real I/O)
//!     ← raw handle, wrapped by each node on the way back up
//!
//! Later operation on a wrapped handle:
//!     AffixSocket → owner's Affix → inner handle → ... → raw handle
//!
//! Accept / receive-message:
//!     listener's owner node → copy() of the whole suffix
//!     → accept through the copy → socket bound to the copy
//! ```
//!
//! # Design Decisions
//! - One node owns the link to its successor; only that node relinks it
//! - A popped node is fully detached, it neither reaches nor is reached
//! - Every affix supplies its own `copy`; each accepted connection or
//!   received message gets a private chain, so per-connection state needs
//!   no locking
//! - I/O errors travel up unchanged through every layer

pub mod error;
pub mod middleware;
pub mod node;
pub mod registry;
pub mod socket;
pub mod stack;

pub use error::{AffixError, AffixResult};
pub use middleware::{Affix, AsAny};
pub use node::{AffixNode, Link};
pub use registry::{parse_stack, AffixBuilder, AffixRegistry, AffixSpec};
pub use socket::{AffixMessage, AffixSocket, AffixTcpServer, AffixUdpServer};
pub use stack::AffixStack;
