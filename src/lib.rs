//! Affix stacks: composable network middleware in front of a primitive
//! network API.

pub mod affix;
pub mod affixes;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod server;

pub use affix::{Affix, AffixError, AffixNode, AffixRegistry, AffixResult, AffixStack, Link};
pub use config::AffixConfig;
pub use lifecycle::Shutdown;
pub use net::{NetworkApi, TokioNetwork};
pub use server::EchoServer;
