//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks, stack description included)
//!     → AffixConfig (validated, immutable)
//!     → AffixRegistry::build(config.stack.affixes) at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a stack is assembled once and never reshaped
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::AffixConfig;
pub use schema::LifecycleConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::StackConfig;
