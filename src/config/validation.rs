//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that addresses parse and limits are non-zero
//! - Check that the stack description parses and names known affixes
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::affix::AffixRegistry;
use crate::config::schema::AffixConfig;

/// A single semantic problem with a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate `config` against the affixes `registry` can build.
pub fn validate_config(
    config: &AffixConfig,
    registry: &AffixRegistry,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if let Some(udp) = &config.listener.udp_bind_address {
        if udp.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "listener.udp_bind_address",
                format!("'{udp}' is not a socket address"),
            ));
        }
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be > 0"));
    }
    if config.listener.recv_buffer_bytes == 0 {
        errors.push(ValidationError::new("listener.recv_buffer_bytes", "must be > 0"));
    }
    if let Err(e) = registry.check(&config.stack.affixes) {
        errors.push(ValidationError::new("stack.affixes", e.to_string()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
