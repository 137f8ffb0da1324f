//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Assemble the affix stack over the real network
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners are bound by the caller, after the stack is complete

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::affix::{AffixError, AffixRegistry, AffixStack};
use crate::config::loader::{load_config, ConfigError};
use crate::config::AffixConfig;
use crate::net::NetworkApi;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Stack assembly failed: {0}")]
    Stack(#[from] AffixError),
}

/// Where the running configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Defaults => f.write_str("built-in defaults"),
        }
    }
}

/// Read the config at `path`, or fall back to defaults when there is none.
///
/// Runs before logging is set up, so the source is returned for the caller
/// to report instead of being logged here.
pub fn load_or_default(
    path: Option<&Path>,
    registry: &AffixRegistry,
) -> Result<(AffixConfig, ConfigSource), StartupError> {
    match path {
        Some(path) => {
            let config = load_config(path, registry)?;
            Ok((config, ConfigSource::File(path.to_path_buf())))
        }
        None => Ok((AffixConfig::default(), ConfigSource::Defaults)),
    }
}

/// Assemble the configured stack over `network`.
pub fn assemble_stack(
    config: &AffixConfig,
    registry: &AffixRegistry,
    network: Arc<dyn NetworkApi>,
) -> Result<AffixStack, StartupError> {
    let stack = registry.build(&config.stack.affixes, network)?;
    tracing::info!(
        stack = %stack,
        depth = stack.depth(),
        advertisement = %stack.advertisement(),
        "Affix stack ready"
    );
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::NullNetwork;

    #[test]
    fn defaults_without_path() {
        let registry = AffixRegistry::with_builtin();
        let (config, source) = load_or_default(None, &registry).unwrap();
        assert_eq!(config.listener.max_connections, 1024);
        assert_eq!(source, ConfigSource::Defaults);
    }

    #[test]
    fn file_source_is_reported() {
        let path = std::env::temp_dir().join(format!("affix-startup-{}.toml", std::process::id()));
        std::fs::write(&path, "[listener]\nmax_connections = 8\n").unwrap();

        let registry = AffixRegistry::with_builtin();
        let result = load_or_default(Some(path.as_path()), &registry);
        std::fs::remove_file(&path).unwrap();

        let (config, source) = result.unwrap();
        assert_eq!(config.listener.max_connections, 8);
        assert_eq!(source.to_string(), path.display().to_string());
        assert_eq!(source, ConfigSource::File(path));
    }

    #[test]
    fn assembles_configured_stack() {
        let registry = AffixRegistry::with_builtin();
        let mut config = AffixConfig::default();
        config.stack.affixes = "(TraceAffix)(NoopAffix)".into();

        let stack = assemble_stack(&config, &registry, Arc::new(NullNetwork)).unwrap();
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.advertisement(), "(NoopAffix)");
    }
}
