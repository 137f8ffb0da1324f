//! Structured logging setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter: RUST_LOG if set, otherwise `default_level` for this
/// crate.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if default_level.contains('=') || default_level.contains(',') {
            default_level.into()
        } else {
            format!("affix_stack={default_level},affix_echo={default_level},affix_cli={default_level}").into()
        }
    })
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(default_level: &str) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
