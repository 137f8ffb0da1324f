//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AffixConfig {
    /// Where to listen.
    pub listener: ListenerConfig,

    /// Which affixes to stack in front of the network.
    pub stack: StackConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,

    /// Shutdown behaviour.
    pub lifecycle: LifecycleConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Stream bind address (e.g., "0.0.0.0:7070").
    pub bind_address: String,

    /// Optional datagram bind address. No datagram listener when unset.
    pub udp_bind_address: Option<String>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Largest single read from a connection, in bytes.
    pub recv_buffer_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7070".to_string(),
            udp_bind_address: None,
            max_connections: 1024,
            recv_buffer_bytes: 4096,
        }
    }
}

/// Affix stack configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StackConfig {
    /// Stack description, top first, e.g. "(TraceAffix,edge)(StatsAffix)".
    /// Empty means traffic goes straight to the network.
    pub affixes: String,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter used when RUST_LOG is unset (trace, debug, info, warn, error,
    /// or a full EnvFilter directive).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long shutdown waits for open connections to finish, in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 10,
        }
    }
}
