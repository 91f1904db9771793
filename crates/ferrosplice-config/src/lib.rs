//! Configuration management system for ferrosplice
//!
//! Configuration is layered: built-in defaults, then an optional YAML, TOML or
//! JSON file, then `FERROSPLICE_*` environment variables (nested keys separated
//! by `__`, e.g. `FERROSPLICE_SPLICE__MAX_CHUNK=32768`). The merged result is
//! validated before it is handed out.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ferrosplice_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("ferrosplice.yaml")
//!     .add_env_prefix("FERROSPLICE")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Chunk ceiling: {}", config.splice.max_chunk.get());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use ferrosplice_types::{ChunkSize, PipeSize, TimeoutConfig};
use serde::{Deserialize, Serialize};

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Main configuration structure for ferrosplice
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Splice engine configuration
    pub splice: SpliceConfig,
    /// Proxy configuration
    pub proxy: ProxyConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Splice engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpliceConfig {
    /// Enable the splice path; when disabled every transfer is declined
    pub enabled: bool,
    /// Largest number of bytes buffered in the relay pipe at once
    pub max_chunk: ChunkSize,
    /// Resize each relay pipe to this capacity
    #[serde(default)]
    pub pipe_size: Option<PipeSize>,
}

impl Default for SpliceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_chunk: ChunkSize::default(),
            pipe_size: None,
        }
    }
}

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address the proxy listens on
    pub listen: String,
    /// Address every accepted client is relayed to
    pub upstream: String,
    /// Maximum concurrently proxied clients
    pub max_connections: usize,
    /// Connection timeouts
    pub timeouts: TimeoutConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7878".to_string(),
            upstream: "127.0.0.1:8080".to_string(),
            max_connections: 1024,
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Enable JSON formatting
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.splice.enabled);
        assert_eq!(config.splice.max_chunk.get(), ChunkSize::DEFAULT);
        assert!(config.splice.pipe_size.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(config.proxy.max_connections > 0);
    }

    #[test]
    fn test_config_yaml_round_trip_keeps_sizes() {
        let mut config = Config::default();
        config.splice.max_chunk = ChunkSize::new(128 * 1024).unwrap();
        config.splice.pipe_size = Some(PipeSize::new(256 * 1024).unwrap());

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("max_chunk: 131072"));

        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.splice.max_chunk.get(), 128 * 1024);
        assert_eq!(parsed.splice.pipe_size.map(PipeSize::get), Some(256 * 1024));
    }

    #[test]
    fn test_invalid_chunk_rejected_on_deserialize() {
        let yaml = "enabled: true\nmax_chunk: 12\n";
        assert!(serde_yaml::from_str::<SpliceConfig>(yaml).is_err());
    }
}
