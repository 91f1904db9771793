//! Configuration builder for layered configuration loading

use crate::{Config, ConfigError, ConfigResult};
use config::{Environment, File, FileFormat};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Nested keys in environment variables are joined with this separator
const ENV_SEPARATOR: &str = "__";

/// One configuration layer; later layers override earlier ones
#[derive(Debug, Clone)]
enum Layer {
    Defaults,
    File(PathBuf),
    Env(String),
}

/// Layered configuration builder
///
/// Layers are applied in the order they were added. A file layer whose path
/// does not exist is skipped, so optional locations can be listed freely.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    layers: Vec<Layer>,
}

impl ConfigBuilder {
    /// Create a builder with no layers
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the built-in defaults as a layer
    pub fn add_defaults(mut self) -> Self {
        self.layers.push(Layer::Defaults);
        self
    }

    /// Add a configuration file; the format follows the extension
    pub fn add_source_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.layers.push(Layer::File(path.as_ref().to_path_buf()));
        self
    }

    /// Add `PREFIX_*` environment variables as a layer
    pub fn add_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.layers.push(Layer::Env(prefix.into()));
        self
    }

    /// Merge the layers and validate the result
    pub fn build(self) -> ConfigResult<Config> {
        // Defaults always sit underneath so partial files still deserialize
        let defaults = serde_yaml::to_value(Config::default())?;
        let mut merged = config::Config::builder().add_source(config::Config::try_from(&defaults)?);

        for layer in self.layers {
            merged = match layer {
                Layer::Defaults => merged,
                Layer::File(path) if !path.exists() => merged,
                Layer::File(path) => {
                    let format = file_format(&path);
                    merged.add_source(File::from(path).format(format))
                }
                Layer::Env(prefix) => merged.add_source(
                    Environment::with_prefix(&prefix)
                        .separator(ENV_SEPARATOR)
                        .try_parsing(true),
                ),
            };
        }

        let config: Config = merged.build()?.try_deserialize()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate cross-field constraints the value types cannot express
    pub fn validate(config: &Config) -> ConfigResult<()> {
        let splice = &config.splice;
        if let Some(pipe_size) = splice.pipe_size {
            if splice.max_chunk.get() > pipe_size.get() {
                return Err(ConfigError::invalid(
                    "splice.max_chunk",
                    format!(
                        "{} exceeds the requested pipe size {}",
                        splice.max_chunk.get(),
                        pipe_size.get()
                    ),
                ));
            }
        }

        let proxy = &config.proxy;
        if proxy.max_connections == 0 {
            return Err(ConfigError::invalid(
                "proxy.max_connections",
                "must be greater than 0",
            ));
        }
        if proxy.listen.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid(
                "proxy.listen",
                format!("'{}' is not a socket address", proxy.listen),
            ));
        }
        if proxy.upstream.trim().is_empty() {
            return Err(ConfigError::invalid("proxy.upstream", "must be set"));
        }

        if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::invalid(
                "logging.level",
                format!("expected one of {}", LOG_LEVELS.join(", ")),
            ));
        }

        Ok(())
    }
}

fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => FileFormat::Toml,
        Some("json") => FileFormat::Json,
        _ => FileFormat::Yaml,
    }
}
