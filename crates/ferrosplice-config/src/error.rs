//! Error types for configuration loading

use std::path::PathBuf;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration file could not be read
    #[error("Cannot read config file {}: {source}", path.display())]
    Read {
        /// Path to the configuration file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A configuration file could not be written
    #[error("Cannot write config file {}: {source}", path.display())]
    Write {
        /// Path to the configuration file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The merged layers do not form a valid configuration
    #[error("Cannot parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    /// A value parsed but violates a constraint
    #[error("Invalid {field}: {message}")]
    Invalid {
        /// Dotted path of the offending setting
        field: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// The configuration could not be rendered in a file format
    #[error("Cannot encode configuration as {format}: {message}")]
    Encode {
        /// Target format
        format: &'static str,
        /// Encoder message
        message: String,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    /// Reject the setting at `field`
    pub fn invalid<S: Into<String>>(field: &'static str, message: S) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }

    /// Wrap an encoder failure for `format`
    pub fn encode(format: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Encode {
            format,
            message: error.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::encode("YAML", error)
    }
}

impl From<ConfigError> for ferrosplice_types::Error {
    fn from(error: ConfigError) -> Self {
        Self::config(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrosplice_types::ErrorKind;

    #[test]
    fn test_invalid_names_the_field() {
        let error = ConfigError::invalid("splice.max_chunk", "larger than pipe_size");
        assert_eq!(
            error.to_string(),
            "Invalid splice.max_chunk: larger than pipe_size"
        );
    }

    #[test]
    fn test_read_error_shows_path() {
        let error = ConfigError::Read {
            path: PathBuf::from("/etc/ferrosplice/config.yaml"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(error.to_string().contains("/etc/ferrosplice/config.yaml"));
    }

    #[test]
    fn test_converts_to_config_kind() {
        let error: ferrosplice_types::Error = ConfigError::invalid("proxy.listen", "empty").into();
        assert_eq!(error.kind(), ErrorKind::Config);
        assert!(error.to_string().contains("proxy.listen"));
    }
}
