//! Error types for change-buffer configuration.

use thiserror::Error;

/// Errors raised while loading a [`BufferConfig`](crate::BufferConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration text is not valid TOML for a buffer config.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Convenience type alias for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
