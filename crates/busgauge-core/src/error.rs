//! Configuration error types.

use thiserror::Error;

/// Result type alias for configuration loading and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating exporter configuration.
///
/// Every variant is fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unsupported auth mode: {0}")]
    AuthMode(String),

    #[error("Azure Service Bus connection string is required")]
    MissingConnectionString,

    #[error("invalid connection string: {0}")]
    ConnectionString(String),

    #[error("unknown entity type: {0}")]
    EntityType(String),

    #[error("invalid entity filter pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid duration for {key}: {value}")]
    Duration { key: &'static str, value: String },

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
