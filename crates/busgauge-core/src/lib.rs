//! busgauge-core: shared domain model for the busgauge exporter.
//!
//! Holds the immutable entity snapshots produced by each collection cycle,
//! the TOML configuration model, and the connection-string parser that
//! turns operator credentials into a namespace endpoint.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ConnectionString, ExporterConfig, Settings};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
