//! busgauge.toml configuration parser.
//!
//! The raw [`ExporterConfig`] mirrors the file layout and carries defaults
//! for every key. [`ExporterConfig::validate`] turns it into [`Settings`],
//! the checked form the rest of the exporter is built from.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::EntityType;

/// Environment variable that overrides `auth.connection_string`.
pub const CONNECTION_STRING_ENV: &str = "AZURE_SERVICEBUS_CONNECTION_STRING";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub auth: AuthConfig,
    pub entities: EntitiesConfig,
    pub metrics: MetricsConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Only `connection_string` is supported.
    pub mode: String,
    pub connection_string: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: "connection_string".to_string(),
            connection_string: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitiesConfig {
    /// Regex that must fully match an entity's display name.
    pub filter: String,
    pub types: Vec<String>,
    /// Deployment-environment prefix entity names must start with.
    pub environment: Option<String>,
}

impl Default for EntitiesConfig {
    fn default() -> Self {
        Self {
            filter: ".*".to_string(),
            types: EntityType::ALL.iter().map(|t| t.to_string()).collect(),
            environment: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metric name prefix.
    pub namespace: String,
    pub cache_duration: String,
    pub scrape_interval: String,
    pub include_namespace_metrics: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: "azure_servicebus".to_string(),
            cache_duration: "60s".to_string(),
            scrape_interval: "60s".to_string(),
            include_namespace_metrics: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Per-request timeout for administrative API calls.
    pub request_timeout: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            request_timeout: "30s".to_string(),
        }
    }
}

/// Validated exporter settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// `None` only when validated without credentials (demo mode).
    pub connection: Option<ConnectionString>,
    pub entity_types: BTreeSet<EntityType>,
    pub filter: String,
    pub environment: Option<String>,
    pub metric_prefix: String,
    pub cache_ttl: Duration,
    pub refresh_interval: Duration,
    pub include_namespace_metrics: bool,
    pub port: u16,
    pub request_timeout: Duration,
}

impl Settings {
    /// Environment value used in metric tags; empty when unset.
    pub fn environment_tag(&self) -> &str {
        self.environment.as_deref().unwrap_or("")
    }
}

impl ExporterConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(cs) = lookup(CONNECTION_STRING_ENV).filter(|v| !v.trim().is_empty()) {
            self.auth.connection_string = Some(cs);
        }
        self
    }

    /// Validate everything, including credential material.
    pub fn validate(&self) -> ConfigResult<Settings> {
        self.validate_inner(true)
    }

    /// Validate everything except credentials.
    pub fn validate_offline(&self) -> ConfigResult<Settings> {
        self.validate_inner(false)
    }

    fn validate_inner(&self, require_credentials: bool) -> ConfigResult<Settings> {
        if self.auth.mode != "connection_string" {
            return Err(ConfigError::AuthMode(self.auth.mode.clone()));
        }

        let connection = match self
            .auth
            .connection_string
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            Some(raw) => Some(ConnectionString::parse(raw)?),
            None if require_credentials => return Err(ConfigError::MissingConnectionString),
            None => None,
        };

        let entity_types = self
            .entities
            .types
            .iter()
            .map(|t| t.parse::<EntityType>())
            .collect::<ConfigResult<BTreeSet<_>>>()?;

        // Compile once here so a bad pattern stops startup.
        Regex::new(&format!("^(?:{})$", self.entities.filter))?;

        let environment = self
            .entities
            .environment
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);

        let metric_prefix = self.metrics.namespace.trim().to_string();
        if metric_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                key: "metrics.namespace",
                reason: "metric prefix must not be empty".to_string(),
            });
        }

        Ok(Settings {
            connection,
            entity_types,
            filter: self.entities.filter.clone(),
            environment,
            metric_prefix,
            cache_ttl: positive_duration("metrics.cache_duration", &self.metrics.cache_duration)?,
            refresh_interval: positive_duration(
                "metrics.scrape_interval",
                &self.metrics.scrape_interval,
            )?,
            include_namespace_metrics: self.metrics.include_namespace_metrics,
            port: self.server.port,
            request_timeout: positive_duration(
                "server.request_timeout",
                &self.server.request_timeout,
            )?,
        })
    }
}

fn positive_duration(key: &'static str, value: &str) -> ConfigResult<Duration> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(ConfigError::Duration {
            key,
            value: value.to_string(),
        }),
    }
}

/// Parse a duration string like "500ms", "30s", "5m", "1h" or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

// ── Connection string ──────────────────────────────────────────────

/// Parsed Service Bus connection string.
///
/// Format: `Endpoint=sb://<namespace>.servicebus.windows.net/;SharedAccessKeyName=<name>;SharedAccessKey=<key>`
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    /// Namespace name (first label of the endpoint host).
    pub namespace: String,
    /// Endpoint host, e.g. `myns.servicebus.windows.net`.
    pub host: String,
    pub key_name: String,
    pub key: String,
    /// Local emulator: plain HTTP instead of TLS.
    pub use_emulator: bool,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> ConfigResult<Self> {
        let mut endpoint = None;
        let mut key_name = None;
        let mut key = None;
        let mut use_emulator = false;

        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((k, v)) = part.split_once('=') else {
                return Err(ConfigError::ConnectionString(
                    "every segment must be key=value".to_string(),
                ));
            };
            match k.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(v.trim().to_string()),
                "sharedaccesskeyname" => key_name = Some(v.trim().to_string()),
                "sharedaccesskey" => key = Some(v.trim().to_string()),
                "usedevelopmentemulator" => use_emulator = v.trim().eq_ignore_ascii_case("true"),
                // EntityPath and friends do not apply to a namespace-wide exporter.
                _ => {}
            }
        }

        let endpoint = endpoint.ok_or_else(|| {
            ConfigError::ConnectionString(
                "missing Endpoint; expected Endpoint=sb://namespace.servicebus.windows.net/;..."
                    .to_string(),
            )
        })?;
        let host = endpoint
            .strip_prefix("sb://")
            .ok_or_else(|| {
                ConfigError::ConnectionString(format!("endpoint must use sb:// scheme: {endpoint}"))
            })?
            .trim_end_matches('/')
            .to_string();
        let namespace = host.split('.').next().unwrap_or_default().to_string();
        if namespace.is_empty() {
            return Err(ConfigError::ConnectionString(
                "could not extract namespace from endpoint".to_string(),
            ));
        }

        Ok(Self {
            namespace,
            host,
            key_name: key_name.ok_or_else(|| {
                ConfigError::ConnectionString("missing SharedAccessKeyName".to_string())
            })?,
            key: key.ok_or_else(|| {
                ConfigError::ConnectionString("missing SharedAccessKey".to_string())
            })?,
            use_emulator,
        })
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("namespace", &self.namespace)
            .field("host", &self.host)
            .field("key_name", &self.key_name)
            .field("key", &"<redacted>")
            .field("use_emulator", &self.use_emulator)
            .finish()
    }
}
