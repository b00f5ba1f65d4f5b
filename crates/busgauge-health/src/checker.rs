//! Connectivity probe against the administrative API.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use busgauge_admin::AdminClient;
use busgauge_collector::SnapshotCache;

/// Outcome of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Probe result as served on `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub details: Map<String, Value>,
}

impl HealthReport {
    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }
}

pub struct HealthProbe {
    client: Arc<dyn AdminClient>,
    cache: Arc<SnapshotCache>,
    timeout: Duration,
}

impl HealthProbe {
    pub fn new(client: Arc<dyn AdminClient>, cache: Arc<SnapshotCache>, timeout: Duration) -> Self {
        Self {
            client,
            cache,
            timeout,
        }
    }

    /// List queues once. `Down` on error or timeout.
    pub async fn check(&self) -> HealthReport {
        let error = match tokio::time::timeout(self.timeout, self.client.list_queues()).await {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("health probe timed out after {:?}", self.timeout)),
        };

        match error {
            None => {
                let snapshot = self.cache.snapshot();
                debug!(namespace = %self.client.namespace(), "health probe succeeded");
                HealthReport {
                    status: HealthStatus::Up,
                    details: details(json!({
                        "status": "connected",
                        "queueCount": snapshot.queues.len(),
                        "topicCount": snapshot.topics.len(),
                        "subscriptionCount": snapshot.subscriptions.len(),
                    })),
                }
            }
            Some(error) => {
                warn!(namespace = %self.client.namespace(), %error, "health probe failed");
                HealthReport {
                    status: HealthStatus::Down,
                    details: details(json!({
                        "status": "disconnected",
                        "error": error,
                    })),
                }
            }
        }
    }
}

fn details(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
