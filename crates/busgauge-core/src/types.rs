//! Domain types for busgauge snapshots.
//!
//! Every snapshot is an immutable value rebuilt wholesale by a collection
//! cycle. Nothing here is mutated field-by-field after construction.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ── Entity type ────────────────────────────────────────────────────

/// Kind of messaging entity managed by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Queue,
    Topic,
    Subscription,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [EntityType::Queue, EntityType::Topic, EntityType::Subscription];

    /// Lowercase label used in metric tags and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Queue => "queue",
            EntityType::Topic => "topic",
            EntityType::Subscription => "subscription",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(EntityType::Queue),
            "topic" => Ok(EntityType::Topic),
            "subscription" => Ok(EntityType::Subscription),
            other => Err(ConfigError::EntityType(other.to_string())),
        }
    }
}

// ── Queue ──────────────────────────────────────────────────────────

/// Runtime state of one queue as of a collection cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueSnapshot {
    pub namespace: String,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub accessed_at: Option<DateTime<Utc>>,
    pub total_messages: u64,
    pub active_messages: u64,
    pub dead_letter_messages: u64,
    pub scheduled_messages: u64,
    pub transfer_messages: u64,
    pub transfer_dead_letter_messages: u64,
    pub size_bytes: u64,
    pub max_size_bytes: u64,
}

impl QueueSnapshot {
    /// Identity check on (namespace, name).
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.namespace == namespace && self.name == name
    }
}

// ── Topic ──────────────────────────────────────────────────────────

/// Runtime state of one topic as of a collection cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicSnapshot {
    pub namespace: String,
    pub name: String,
    pub size_bytes: u64,
    pub max_size_bytes: u64,
    pub subscription_count: u64,
}

impl TopicSnapshot {
    /// Identity check on (namespace, name).
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.namespace == namespace && self.name == name
    }
}

// ── Subscription ───────────────────────────────────────────────────

/// Runtime state of one topic subscription as of a collection cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionSnapshot {
    pub namespace: String,
    pub topic_name: String,
    pub name: String,
    pub active_messages: u64,
    pub dead_letter_messages: u64,
    pub scheduled_messages: u64,
    pub transfer_messages: u64,
    pub transfer_dead_letter_messages: u64,
}

impl SubscriptionSnapshot {
    /// Display name in `topic/subscription` form.
    pub fn entity_name(&self) -> String {
        format!("{}/{}", self.topic_name, self.name)
    }

    /// Identity check on (namespace, topic, subscription).
    pub fn is(&self, namespace: &str, topic_name: &str, name: &str) -> bool {
        self.namespace == namespace && self.topic_name == topic_name && self.name == name
    }
}

// ── Namespace ──────────────────────────────────────────────────────

/// Namespace-level figures. Quota usage maps quota name to percent used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NamespaceSnapshot {
    pub namespace: String,
    pub active_connections: u64,
    pub quota_usage: BTreeMap<String, f64>,
}

// ── Snapshot ───────────────────────────────────────────────────────

/// Everything one collection cycle produced.
///
/// The four sequences always come from the same cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub queues: Vec<QueueSnapshot>,
    pub topics: Vec<TopicSnapshot>,
    pub subscriptions: Vec<SubscriptionSnapshot>,
    pub namespaces: Vec<NamespaceSnapshot>,
    /// Wall-clock time of the cycle. `UNIX_EPOCH` means never refreshed.
    pub refreshed_at: DateTime<Utc>,
}

impl Snapshot {
    /// The empty snapshot a cache starts with.
    pub fn empty() -> Self {
        Self {
            queues: Vec::new(),
            topics: Vec::new(),
            subscriptions: Vec::new(),
            namespaces: Vec::new(),
            refreshed_at: DateTime::UNIX_EPOCH,
        }
    }

    /// Whether this snapshot came out of a collection cycle.
    pub fn is_refreshed(&self) -> bool {
        self.refreshed_at != DateTime::<Utc>::UNIX_EPOCH
    }

    pub fn queue(&self, namespace: &str, name: &str) -> Option<&QueueSnapshot> {
        self.queues.iter().find(|q| q.is(namespace, name))
    }

    pub fn topic(&self, namespace: &str, name: &str) -> Option<&TopicSnapshot> {
        self.topics.iter().find(|t| t.is(namespace, name))
    }

    pub fn subscription(
        &self,
        namespace: &str,
        topic_name: &str,
        name: &str,
    ) -> Option<&SubscriptionSnapshot> {
        self.subscriptions
            .iter()
            .find(|s| s.is(namespace, topic_name, name))
    }

    pub fn namespace(&self, namespace: &str) -> Option<&NamespaceSnapshot> {
        self.namespaces.iter().find(|n| n.namespace == namespace)
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}
