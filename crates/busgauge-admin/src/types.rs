//! Runtime detail records returned by the administrative API.

use chrono::{DateTime, Utc};

/// Runtime properties of one queue.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueueDetail {
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

impl QueueDetail {
    /// A queue with zeroed counters.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// Runtime properties of one topic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TopicDetail {
    pub name: String,
    pub size_bytes: u64,
    pub max_size_bytes: u64,
    pub subscription_count: u64,
}

impl TopicDetail {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// Runtime properties of one subscription.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubscriptionDetail {
    pub topic_name: String,
    pub name: String,
    pub active_messages: u64,
    pub dead_letter_messages: u64,
    pub scheduled_messages: u64,
    pub transfer_messages: u64,
    pub transfer_dead_letter_messages: u64,
}

impl SubscriptionDetail {
    pub fn named(topic_name: &str, name: &str) -> Self {
        Self {
            topic_name: topic_name.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }
}
