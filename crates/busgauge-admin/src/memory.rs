//! In-memory administrative API.
//!
//! Holds queues, topics and subscriptions in ordered maps, records every
//! call it receives, and can be told to fail individual detail lookups or
//! whole listings. Used by tests across the workspace and by the daemon's
//! demo mode.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use busgauge_core::EntityType;

use crate::client::AdminClient;
use crate::error::{AdminError, AdminResult};
use crate::types::{QueueDetail, SubscriptionDetail, TopicDetail};

/// A call observed by [`InMemoryAdminClient`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AdminCall {
    ListQueues,
    QueueDetail(String),
    ListTopics,
    TopicDetail(String),
    ListSubscriptions(String),
    SubscriptionDetail(String, String),
}

impl AdminCall {
    /// Entity type this call concerns.
    pub fn entity_type(&self) -> EntityType {
        match self {
            AdminCall::ListQueues | AdminCall::QueueDetail(_) => EntityType::Queue,
            AdminCall::ListTopics | AdminCall::TopicDetail(_) => EntityType::Topic,
            AdminCall::ListSubscriptions(_) | AdminCall::SubscriptionDetail(..) => {
                EntityType::Subscription
            }
        }
    }
}

#[derive(Default)]
struct MemoryTopic {
    detail: TopicDetail,
    subscriptions: BTreeMap<String, SubscriptionDetail>,
}

#[derive(Default)]
struct MemoryState {
    queues: BTreeMap<String, QueueDetail>,
    topics: BTreeMap<String, MemoryTopic>,
    /// Detail lookups that fail: (type, display name).
    failing_details: HashSet<(EntityType, String)>,
    failing_listings: HashSet<EntityType>,
    calls: Vec<AdminCall>,
}

pub struct InMemoryAdminClient {
    namespace: String,
    state: Mutex<MemoryState>,
}

impl InMemoryAdminClient {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn with_queue(self, queue: QueueDetail) -> Self {
        self.put_queue(queue);
        self
    }

    pub fn with_topic(self, topic: TopicDetail) -> Self {
        self.put_topic(topic);
        self
    }

    /// Add a subscription; its topic is created if missing.
    pub fn with_subscription(self, subscription: SubscriptionDetail) -> Self {
        self.put_subscription(subscription);
        self
    }

    pub fn put_queue(&self, queue: QueueDetail) {
        self.state.lock().queues.insert(queue.name.clone(), queue);
    }

    pub fn remove_queue(&self, name: &str) {
        self.state.lock().queues.remove(name);
    }

    pub fn put_topic(&self, topic: TopicDetail) {
        let name = topic.name.clone();
        self.state.lock().topics.entry(name).or_default().detail = topic;
    }

    pub fn put_subscription(&self, subscription: SubscriptionDetail) {
        let mut state = self.state.lock();
        let topic = state
            .topics
            .entry(subscription.topic_name.clone())
            .or_insert_with(|| MemoryTopic {
                detail: TopicDetail::named(&subscription.topic_name),
                subscriptions: BTreeMap::new(),
            });
        topic
            .subscriptions
            .insert(subscription.name.clone(), subscription);
    }

    /// Make the detail lookup of one entity fail. Subscriptions are named
    /// `topic/subscription`.
    pub fn fail_detail(&self, entity_type: EntityType, name: &str) {
        self.state
            .lock()
            .failing_details
            .insert((entity_type, name.to_string()));
    }

    /// Make every listing of `entity_type` fail.
    pub fn fail_listing(&self, entity_type: EntityType) {
        self.state.lock().failing_listings.insert(entity_type);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing_details.clear();
        state.failing_listings.clear();
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<AdminCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Number of `list_queues` calls, one per collection pass that walks queues.
    pub fn queue_listings(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| **c == AdminCall::ListQueues)
            .count()
    }

    pub fn reset_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn record(&self, call: AdminCall) -> parking_lot::MutexGuard<'_, MemoryState> {
        let mut state = self.state.lock();
        state.calls.push(call);
        state
    }
}

fn listing_failed(entity_type: EntityType) -> AdminError {
    AdminError::Unavailable(format!("listing {entity_type}s failed"))
}

fn detail_failed(entity_type: EntityType, name: &str) -> AdminError {
    AdminError::Unavailable(format!("{entity_type} {name} unavailable"))
}

#[async_trait]
impl AdminClient for InMemoryAdminClient {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn list_queues(&self) -> AdminResult<Vec<String>> {
        let state = self.record(AdminCall::ListQueues);
        if state.failing_listings.contains(&EntityType::Queue) {
            return Err(listing_failed(EntityType::Queue));
        }
        Ok(state.queues.keys().cloned().collect())
    }

    async fn queue_detail(&self, name: &str) -> AdminResult<QueueDetail> {
        let state = self.record(AdminCall::QueueDetail(name.to_string()));
        if state
            .failing_details
            .contains(&(EntityType::Queue, name.to_string()))
        {
            return Err(detail_failed(EntityType::Queue, name));
        }
        state
            .queues
            .get(name)
            .cloned()
            .ok_or_else(|| AdminError::NotFound(name.to_string()))
    }

    async fn list_topics(&self) -> AdminResult<Vec<String>> {
        let state = self.record(AdminCall::ListTopics);
        if state.failing_listings.contains(&EntityType::Topic) {
            return Err(listing_failed(EntityType::Topic));
        }
        Ok(state.topics.keys().cloned().collect())
    }

    async fn topic_detail(&self, name: &str) -> AdminResult<TopicDetail> {
        let state = self.record(AdminCall::TopicDetail(name.to_string()));
        if state
            .failing_details
            .contains(&(EntityType::Topic, name.to_string()))
        {
            return Err(detail_failed(EntityType::Topic, name));
        }
        state
            .topics
            .get(name)
            .map(|t| TopicDetail {
                subscription_count: t.subscriptions.len() as u64,
                ..t.detail.clone()
            })
            .ok_or_else(|| AdminError::NotFound(name.to_string()))
    }

    async fn list_subscriptions(&self, topic: &str) -> AdminResult<Vec<String>> {
        let state = self.record(AdminCall::ListSubscriptions(topic.to_string()));
        if state.failing_listings.contains(&EntityType::Subscription) {
            return Err(listing_failed(EntityType::Subscription));
        }
        state
            .topics
            .get(topic)
            .map(|t| t.subscriptions.keys().cloned().collect())
            .ok_or_else(|| AdminError::NotFound(topic.to_string()))
    }

    async fn subscription_detail(
        &self,
        topic: &str,
        subscription: &str,
    ) -> AdminResult<SubscriptionDetail> {
        let state = self.record(AdminCall::SubscriptionDetail(
            topic.to_string(),
            subscription.to_string(),
        ));
        let display = format!("{topic}/{subscription}");
        if state
            .failing_details
            .contains(&(EntityType::Subscription, display.clone()))
        {
            return Err(detail_failed(EntityType::Subscription, &display));
        }
        state
            .topics
            .get(topic)
            .and_then(|t| t.subscriptions.get(subscription))
            .cloned()
            .ok_or(AdminError::NotFound(display))
    }
}
