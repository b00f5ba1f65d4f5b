//! Collection pipeline: one pass over the administrative API.
//!
//! Walks namespace → queues and namespace → topics → subscriptions,
//! applying the [`EntityFilter`] before any detail call so rejected
//! entities cost nothing beyond the listing.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use busgauge_admin::{AdminClient, QueueDetail, SubscriptionDetail, TopicDetail};
use busgauge_core::{
    EntityType, NamespaceSnapshot, QueueSnapshot, Snapshot, SubscriptionSnapshot, TopicSnapshot,
};

use crate::filter::EntityFilter;

/// Builds complete snapshots from an [`AdminClient`].
pub struct CollectionPipeline {
    client: Arc<dyn AdminClient>,
    filter: EntityFilter,
    include_namespace_metrics: bool,
}

impl CollectionPipeline {
    pub fn new(
        client: Arc<dyn AdminClient>,
        filter: EntityFilter,
        include_namespace_metrics: bool,
    ) -> Self {
        if filter.type_enabled(EntityType::Subscription) && !filter.type_enabled(EntityType::Topic) {
            warn!("subscription collection requires the topic type; no subscriptions will be collected");
        }
        Self {
            client,
            filter,
            include_namespace_metrics,
        }
    }

    pub fn client(&self) -> &Arc<dyn AdminClient> {
        &self.client
    }

    pub fn namespace(&self) -> &str {
        self.client.namespace()
    }

    /// Run one collection pass.
    ///
    /// Per-entity and per-type failures are logged and absorbed: a type
    /// whose listing fails contributes no entities to this pass.
    pub async fn collect(&self) -> Snapshot {
        let namespace = self.namespace().to_string();
        info!(%namespace, "starting collection pass");

        let queues = if self.filter.type_enabled(EntityType::Queue) {
            match self.client.list_queues().await {
                Ok(names) => self.collect_queues(&namespace, names).await,
                Err(e) => {
                    error!(%namespace, error = %e, "failed to list queues");
                    Vec::new()
                }
            }
        } else {
            debug!("queue collection disabled");
            Vec::new()
        };

        let (topics, subscriptions) = if self.filter.type_enabled(EntityType::Topic) {
            match self.client.list_topics().await {
                Ok(names) => self.collect_topics(&namespace, names).await,
                Err(e) => {
                    error!(%namespace, error = %e, "failed to list topics");
                    (Vec::new(), Vec::new())
                }
            }
        } else {
            debug!("topic collection disabled");
            (Vec::new(), Vec::new())
        };

        let namespaces = if self.include_namespace_metrics {
            // The management API offers no connection or quota figures.
            vec![NamespaceSnapshot {
                namespace: namespace.clone(),
                ..Default::default()
            }]
        } else {
            Vec::new()
        };

        info!(
            %namespace,
            queues = queues.len(),
            topics = topics.len(),
            subscriptions = subscriptions.len(),
            "collection pass completed"
        );

        Snapshot {
            queues,
            topics,
            subscriptions,
            namespaces,
            refreshed_at: Utc::now(),
        }
    }

    async fn collect_queues(&self, namespace: &str, names: Vec<String>) -> Vec<QueueSnapshot> {
        let mut queues = Vec::new();
        for name in names {
            if !self.filter.admits(EntityType::Queue, &name) {
                debug!(queue = %name, "queue filtered out");
                continue;
            }
            match self.client.queue_detail(&name).await {
                Ok(detail) => {
                    debug!(queue = %name, "collected queue");
                    queues.push(queue_snapshot(namespace, detail));
                }
                Err(e) => warn!(queue = %name, error = %e, "failed to get queue detail"),
            }
        }
        queues
    }

    async fn collect_topics(
        &self,
        namespace: &str,
        names: Vec<String>,
    ) -> (Vec<TopicSnapshot>, Vec<SubscriptionSnapshot>) {
        let mut topics = Vec::new();
        let mut subscriptions = Vec::new();
        for name in names {
            // An excluded topic takes its subscriptions with it.
            if !self.filter.admits(EntityType::Topic, &name) {
                debug!(topic = %name, "topic filtered out");
                continue;
            }
            let detail = match self.client.topic_detail(&name).await {
                Ok(detail) => detail,
                Err(e) => {
                    warn!(topic = %name, error = %e, "failed to get topic detail");
                    continue;
                }
            };
            debug!(topic = %name, "collected topic");
            topics.push(topic_snapshot(namespace, detail));

            if self.filter.type_enabled(EntityType::Subscription) {
                subscriptions.extend(self.collect_subscriptions(namespace, &name).await);
            }
        }
        (topics, subscriptions)
    }

    async fn collect_subscriptions(
        &self,
        namespace: &str,
        topic: &str,
    ) -> Vec<SubscriptionSnapshot> {
        let names = match self.client.list_subscriptions(topic).await {
            Ok(names) => names,
            Err(e) => {
                error!(%topic, error = %e, "failed to list subscriptions");
                return Vec::new();
            }
        };

        let mut subscriptions = Vec::new();
        for name in names {
            if !self.filter.admits_subscription(topic, &name) {
                debug!(%topic, subscription = %name, "subscription filtered out");
                continue;
            }
            match self.client.subscription_detail(topic, &name).await {
                Ok(detail) => {
                    debug!(%topic, subscription = %name, "collected subscription");
                    subscriptions.push(subscription_snapshot(namespace, topic, detail));
                }
                Err(e) => {
                    warn!(%topic, subscription = %name, error = %e, "failed to get subscription detail")
                }
            }
        }
        subscriptions
    }
}

fn queue_snapshot(namespace: &str, d: QueueDetail) -> QueueSnapshot {
    QueueSnapshot {
        namespace: namespace.to_string(),
        name: d.name,
        created_at: d.created_at,
        updated_at: d.updated_at,
        accessed_at: d.accessed_at,
        total_messages: d.total_messages,
        active_messages: d.active_messages,
        dead_letter_messages: d.dead_letter_messages,
        scheduled_messages: d.scheduled_messages,
        transfer_messages: d.transfer_messages,
        transfer_dead_letter_messages: d.transfer_dead_letter_messages,
        size_bytes: d.size_bytes,
        max_size_bytes: d.max_size_bytes,
    }
}

fn topic_snapshot(namespace: &str, d: TopicDetail) -> TopicSnapshot {
    TopicSnapshot {
        namespace: namespace.to_string(),
        name: d.name,
        size_bytes: d.size_bytes,
        max_size_bytes: d.max_size_bytes,
        subscription_count: d.subscription_count,
    }
}

fn subscription_snapshot(namespace: &str, topic: &str, d: SubscriptionDetail) -> SubscriptionSnapshot {
    SubscriptionSnapshot {
        namespace: namespace.to_string(),
        topic_name: topic.to_string(),
        name: d.name,
        active_messages: d.active_messages,
        dead_letter_messages: d.dead_letter_messages,
        scheduled_messages: d.scheduled_messages,
        transfer_messages: d.transfer_messages,
        transfer_dead_letter_messages: d.transfer_dead_letter_messages,
    }
}
