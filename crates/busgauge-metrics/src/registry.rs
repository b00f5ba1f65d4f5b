//! Metric registry: one gauge per (entity, metric), registered once.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use busgauge_collector::{RefreshOutcome, SnapshotCache};
use busgauge_core::{
    EntityType, NamespaceSnapshot, QueueSnapshot, Snapshot, SubscriptionSnapshot, TopicSnapshot,
};

use crate::sink::{GaugeFn, MetricSink};

/// Identity of one registered gauge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetricKey {
    Queue {
        namespace: String,
        name: String,
        metric: &'static str,
    },
    Topic {
        namespace: String,
        name: String,
        metric: &'static str,
    },
    Subscription {
        namespace: String,
        topic: String,
        name: String,
        metric: &'static str,
    },
    Namespace {
        namespace: String,
        metric: &'static str,
    },
    Quota {
        namespace: String,
        quota: String,
    },
}

struct GaugeDef<T> {
    suffix: &'static str,
    help: &'static str,
    read: fn(&T) -> f64,
}

const QUEUE_GAUGES: &[GaugeDef<QueueSnapshot>] = &[
    GaugeDef {
        suffix: "active_messages",
        help: "Number of active messages in the queue",
        read: |q| q.active_messages as f64,
    },
    GaugeDef {
        suffix: "dead_letter_messages",
        help: "Number of dead letter messages in the queue",
        read: |q| q.dead_letter_messages as f64,
    },
    GaugeDef {
        suffix: "scheduled_messages",
        help: "Number of scheduled messages in the queue",
        read: |q| q.scheduled_messages as f64,
    },
    GaugeDef {
        suffix: "transfer_messages",
        help: "Number of messages pending transfer from the queue",
        read: |q| q.transfer_messages as f64,
    },
    GaugeDef {
        suffix: "transfer_dead_letter_messages",
        help: "Number of messages that failed transfer from the queue",
        read: |q| q.transfer_dead_letter_messages as f64,
    },
    GaugeDef {
        suffix: "size_bytes",
        help: "Size of the queue in bytes",
        read: |q| q.size_bytes as f64,
    },
    GaugeDef {
        suffix: "max_size_bytes",
        help: "Maximum size of the queue in bytes",
        read: |q| q.max_size_bytes as f64,
    },
    GaugeDef {
        suffix: "total_messages",
        help: "Total number of messages in the queue",
        read: |q| q.total_messages as f64,
    },
];

const TOPIC_GAUGES: &[GaugeDef<TopicSnapshot>] = &[
    GaugeDef {
        suffix: "size_bytes",
        help: "Size of the topic in bytes",
        read: |t| t.size_bytes as f64,
    },
    GaugeDef {
        suffix: "max_size_bytes",
        help: "Maximum size of the topic in bytes",
        read: |t| t.max_size_bytes as f64,
    },
    GaugeDef {
        suffix: "subscription_count",
        help: "Number of subscriptions for the topic",
        read: |t| t.subscription_count as f64,
    },
];

const SUBSCRIPTION_GAUGES: &[GaugeDef<SubscriptionSnapshot>] = &[
    GaugeDef {
        suffix: "active_messages",
        help: "Number of active messages in the subscription",
        read: |s| s.active_messages as f64,
    },
    GaugeDef {
        suffix: "dead_letter_messages",
        help: "Number of dead letter messages in the subscription",
        read: |s| s.dead_letter_messages as f64,
    },
    GaugeDef {
        suffix: "scheduled_messages",
        help: "Number of scheduled messages in the subscription",
        read: |s| s.scheduled_messages as f64,
    },
    GaugeDef {
        suffix: "transfer_messages",
        help: "Number of messages pending transfer from the subscription",
        read: |s| s.transfer_messages as f64,
    },
    GaugeDef {
        suffix: "transfer_dead_letter_messages",
        help: "Number of messages that failed transfer from the subscription",
        read: |s| s.transfer_dead_letter_messages as f64,
    },
];

const ACTIVE_CONNECTIONS: &str = "active_connections";
const QUOTA_USAGE: &str = "quota_usage_percentage";

/// Binds cache entries to gauges in a [`MetricSink`].
///
/// The set of registered keys only grows: an entity that disappears keeps
/// its gauges, which then report 0.
pub struct MetricRegistry {
    cache: Arc<SnapshotCache>,
    sink: Arc<dyn MetricSink>,
    prefix: String,
    environment: String,
    registered: Mutex<HashSet<MetricKey>>,
}

impl MetricRegistry {
    pub fn new(
        cache: Arc<SnapshotCache>,
        sink: Arc<dyn MetricSink>,
        prefix: &str,
        environment: &str,
    ) -> Self {
        Self {
            cache,
            sink,
            prefix: prefix.to_string(),
            environment: environment.to_string(),
            registered: Mutex::new(HashSet::new()),
        }
    }

    /// Number of gauges registered so far.
    pub fn registered(&self) -> usize {
        self.registered.lock().len()
    }

    pub fn is_registered(&self, key: &MetricKey) -> bool {
        self.registered.lock().contains(key)
    }

    /// Register a gauge for every metric of every cached entity not yet
    /// registered. Returns how many were new.
    pub fn register_all(&self) -> usize {
        let snapshot = self.cache.snapshot();
        let mut registered = self.registered.lock();
        let before = registered.len();

        for q in &snapshot.queues {
            self.register_queue(&mut registered, q);
        }
        for t in &snapshot.topics {
            self.register_topic(&mut registered, t);
        }
        for s in &snapshot.subscriptions {
            self.register_subscription(&mut registered, s);
        }
        for n in &snapshot.namespaces {
            self.register_namespace(&mut registered, n);
        }

        let added = registered.len() - before;
        if added > 0 {
            info!(added, total = registered.len(), "registered gauges");
        }
        added
    }

    /// Refresh the cache if stale, then register anything new.
    pub async fn refresh(&self) -> (RefreshOutcome, usize) {
        let outcome = self.cache.ensure_fresh().await;
        (outcome, self.register_all())
    }

    /// Run the refresh loop until shutdown signal.
    pub async fn run(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "metric refresh loop started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let (outcome, added) = self.refresh().await;
                    debug!(?outcome, added, "scheduled refresh finished");
                }
                _ = shutdown.changed() => {
                    info!("metric refresh loop shutting down");
                    break;
                }
            }
        }
    }

    fn name(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    fn entity_tags(&self, entity_type: EntityType, name: &str, namespace: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("entity_type".to_string(), entity_type.to_string()),
            ("entity_name".to_string(), name.to_string()),
            ("namespace".to_string(), namespace.to_string()),
            ("environment".to_string(), self.environment.clone()),
        ])
    }

    fn register(
        &self,
        registered: &mut HashSet<MetricKey>,
        key: MetricKey,
        suffix: &str,
        tags: BTreeMap<String, String>,
        help: &str,
        accessor: GaugeFn,
    ) {
        if registered.contains(&key) {
            return;
        }
        self.sink.register_gauge(&self.name(suffix), tags, help, accessor);
        registered.insert(key);
    }

    fn register_queue(&self, registered: &mut HashSet<MetricKey>, q: &QueueSnapshot) {
        let tags = self.entity_tags(EntityType::Queue, &q.name, &q.namespace);
        for def in QUEUE_GAUGES {
            let key = MetricKey::Queue {
                namespace: q.namespace.clone(),
                name: q.name.clone(),
                metric: def.suffix,
            };
            let (namespace, name, read) = (q.namespace.clone(), q.name.clone(), def.read);
            let accessor = self.read_through(move |snap| snap.queue(&namespace, &name).map(read));
            self.register(registered, key, def.suffix, tags.clone(), def.help, accessor);
        }
        debug!(queue = %q.name, "queue gauges registered");
    }

    fn register_topic(&self, registered: &mut HashSet<MetricKey>, t: &TopicSnapshot) {
        let tags = self.entity_tags(EntityType::Topic, &t.name, &t.namespace);
        for def in TOPIC_GAUGES {
            let key = MetricKey::Topic {
                namespace: t.namespace.clone(),
                name: t.name.clone(),
                metric: def.suffix,
            };
            let (namespace, name, read) = (t.namespace.clone(), t.name.clone(), def.read);
            let accessor = self.read_through(move |snap| snap.topic(&namespace, &name).map(read));
            self.register(registered, key, def.suffix, tags.clone(), def.help, accessor);
        }
        debug!(topic = %t.name, "topic gauges registered");
    }

    fn register_subscription(&self, registered: &mut HashSet<MetricKey>, s: &SubscriptionSnapshot) {
        let mut tags = self.entity_tags(EntityType::Subscription, &s.entity_name(), &s.namespace);
        tags.insert("topic_name".to_string(), s.topic_name.clone());
        tags.insert("subscription_name".to_string(), s.name.clone());

        for def in SUBSCRIPTION_GAUGES {
            let key = MetricKey::Subscription {
                namespace: s.namespace.clone(),
                topic: s.topic_name.clone(),
                name: s.name.clone(),
                metric: def.suffix,
            };
            let (namespace, topic, name) = (s.namespace.clone(), s.topic_name.clone(), s.name.clone());
            let read = def.read;
            let accessor = self.read_through(move |snap| {
                snap.subscription(&namespace, &topic, &name).map(read)
            });
            self.register(registered, key, def.suffix, tags.clone(), def.help, accessor);
        }
        debug!(subscription = %s.entity_name(), "subscription gauges registered");
    }

    fn register_namespace(&self, registered: &mut HashSet<MetricKey>, n: &NamespaceSnapshot) {
        let tags = BTreeMap::from([
            ("namespace".to_string(), n.namespace.clone()),
            ("environment".to_string(), self.environment.clone()),
        ]);

        let key = MetricKey::Namespace {
            namespace: n.namespace.clone(),
            metric: ACTIVE_CONNECTIONS,
        };
        let namespace = n.namespace.clone();
        let accessor = self.read_through(move |snap| {
            snap.namespace(&namespace).map(|n| n.active_connections as f64)
        });
        self.register(
            registered,
            key,
            ACTIVE_CONNECTIONS,
            tags.clone(),
            "Number of active connections",
            accessor,
        );

        for quota in n.quota_usage.keys() {
            let key = MetricKey::Quota {
                namespace: n.namespace.clone(),
                quota: quota.clone(),
            };
            let mut quota_tags = tags.clone();
            quota_tags.insert("quota_name".to_string(), quota.clone());

            let (namespace, quota) = (n.namespace.clone(), quota.clone());
            let accessor = self.read_through(move |snap| {
                snap.namespace(&namespace)
                    .and_then(|n| n.quota_usage.get(&quota).copied())
            });
            self.register(registered, key, QUOTA_USAGE, quota_tags, "Percentage of quota used", accessor);
        }
    }

    /// Accessor that evaluates `read` against the snapshot current at
    /// evaluation time. An entity that has vanished reads as 0.
    fn read_through<F>(&self, read: F) -> GaugeFn
    where
        F: Fn(&Snapshot) -> Option<f64> + Send + Sync + 'static,
    {
        let cache = self.cache.clone();
        Arc::new(move || read(&cache.snapshot()).unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use busgauge_admin::{InMemoryAdminClient, QueueDetail, SubscriptionDetail, TopicDetail};
    use busgauge_collector::{CollectionPipeline, EntityFilter};

    use crate::sink::GaugeSet;

    const TTL: Duration = Duration::from_secs(60);

    struct Fixture {
        client: Arc<InMemoryAdminClient>,
        cache: Arc<SnapshotCache>,
        gauges: Arc<GaugeSet>,
        registry: MetricRegistry,
    }

    fn fixture() -> Fixture {
        let client = Arc::new(
            InMemoryAdminClient::new("test-ns")
                .with_queue(QueueDetail {
                    active_messages: 10,
                    dead_letter_messages: 2,
                    ..QueueDetail::named("q1")
                })
                .with_topic(TopicDetail {
                    size_bytes: 512,
                    ..TopicDetail::named("t1")
                })
                .with_subscription(SubscriptionDetail {
                    active_messages: 3,
                    ..SubscriptionDetail::named("t1", "s1")
                }),
        );
        let pipeline = CollectionPipeline::new(client.clone(), EntityFilter::allow_all(), true);
        let cache = Arc::new(SnapshotCache::new(Arc::new(pipeline), TTL));
        let gauges = Arc::new(GaugeSet::new());
        let registry = MetricRegistry::new(cache.clone(), gauges.clone(), "azure_servicebus", "prod");
        Fixture {
            client,
            cache,
            gauges,
            registry,
        }
    }

    fn expected_count() -> usize {
        // One queue, one topic, one subscription, one namespace without quotas.
        QUEUE_GAUGES.len() + TOPIC_GAUGES.len() + SUBSCRIPTION_GAUGES.len() + 1
    }

    #[tokio::test]
    async fn registers_every_gauge_once() {
        let f = fixture();
        f.cache.ensure_fresh().await;

        assert_eq!(f.registry.register_all(), expected_count());
        assert_eq!(f.registry.register_all(), 0);
        assert_eq!(f.gauges.len(), expected_count());
        assert_eq!(f.registry.registered(), expected_count());
    }

    #[tokio::test]
    async fn empty_cache_registers_nothing() {
        let f = fixture();
        assert_eq!(f.registry.register_all(), 0);
        assert!(f.gauges.is_empty());
    }

    #[tokio::test]
    async fn gauges_carry_entity_tags() {
        let f = fixture();
        f.registry.refresh().await;

        let samples = f.gauges.samples();
        let sub = samples
            .iter()
            .find(|s| {
                s.name == "azure_servicebus_active_messages"
                    && s.labels.get("entity_type").map(String::as_str) == Some("subscription")
            })
            .unwrap();
        assert_eq!(
            sub.labels,
            BTreeMap::from([
                ("entity_type".to_string(), "subscription".to_string()),
                ("entity_name".to_string(), "t1/s1".to_string()),
                ("namespace".to_string(), "test-ns".to_string()),
                ("environment".to_string(), "prod".to_string()),
                ("topic_name".to_string(), "t1".to_string()),
                ("subscription_name".to_string(), "s1".to_string()),
            ])
        );
        assert_eq!(sub.value, 3.0);

        assert_eq!(
            f.gauges.value(
                "azure_servicebus_size_bytes",
                &[("entity_type", "topic"), ("entity_name", "t1")]
            ),
            Some(512.0)
        );
        assert_eq!(
            f.gauges.value("azure_servicebus_active_connections", &[("namespace", "test-ns")]),
            Some(0.0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gauges_read_through_to_current_snapshot() {
        let f = fixture();
        f.registry.refresh().await;
        let q1 = [("entity_type", "queue"), ("entity_name", "q1")];
        assert_eq!(f.gauges.value("azure_servicebus_active_messages", &q1), Some(10.0));

        f.client.put_queue(QueueDetail {
            active_messages: 25,
            ..QueueDetail::named("q1")
        });
        // Not refreshed yet.
        assert_eq!(f.gauges.value("azure_servicebus_active_messages", &q1), Some(10.0));

        tokio::time::advance(TTL).await;
        let (outcome, added) = f.registry.refresh().await;
        assert_eq!(outcome, RefreshOutcome::Refreshed);
        assert_eq!(added, 0);
        assert_eq!(f.gauges.value("azure_servicebus_active_messages", &q1), Some(25.0));
    }

    #[tokio::test(start_paused = true)]
    async fn nested_entity_gauges_read_through() {
        let f = fixture();
        f.registry.refresh().await;
        let s1 = [("entity_type", "subscription"), ("entity_name", "t1/s1")];
        let t1 = [("entity_type", "topic"), ("entity_name", "t1")];
        assert_eq!(f.gauges.value("azure_servicebus_active_messages", &s1), Some(3.0));

        f.client.put_subscription(SubscriptionDetail {
            active_messages: 8,
            ..SubscriptionDetail::named("t1", "s1")
        });
        f.client.put_topic(TopicDetail {
            size_bytes: 1024,
            ..TopicDetail::named("t1")
        });
        tokio::time::advance(TTL).await;
        f.registry.refresh().await;

        assert_eq!(f.gauges.value("azure_servicebus_active_messages", &s1), Some(8.0));
        assert_eq!(f.gauges.value("azure_servicebus_size_bytes", &t1), Some(1024.0));
        assert_eq!(
            f.gauges.value("azure_servicebus_active_connections", &[("namespace", "test-ns")]),
            Some(0.0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_entity_reports_zero_and_new_entity_is_added() {
        let f = fixture();
        f.registry.refresh().await;

        f.client.remove_queue("q1");
        f.client.put_queue(QueueDetail {
            active_messages: 4,
            ..QueueDetail::named("q2")
        });
        tokio::time::advance(TTL).await;
        let (_, added) = f.registry.refresh().await;

        assert_eq!(added, QUEUE_GAUGES.len());
        assert_eq!(
            f.gauges
                .value("azure_servicebus_active_messages", &[("entity_name", "q1")]),
            Some(0.0)
        );
        assert_eq!(
            f.gauges
                .value("azure_servicebus_active_messages", &[("entity_name", "q2")]),
            Some(4.0)
        );
        assert!(f.registry.is_registered(&MetricKey::Queue {
            namespace: "test-ns".to_string(),
            name: "q1".to_string(),
            metric: "active_messages",
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_refreshes_until_shutdown() {
        let f = fixture();
        f.registry.refresh().await;
        assert_eq!(f.client.queue_listings(), 1);

        let registry = Arc::new(f.registry);
        let (tx, rx) = tokio::sync::watch::channel(false);
        let task = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.run(TTL, rx).await })
        };

        f.client.put_queue(QueueDetail::named("q2"));
        tokio::time::sleep(TTL + Duration::from_secs(1)).await;
        assert_eq!(f.client.queue_listings(), 2);
        assert_eq!(registry.registered(), expected_count() + QUEUE_GAUGES.len());

        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
