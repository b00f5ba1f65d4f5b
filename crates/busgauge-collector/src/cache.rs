//! TTL-gated snapshot cache.
//!
//! Readers take a short `parking_lot` read lock and clone an `Arc`, so they
//! never wait on the remote API. Collection passes are serialized by an
//! async mutex whose guard travels with the pass itself; the write lock is
//! held only for the final swap.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info};

use busgauge_core::{NamespaceSnapshot, QueueSnapshot, Snapshot, SubscriptionSnapshot, TopicSnapshot};

use crate::error::{CollectError, CollectResult};
use crate::pipeline::CollectionPipeline;

/// What [`SnapshotCache::ensure_fresh`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The last pass finished less than one TTL ago; nothing was called.
    Cached,
    /// A pass ran and its snapshot was installed.
    Refreshed,
    /// A pass ran and failed; the previous snapshot is still installed.
    Failed,
}

struct Installed {
    snapshot: Arc<Snapshot>,
    /// Monotonic time of the last successful pass. `None` until the first.
    at: Option<Instant>,
    /// Monotonic time the last pass finished, successful or not.
    attempted: Option<Instant>,
}

pub struct SnapshotCache {
    pipeline: Arc<CollectionPipeline>,
    ttl: Duration,
    installed: Arc<RwLock<Installed>>,
    refresh: Arc<Mutex<()>>,
}

impl SnapshotCache {
    pub fn new(pipeline: Arc<CollectionPipeline>, ttl: Duration) -> Self {
        Self {
            pipeline,
            ttl,
            installed: Arc::new(RwLock::new(Installed {
                snapshot: Arc::new(Snapshot::empty()),
                at: None,
                attempted: None,
            })),
            refresh: Arc::new(Mutex::new(())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn pipeline(&self) -> &Arc<CollectionPipeline> {
        &self.pipeline
    }

    /// Whether a snapshot was installed less than one TTL ago.
    pub fn is_fresh(&self) -> bool {
        self.installed
            .read()
            .at
            .is_some_and(|at| at.elapsed() < self.ttl)
    }

    /// Whether the TTL since the last finished pass has run out. A failed
    /// pass counts, so an unhealthy API is retried once per TTL at most.
    fn pass_due(&self) -> bool {
        self.installed
            .read()
            .attempted
            .is_none_or(|at| at.elapsed() >= self.ttl)
    }

    /// Refresh the snapshot if it is missing or older than the TTL.
    ///
    /// Concurrent callers share one pass: whoever waits on the refresh
    /// lock re-checks before collecting again. The pass runs in its own
    /// task holding that lock, so a caller that gives up early neither
    /// loses the result nor lets a second pass start. Failures are logged
    /// and reported through the outcome, never as an error.
    pub async fn ensure_fresh(&self) -> RefreshOutcome {
        if !self.pass_due() {
            debug!("using cached snapshot");
            return RefreshOutcome::Cached;
        }

        let pass = self.refresh.clone().lock_owned().await;
        if !self.pass_due() {
            debug!("snapshot refreshed by a concurrent caller");
            return RefreshOutcome::Cached;
        }

        let pipeline = self.pipeline.clone();
        let installed = self.installed.clone();
        let task = tokio::spawn(async move {
            let _pass = pass;
            // A panicking pass must not take the lock holder down with it.
            let result = tokio::spawn(async move { pipeline.collect().await })
                .await
                .map_err(|e| CollectError::Aborted(e.to_string()));
            install(&installed, result)
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "refresh task did not complete");
                RefreshOutcome::Failed
            }
        }
    }

    /// The installed snapshot. All four lists come from one pass.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.installed.read().snapshot.clone()
    }

    pub fn queues(&self) -> Vec<QueueSnapshot> {
        self.snapshot().queues.clone()
    }

    pub fn topics(&self) -> Vec<TopicSnapshot> {
        self.snapshot().topics.clone()
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionSnapshot> {
        self.snapshot().subscriptions.clone()
    }

    pub fn namespaces(&self) -> Vec<NamespaceSnapshot> {
        self.snapshot().namespaces.clone()
    }

    /// Wall-clock time of the installed snapshot, `None` before the first pass.
    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        let snapshot = self.snapshot();
        snapshot.is_refreshed().then_some(snapshot.refreshed_at)
    }
}

fn install(installed: &RwLock<Installed>, result: CollectResult<Snapshot>) -> RefreshOutcome {
    let now = Instant::now();
    match result {
        Ok(snapshot) => {
            let counts = (
                snapshot.queues.len(),
                snapshot.topics.len(),
                snapshot.subscriptions.len(),
            );
            let mut guard = installed.write();
            guard.snapshot = Arc::new(snapshot);
            guard.at = Some(now);
            guard.attempted = Some(now);
            drop(guard);
            info!(
                queues = counts.0,
                topics = counts.1,
                subscriptions = counts.2,
                "snapshot installed"
            );
            RefreshOutcome::Refreshed
        }
        Err(e) => {
            installed.write().attempted = Some(now);
            error!(error = %e, "collection pass failed; serving previous snapshot");
            RefreshOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use busgauge_admin::{
        AdminClient, AdminResult, InMemoryAdminClient, QueueDetail, SubscriptionDetail,
        TopicDetail,
    };
    use busgauge_core::EntityType;
    use tokio::sync::Notify;

    use crate::filter::EntityFilter;

    const TTL: Duration = Duration::from_secs(60);

    fn client_with_q1() -> Arc<InMemoryAdminClient> {
        Arc::new(InMemoryAdminClient::new("test-ns").with_queue(QueueDetail {
            active_messages: 10,
            dead_letter_messages: 2,
            ..QueueDetail::named("q1")
        }))
    }

    fn cache_for(client: Arc<dyn AdminClient>) -> SnapshotCache {
        let pipeline = CollectionPipeline::new(client, EntityFilter::allow_all(), true);
        SnapshotCache::new(Arc::new(pipeline), TTL)
    }

    /// In-memory client whose queue listing can be slowed, parked, or
    /// made to panic, and which tracks overlapping listings.
    struct ScriptedClient {
        inner: InMemoryAdminClient,
        delay: Option<Duration>,
        hold: AtomicBool,
        parked: Notify,
        release: Notify,
        explode: AtomicBool,
        listings: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(inner: InMemoryAdminClient) -> Self {
            Self {
                inner,
                delay: None,
                hold: AtomicBool::new(false),
                parked: Notify::new(),
                release: Notify::new(),
                explode: AtomicBool::new(false),
                listings: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn with_q1() -> Self {
            Self::new(InMemoryAdminClient::new("test-ns").with_queue(QueueDetail::named("q1")))
        }

        fn listings(&self) -> usize {
            self.listings.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AdminClient for ScriptedClient {
        fn namespace(&self) -> &str {
            self.inner.namespace()
        }
        async fn list_queues(&self) -> AdminResult<Vec<String>> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if self.hold.load(Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.explode.load(Ordering::SeqCst) {
                panic!("listing exploded");
            }
            self.inner.list_queues().await
        }
        async fn queue_detail(&self, name: &str) -> AdminResult<QueueDetail> {
            self.inner.queue_detail(name).await
        }
        async fn list_topics(&self) -> AdminResult<Vec<String>> {
            self.inner.list_topics().await
        }
        async fn topic_detail(&self, name: &str) -> AdminResult<TopicDetail> {
            self.inner.topic_detail(name).await
        }
        async fn list_subscriptions(&self, topic: &str) -> AdminResult<Vec<String>> {
            self.inner.list_subscriptions(topic).await
        }
        async fn subscription_detail(
            &self,
            topic: &str,
            subscription: &str,
        ) -> AdminResult<SubscriptionDetail> {
            self.inner.subscription_detail(topic, subscription).await
        }
    }

    #[tokio::test]
    async fn starts_empty_and_unrefreshed() {
        let cache = cache_for(client_with_q1());
        assert!(cache.queues().is_empty());
        assert!(cache.last_refreshed().is_none());
        assert!(!cache.is_fresh());
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_gates_remote_calls() {
        let client = client_with_q1();
        let cache = cache_for(client.clone());

        assert_eq!(cache.ensure_fresh().await, RefreshOutcome::Refreshed);
        assert_eq!(client.queue_listings(), 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.ensure_fresh().await, RefreshOutcome::Cached);
        assert_eq!(client.queue_listings(), 1);
        let q1 = &cache.queues()[0];
        assert_eq!((q1.active_messages, q1.dead_letter_messages), (10, 2));

        tokio::time::advance(Duration::from_secs(51)).await;
        assert_eq!(cache.ensure_fresh().await, RefreshOutcome::Refreshed);
        assert_eq!(client.queue_listings(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn listing_outage_is_retried_once_per_ttl() {
        let client = client_with_q1();
        client.fail_listing(EntityType::Queue);
        client.fail_listing(EntityType::Topic);
        let cache = cache_for(client.clone());

        for _ in 0..5 {
            cache.ensure_fresh().await;
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        assert_eq!(client.queue_listings(), 1);
        assert!(cache.queues().is_empty());

        client.clear_failures();
        tokio::time::advance(TTL).await;
        assert_eq!(cache.ensure_fresh().await, RefreshOutcome::Refreshed);
        assert_eq!(client.queue_listings(), 2);
        assert_eq!(cache.queues().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_pass_keeps_previous_snapshot() {
        let client = Arc::new(ScriptedClient::with_q1());
        let cache = cache_for(client.clone());
        cache.ensure_fresh().await;
        let refreshed_at = cache.last_refreshed();

        client.explode.store(true, Ordering::SeqCst);
        tokio::time::advance(TTL).await;

        assert_eq!(cache.ensure_fresh().await, RefreshOutcome::Failed);
        assert_eq!(cache.queues().len(), 1);
        assert_eq!(cache.last_refreshed(), refreshed_at);
        assert!(!cache.is_fresh());

        // The failed pass still starts a new TTL window.
        client.explode.store(false, Ordering::SeqCst);
        assert_eq!(cache.ensure_fresh().await, RefreshOutcome::Cached);
        assert_eq!(client.listings(), 2);

        tokio::time::advance(TTL).await;
        assert_eq!(cache.ensure_fresh().await, RefreshOutcome::Refreshed);
        assert_eq!(client.listings(), 3);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_pass() {
        let client = client_with_q1();
        let cache = cache_for(client.clone());

        let (a, b) = tokio::join!(cache.ensure_fresh(), cache.ensure_fresh());
        assert_eq!(client.queue_listings(), 1);
        assert!(matches!(
            (a, b),
            (RefreshOutcome::Refreshed, RefreshOutcome::Cached)
                | (RefreshOutcome::Cached, RefreshOutcome::Refreshed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_caller_keeps_its_pass_exclusive() {
        let client = Arc::new(ScriptedClient {
            delay: Some(Duration::from_secs(10)),
            ..ScriptedClient::with_q1()
        });
        let cache = cache_for(client.clone());

        let first = tokio::time::timeout(Duration::from_secs(1), cache.ensure_fresh()).await;
        assert!(first.is_err());

        // Waits for the abandoned pass instead of starting another.
        assert_eq!(cache.ensure_fresh().await, RefreshOutcome::Cached);
        assert_eq!(client.listings(), 1);
        assert_eq!(client.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(cache.queues()[0].name, "q1");
    }

    #[tokio::test(start_paused = true)]
    async fn readers_see_previous_cycle_while_a_pass_runs() {
        let client = Arc::new(ScriptedClient::new(
            InMemoryAdminClient::new("test-ns")
                .with_queue(QueueDetail::named("q1"))
                .with_topic(TopicDetail::named("t1")),
        ));
        let cache = Arc::new(cache_for(client.clone()));
        cache.ensure_fresh().await;

        client.inner.remove_queue("q1");
        client.inner.put_queue(QueueDetail::named("q2"));
        client.inner.put_topic(TopicDetail::named("t2"));
        client.hold.store(true, Ordering::SeqCst);
        tokio::time::advance(TTL).await;
        let fresh_before = cache.is_fresh();

        let pass = tokio::spawn({
            let cache = cache.clone();
            async move { cache.ensure_fresh().await }
        });
        client.parked.notified().await;

        assert_eq!(cache.queues()[0].name, "q1");
        assert_eq!(cache.topics().len(), 1);
        let held = cache.snapshot();
        assert_eq!(held.queues[0].name, "q1");
        assert_eq!(held.topics.len(), 1);
        assert_eq!(cache.is_fresh(), fresh_before);

        client.release.notify_one();
        assert_eq!(pass.await.unwrap(), RefreshOutcome::Refreshed);

        assert_eq!(cache.queues()[0].name, "q2");
        assert_eq!(cache.topics().len(), 2);
        assert!(cache.is_fresh());
        assert_eq!(held.queues[0].name, "q1");
    }

    #[tokio::test]
    async fn panicking_pass_is_contained() {
        let client = ScriptedClient::with_q1();
        client.explode.store(true, Ordering::SeqCst);
        let cache = cache_for(Arc::new(client));

        assert_eq!(cache.ensure_fresh().await, RefreshOutcome::Failed);
        assert!(cache.snapshot().queues.is_empty());
        assert!(cache.last_refreshed().is_none());
    }
}
