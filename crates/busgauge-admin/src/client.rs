//! The administrative API capability the collector depends on.

use async_trait::async_trait;

use crate::error::AdminResult;
use crate::types::{QueueDetail, SubscriptionDetail, TopicDetail};

/// Lists entities of one namespace and fetches their runtime properties.
///
/// Implementations own their timeouts. Each call may fail on its own.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Namespace this client is bound to.
    fn namespace(&self) -> &str;

    /// Names of all queues in the namespace.
    async fn list_queues(&self) -> AdminResult<Vec<String>>;

    async fn queue_detail(&self, name: &str) -> AdminResult<QueueDetail>;

    /// Names of all topics in the namespace.
    async fn list_topics(&self) -> AdminResult<Vec<String>>;

    async fn topic_detail(&self, name: &str) -> AdminResult<TopicDetail>;

    /// Subscription names of one topic.
    async fn list_subscriptions(&self, topic: &str) -> AdminResult<Vec<String>>;

    async fn subscription_detail(
        &self,
        topic: &str,
        subscription: &str,
    ) -> AdminResult<SubscriptionDetail>;
}
