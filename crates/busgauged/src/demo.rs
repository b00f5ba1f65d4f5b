//! Demo mode: an in-memory namespace with drifting message counts.
//!
//! Lets the exporter run end to end without Service Bus credentials.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};

use busgauge_admin::{InMemoryAdminClient, QueueDetail, SubscriptionDetail, TopicDetail};

const MB: u64 = 1024 * 1024;

/// Sample namespace with two queues and one topic with two subscriptions.
pub fn sample_client(namespace: &str) -> Arc<InMemoryAdminClient> {
    let now = Some(Utc::now());
    let client = InMemoryAdminClient::new(namespace);
    for (name, active, dead) in [("orders", 12, 1), ("billing", 3, 0)] {
        client.put_queue(queue(name, active, dead, now));
    }
    client.put_topic(TopicDetail {
        size_bytes: 4096,
        max_size_bytes: 1024 * MB,
        ..TopicDetail::named("events")
    });
    for (name, active) in [("audit", 7), ("notifications", 0)] {
        client.put_subscription(SubscriptionDetail {
            active_messages: active,
            ..SubscriptionDetail::named("events", name)
        });
    }
    info!(%namespace, "demo namespace populated");
    Arc::new(client)
}

fn queue(
    name: &str,
    active: u64,
    dead_letter: u64,
    at: Option<chrono::DateTime<Utc>>,
) -> QueueDetail {
    QueueDetail {
        created_at: at,
        updated_at: at,
        accessed_at: at,
        total_messages: active + dead_letter,
        active_messages: active,
        dead_letter_messages: dead_letter,
        size_bytes: (active + dead_letter) * 512,
        max_size_bytes: 1024 * MB,
        ..QueueDetail::named(name)
    }
}

/// Periodically change the sample queue depths until shutdown.
pub async fn churn(
    client: Arc<InMemoryAdminClient>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick: u64 = 0;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                tick += 1;
                let now = Some(Utc::now());
                client.put_queue(queue("orders", 12 + tick % 7 * 3, tick % 3, now));
                client.put_queue(queue("billing", tick % 5, 0, now));
                debug!(tick, "demo queue depths changed");
            }
            _ = shutdown.changed() => break,
        }
    }
}
