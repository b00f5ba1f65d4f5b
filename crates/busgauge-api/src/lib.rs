//! busgauge-api: REST API for busgauge.
//!
//! Every probe route refreshes the cache first (a no-op within the TTL)
//! and then answers from one snapshot.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/probe/metrics` | All queues, topics, subscriptions, namespaces |
//! | GET | `/probe/metrics/list` | Entity names only |
//! | GET | `/probe/metrics/resource?type=&name=` | One entity |
//! | GET | `/status` | Uptime and build info |
//! | GET | `/health` | Administrative API connectivity |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::get;

use busgauge_collector::SnapshotCache;
use busgauge_health::HealthProbe;
use busgauge_metrics::GaugeSet;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub cache: Arc<SnapshotCache>,
    pub gauges: Arc<GaugeSet>,
    pub health: Arc<HealthProbe>,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(cache: Arc<SnapshotCache>, gauges: Arc<GaugeSet>, health: Arc<HealthProbe>) -> Self {
        Self {
            cache,
            gauges,
            health,
            started_at: Instant::now(),
        }
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let probe_routes = Router::new()
        .route("/metrics", get(handlers::probe_metrics))
        .route("/metrics/list", get(handlers::probe_metrics_list))
        .route("/metrics/resource", get(handlers::probe_metrics_resource));

    Router::new()
        .nest("/probe", probe_routes)
        .route("/status", get(handlers::status))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
