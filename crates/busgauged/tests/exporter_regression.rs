//! Exporter regression tests.
//!
//! Assembles the exporter against an in-memory namespace and drives the
//! HTTP surface end to end: probe queries, TTL caching, health, and the
//! Prometheus endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use busgauge_admin::{AdminClient, InMemoryAdminClient, QueueDetail, SubscriptionDetail, TopicDetail};
use busgauge_api::{ApiState, build_router};
use busgauge_collector::{CollectionPipeline, EntityFilter, SnapshotCache};
use busgauge_core::{EntityType, ExporterConfig};
use busgauge_health::HealthProbe;
use busgauge_metrics::{GaugeSet, MetricRegistry};

struct Harness {
    client: Arc<InMemoryAdminClient>,
    registry: MetricRegistry,
    router: Router,
}

fn test_client() -> Arc<InMemoryAdminClient> {
    Arc::new(
        InMemoryAdminClient::new("test-ns")
            .with_queue(QueueDetail {
                active_messages: 10,
                dead_letter_messages: 2,
                ..QueueDetail::named("prod-orders")
            })
            .with_queue(QueueDetail::named("dev-orders"))
            .with_topic(TopicDetail::named("prod-events"))
            .with_subscription(SubscriptionDetail::named("prod-events", "audit"))
            .with_subscription(SubscriptionDetail::named("dev-events", "audit")),
    )
}

fn harness(toml: &str) -> Harness {
    let settings = ExporterConfig::from_toml_str(toml)
        .unwrap()
        .validate_offline()
        .unwrap();
    let client = test_client();
    let dyn_client: Arc<dyn AdminClient> = client.clone();

    let filter = EntityFilter::from_settings(&settings).unwrap();
    let pipeline = CollectionPipeline::new(
        dyn_client.clone(),
        filter,
        settings.include_namespace_metrics,
    );
    let cache = Arc::new(SnapshotCache::new(Arc::new(pipeline), settings.cache_ttl));
    let gauges = Arc::new(GaugeSet::new());
    let registry = MetricRegistry::new(
        cache.clone(),
        gauges.clone(),
        &settings.metric_prefix,
        settings.environment_tag(),
    );
    let health = Arc::new(HealthProbe::new(dyn_client, cache.clone(), Duration::from_secs(5)));
    let router = build_router(ApiState::new(cache, gauges, health));

    Harness {
        client,
        registry,
        router,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(router, uri).await;
    (status, serde_json::from_str(&body).unwrap())
}

#[tokio::test]
async fn probe_metrics_returns_all_entities() {
    let h = harness("");
    let (status, body) = get_json(&h.router, "/probe/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["queues"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["topics"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["subscriptions"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["namespaces"][0]["namespace"], "test-ns");
}

#[tokio::test]
async fn repeated_probes_within_ttl_hit_the_api_once() {
    let h = harness("");
    get(&h.router, "/probe/metrics").await;
    get(&h.router, "/probe/metrics/list").await;
    get(&h.router, "/probe/metrics/resource?type=queue&name=prod-orders").await;

    assert_eq!(h.client.queue_listings(), 1);
}

#[tokio::test]
async fn environment_and_type_filters_apply_over_http() {
    let h = harness(
        r#"
        [entities]
        types = ["topic", "subscription"]
        environment = "prod"
        "#,
    );
    let (status, body) = get_json(&h.router, "/probe/metrics/list").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["queues"], serde_json::json!([]));
    assert_eq!(body["data"]["topics"], serde_json::json!(["prod-events"]));
    assert_eq!(
        body["data"]["subscriptions"],
        serde_json::json!([{"topic": "prod-events", "subscription": "audit"}])
    );
    assert_eq!(h.client.queue_listings(), 0);
}

#[tokio::test]
async fn resource_lookup_status_codes() {
    let h = harness("");

    let (status, body) = get_json(&h.router, "/probe/metrics/resource?type=queue&name=prod-orders").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metrics"]["active_messages"], 10);

    let (status, body) =
        get_json(&h.router, "/probe/metrics/resource?type=subscription&name=prod-events%2Faudit").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entity_name"], "prod-events/audit");

    let (status, _) = get(&h.router, "/probe/metrics/resource?type=queue").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&h.router, "/probe/metrics/resource?type=bogus&name=x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&h.router, "/probe/metrics/resource?type=topic&name=missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_detail_is_omitted_but_others_served() {
    let h = harness("");
    h.client.fail_detail(EntityType::Queue, "dev-orders");

    let (_, body) = get_json(&h.router, "/probe/metrics/list").await;
    assert_eq!(body["data"]["queues"], serde_json::json!(["prod-orders"]));
}

#[tokio::test]
async fn health_reflects_connectivity() {
    let h = harness("");
    let (status, body) = get_json(&h.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UP");

    h.client.fail_listing(EntityType::Queue);
    let (status, body) = get_json(&h.router, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "DOWN");
}

#[tokio::test]
async fn status_endpoint() {
    let h = harness("");
    let (status, body) = get_json(&h.router, "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["uptime"].as_str().unwrap().ends_with("seconds"));
}

#[tokio::test]
async fn prometheus_exposes_registered_gauges() {
    let h = harness(
        r#"
        [entities]
        environment = "prod"

        [metrics]
        namespace = "sb"
        "#,
    );

    // Nothing is registered before the first refresh.
    let (_, text) = get(&h.router, "/metrics").await;
    assert!(text.is_empty());

    let (_, added) = h.registry.refresh().await;
    assert!(added > 0);
    assert_eq!(h.registry.register_all(), 0);

    let (status, text) = get(&h.router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text.matches("# TYPE sb_active_messages gauge").count(), 1);
    assert!(text.contains(
        "sb_active_messages{entity_name=\"prod-orders\",entity_type=\"queue\",environment=\"prod\",namespace=\"test-ns\"} 10"
    ));
    assert!(text.contains("sb_subscription_count{"));
    assert!(text.contains("sb_active_connections{environment=\"prod\",namespace=\"test-ns\"} 0"));
    assert!(!text.contains("dev-orders"));
}
