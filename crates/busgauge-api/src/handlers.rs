//! REST API handlers.
//!
//! Probe handlers call `ensure_fresh()` and answer from the cache; they
//! never report collection failures, only whatever snapshot is installed.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use busgauge_core::{
    EntityType, NamespaceSnapshot, QueueSnapshot, SubscriptionSnapshot, TopicSnapshot,
};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    status: &'static str,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            data,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse {
            status: "error",
            data: msg.to_string(),
        }),
    )
}

// ── Probe ──────────────────────────────────────────────────────

#[derive(Serialize)]
struct MetricsResponse {
    queues: Vec<QueueSnapshot>,
    topics: Vec<TopicSnapshot>,
    subscriptions: Vec<SubscriptionSnapshot>,
    namespaces: Vec<NamespaceSnapshot>,
}

#[derive(Serialize)]
struct SubscriptionRef {
    topic: String,
    subscription: String,
}

#[derive(Serialize)]
struct EntitiesResponse {
    queues: Vec<String>,
    topics: Vec<String>,
    subscriptions: Vec<SubscriptionRef>,
}

/// GET /probe/metrics
pub async fn probe_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    info!("request received for /probe/metrics");
    state.cache.ensure_fresh().await;

    let snapshot = state.cache.snapshot();
    ApiResponse::ok(MetricsResponse {
        queues: snapshot.queues.clone(),
        topics: snapshot.topics.clone(),
        subscriptions: snapshot.subscriptions.clone(),
        namespaces: snapshot.namespaces.clone(),
    })
}

/// GET /probe/metrics/list
pub async fn probe_metrics_list(State(state): State<ApiState>) -> impl IntoResponse {
    info!("request received for /probe/metrics/list");
    state.cache.ensure_fresh().await;

    let snapshot = state.cache.snapshot();
    ApiResponse::ok(EntitiesResponse {
        queues: snapshot.queues.iter().map(|q| q.name.clone()).collect(),
        topics: snapshot.topics.iter().map(|t| t.name.clone()).collect(),
        subscriptions: snapshot
            .subscriptions
            .iter()
            .map(|s| SubscriptionRef {
                topic: s.topic_name.clone(),
                subscription: s.name.clone(),
            })
            .collect(),
    })
}

/// Query for a single entity. Subscriptions are named `topic/subscription`.
#[derive(Debug, Deserialize)]
pub struct ResourceQuery {
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    pub name: Option<String>,
}

/// GET /probe/metrics/resource?type=&name=
pub async fn probe_metrics_resource(
    State(state): State<ApiState>,
    Query(query): Query<ResourceQuery>,
) -> impl IntoResponse {
    let (Some(raw_type), Some(name)) = (query.entity_type, query.name) else {
        return error_response(
            "Both 'type' and 'name' query parameters are required",
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    };
    info!(entity_type = %raw_type, entity_name = %name, "request received for /probe/metrics/resource");

    let Ok(entity_type) = raw_type.parse::<EntityType>() else {
        return error_response(
            "Entity type must be one of: queue, topic, subscription",
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    };

    state.cache.ensure_fresh().await;
    let snapshot = state.cache.snapshot();

    let metrics = match entity_type {
        EntityType::Queue => snapshot
            .queues
            .iter()
            .find(|q| q.name == name)
            .and_then(|q| serde_json::to_value(q).ok()),
        EntityType::Topic => snapshot
            .topics
            .iter()
            .find(|t| t.name == name)
            .and_then(|t| serde_json::to_value(t).ok()),
        EntityType::Subscription => name.split_once('/').and_then(|(topic, sub)| {
            snapshot
                .subscriptions
                .iter()
                .find(|s| s.topic_name == topic && s.name == sub)
                .and_then(|s| serde_json::to_value(s).ok())
        }),
    };

    match metrics {
        Some(metrics) => Json(serde_json::json!({
            "status": "success",
            "timestamp": Utc::now().to_rfc3339(),
            "entity_type": entity_type,
            "entity_name": name,
            "metrics": metrics,
        }))
        .into_response(),
        None => error_response(
            &format!("{entity_type} with name '{name}' not found"),
            StatusCode::NOT_FOUND,
        )
        .into_response(),
    }
}

// ── Status & health ────────────────────────────────────────────

/// GET /status
pub async fn status(State(state): State<ApiState>) -> impl IntoResponse {
    let build_info = BTreeMap::from([
        ("name", env!("CARGO_PKG_NAME")),
        ("version", env!("CARGO_PKG_VERSION")),
        ("os", std::env::consts::OS),
        ("arch", std::env::consts::ARCH),
    ]);

    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "uptime": format_uptime(state.started_at.elapsed()),
        "last_refreshed": state.cache.last_refreshed(),
        "build_info": build_info,
    }))
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let report = state.health.check().await;
    let code = if report.is_up() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

/// Format as `D days, H hours, M minutes, S seconds`.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!(
        "{} days, {} hours, {} minutes, {} seconds",
        secs / 86_400,
        secs % 86_400 / 3_600,
        secs % 3_600 / 60,
        secs % 60
    )
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = busgauge_metrics::render_prometheus(&state.gauges.samples());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
