//! busgauge-metrics: exposes cached entity state as gauges.
//!
//! # Architecture
//!
//! ```text
//! MetricRegistry
//!   ├── register_all() ← after each refresh; one gauge per new MetricKey
//!   └── run() → periodic ensure_fresh + register_all loop
//!
//! MetricSink (trait)
//!   └── GaugeSet → evaluates accessors on scrape
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```
//!
//! Gauges are never given a value. Each one holds a closure that reads the
//! cache's current snapshot when evaluated, and reports 0 once its entity
//! has disappeared.

pub mod prometheus;
pub mod registry;
pub mod sink;

pub use prometheus::render_prometheus;
pub use registry::{MetricKey, MetricRegistry};
pub use sink::{GaugeFn, GaugeSample, GaugeSet, MetricSink};
