//! Metric sink: where registered gauges live.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// A lazily evaluated gauge value.
pub type GaugeFn = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Accepts gauge registrations. Implementations must not evaluate the
/// accessor at registration time.
pub trait MetricSink: Send + Sync {
    fn register_gauge(
        &self,
        name: &str,
        tags: BTreeMap<String, String>,
        description: &str,
        accessor: GaugeFn,
    );
}

struct Gauge {
    name: String,
    tags: BTreeMap<String, String>,
    description: String,
    accessor: GaugeFn,
}

/// One evaluated gauge.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeSample {
    pub name: String,
    pub description: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// In-process sink that keeps gauges in registration order.
#[derive(Default)]
pub struct GaugeSet {
    gauges: RwLock<Vec<Gauge>>,
}

impl GaugeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.gauges.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.read().is_empty()
    }

    /// Evaluate every gauge now.
    pub fn samples(&self) -> Vec<GaugeSample> {
        self.gauges
            .read()
            .iter()
            .map(|g| GaugeSample {
                name: g.name.clone(),
                description: g.description.clone(),
                labels: g.tags.clone(),
                value: (g.accessor)(),
            })
            .collect()
    }

    /// Evaluate the first gauge named `name` whose tags include all of `tags`.
    pub fn value(&self, name: &str, tags: &[(&str, &str)]) -> Option<f64> {
        self.gauges
            .read()
            .iter()
            .find(|g| {
                g.name == name
                    && tags
                        .iter()
                        .all(|(k, v)| g.tags.get(*k).is_some_and(|t| t == v))
            })
            .map(|g| (g.accessor)())
    }
}

impl MetricSink for GaugeSet {
    fn register_gauge(
        &self,
        name: &str,
        tags: BTreeMap<String, String>,
        description: &str,
        accessor: GaugeFn,
    ) {
        self.gauges.write().push(Gauge {
            name: name.to_string(),
            tags,
            description: description.to_string(),
            accessor,
        });
    }
}
