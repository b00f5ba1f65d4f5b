//! busgauge-health: is the administrative API reachable?
//!
//! A probe lists queues under a timeout. Success reports `up` together
//! with the entity counts of the cached snapshot; any failure reports
//! `down` with the error text. The probe never touches the cache state.

pub mod checker;

pub use checker::{HealthProbe, HealthReport, HealthStatus};
