//! busgauge-collector: turns administrative API state into snapshots.
//!
//! # Architecture
//!
//! ```text
//! SnapshotCache
//!   ├── ensure_fresh() ← timer or on-demand caller
//!   │     └── CollectionPipeline::collect()
//!   │           ├── EntityFilter (type ∧ pattern ∧ environment)
//!   │           └── AdminClient (list → filter → detail)
//!   └── queues() / topics() / subscriptions() / namespaces() → copies
//! ```
//!
//! A pass builds all four entity lists locally and the cache swaps them in
//! together, so readers never see two cycles mixed. A failed pass leaves
//! the previous snapshot in place.

pub mod cache;
pub mod error;
pub mod filter;
pub mod pipeline;

pub use cache::{RefreshOutcome, SnapshotCache};
pub use error::{CollectError, CollectResult};
pub use filter::EntityFilter;
pub use pipeline::CollectionPipeline;
