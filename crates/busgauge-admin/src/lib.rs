//! busgauge-admin: access to the messaging service's administrative API.
//!
//! The collector only sees the [`AdminClient`] trait. Two implementations
//! ship with the crate:
//!
//! ```text
//! AdminClient
//!   ├── ServiceBusClient     ← management REST API (Atom XML, SAS auth, HTTPS)
//!   └── InMemoryAdminClient  ← deterministic fake with failure injection
//! ```
//!
//! Every call may fail independently; callers decide whether a failure
//! costs one entity or a whole entity type.

pub mod atom;
pub mod client;
pub mod error;
pub mod memory;
pub mod sas;
pub mod servicebus;
mod transport;
pub mod types;

pub use client::AdminClient;
pub use error::{AdminError, AdminResult};
pub use memory::{AdminCall, InMemoryAdminClient};
pub use servicebus::ServiceBusClient;
pub use types::{QueueDetail, SubscriptionDetail, TopicDetail};
