//! Collection error types.

use thiserror::Error;

pub type CollectResult<T> = Result<T, CollectError>;

/// Failure of a whole collection pass. Per-entity and per-type failures
/// are absorbed inside the pass and never surface here.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("collection pass aborted: {0}")]
    Aborted(String),
}
