//! Frontier trait and error types
//!
//! This module defines the capability interface for URL frontier backends and
//! the error kinds every backend reports.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during frontier operations
///
/// `AlreadyVisited` and `Empty` are control-flow signals, not failures.
/// `StorageUnavailable` is transient: callers retry the whole task later.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrontierError {
    #[error("Frontier storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("URL already visited: {0}")]
    AlreadyVisited(String),

    #[error("No pending URL in frontier")]
    Empty,
}

impl FrontierError {
    /// Returns true for signals that are expected during a normal crawl
    pub fn is_control_flow(&self) -> bool {
        matches!(self, Self::AlreadyVisited(_) | Self::Empty)
    }
}

/// Result type for frontier operations
pub type FrontierResult<T> = Result<T, FrontierError>;

/// Trait for URL frontier implementations
///
/// A frontier owns two sets: pending paths waiting to be crawled, and visited
/// paths that are permanently done. A path is never in both. A path popped
/// and not yet persisted is in flight and lives in neither set; a failed task
/// returns it to pending with [`Frontier::push`].
#[async_trait]
pub trait Frontier: Send + Sync {
    /// Clears both the pending and visited sets
    async fn reset(&self) -> FrontierResult<()>;

    /// Adds a path to the pending set
    ///
    /// Re-adding a pending path is a harmless no-op. Fails with
    /// [`FrontierError::AlreadyVisited`] if the path has been persisted.
    async fn push(&self, path: &str) -> FrontierResult<()>;

    /// Atomically removes and returns an arbitrary pending path
    ///
    /// Fails with [`FrontierError::Empty`] when nothing is pending. No
    /// ordering is guaranteed.
    async fn pop(&self) -> FrontierResult<String>;

    /// Marks a path as permanently visited
    async fn persist(&self, path: &str) -> FrontierResult<()>;

    /// Returns the number of pending paths
    async fn pending_len(&self) -> FrontierResult<u64>;

    /// Returns the number of visited paths
    async fn visited_len(&self) -> FrontierResult<u64>;
}
