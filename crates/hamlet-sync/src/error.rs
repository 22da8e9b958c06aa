//! Sync error types.

use thiserror::Error;
use uuid::Uuid;

use hamlet_hris::HrisError;

/// Failure reported by a store collaborator.
#[derive(Debug, Clone, Error)]
#[error("store error: {message}")]
pub struct StoreError {
    /// Description from the underlying store.
    pub message: String,
}

impl StoreError {
    /// Create a store error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors that can occur during synchronization and conflict resolution.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Fetch-level failure: aborts the whole run and marks it failed.
    #[error("sync aborted, employee fetch failed: {0}")]
    Fatal(#[source] HrisError),

    /// Another sync run is already in progress. Runs are mutually
    /// exclusive; a second start attempt fails fast rather than waiting.
    #[error("a sync run is already in progress: {run_id}")]
    AlreadyRunning { run_id: Uuid },

    /// Store collaborator failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// The conflict is no longer pending.
    #[error("conflict already resolved: {id}")]
    AlreadyResolved { id: Uuid },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Create a not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error aborts a whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Fatal(_))
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
