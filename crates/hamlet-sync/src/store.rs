//! Repository contracts for the external persistence collaborators.
//!
//! The relational store itself lives outside this subsystem; these
//! traits are the seams the engine and orchestrator are injected with.
//! In-memory implementations live in [`crate::memory`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{Conflict, ConflictStatus, ConflictType, Identity, SyncRun};

/// Outcome of attempting to begin a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginRun {
    /// The run record was created; the caller owns the run.
    Started,
    /// Another run is already in progress; nothing was created.
    Refused {
        /// The in-progress run that blocked this one.
        existing: Uuid,
    },
}

/// CRUD over local identities.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Get an identity by internal id.
    async fn get(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;

    /// Look up an identity by its HRIS employee key.
    async fn find_by_employee_id(&self, employee_id: &str)
        -> Result<Option<Identity>, StoreError>;

    /// Look up an identity by email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    /// Insert a new identity.
    async fn insert(&self, identity: &Identity) -> Result<(), StoreError>;

    /// Persist changes to an existing identity.
    async fn update(&self, identity: &Identity) -> Result<(), StoreError>;
}

/// Filter for conflict listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictFilter {
    /// Restrict to conflicts detected by one run.
    pub sync_id: Option<Uuid>,
    /// Restrict to one lifecycle status.
    pub status: Option<ConflictStatus>,
    /// Restrict to one conflict type.
    pub conflict_type: Option<ConflictType>,
}

impl ConflictFilter {
    /// Check whether a conflict matches this filter.
    #[must_use]
    pub fn matches(&self, conflict: &Conflict) -> bool {
        self.sync_id.is_none_or(|s| conflict.sync_id == s)
            && self.status.is_none_or(|s| conflict.status == s)
            && self.conflict_type.is_none_or(|t| conflict.conflict_type == t)
    }
}

/// CRUD over conflict records.
#[async_trait]
pub trait ConflictStore: Send + Sync {
    /// Get a conflict by id.
    async fn get(&self, id: Uuid) -> Result<Option<Conflict>, StoreError>;

    /// Insert a newly detected conflict.
    async fn insert(&self, conflict: &Conflict) -> Result<(), StoreError>;

    /// Persist changes (resolution metadata) to a conflict.
    async fn update(&self, conflict: &Conflict) -> Result<(), StoreError>;

    /// List conflicts matching the filter, newest first.
    async fn list(&self, filter: ConflictFilter) -> Result<Vec<Conflict>, StoreError>;
}

/// CRUD over sync-run records.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Atomically create the run record unless another run is in
    /// progress. Mutual exclusion is the store's guarantee: check and
    /// insert must not interleave with a concurrent `begin`.
    async fn begin(&self, run: &SyncRun) -> Result<BeginRun, StoreError>;

    /// Get a run by id.
    async fn get(&self, id: Uuid) -> Result<Option<SyncRun>, StoreError>;

    /// Persist run counters/status.
    async fn update(&self, run: &SyncRun) -> Result<(), StoreError>;

    /// Find the currently in-progress run, if any.
    async fn find_in_progress(&self) -> Result<Option<SyncRun>, StoreError>;

    /// List runs, most recently started first.
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<SyncRun>, StoreError>;

    /// The most recently started run, regardless of status.
    async fn latest(&self) -> Result<Option<SyncRun>, StoreError>;
}

/// Lookup of known villages.
#[async_trait]
pub trait VillageDirectory: Send + Sync {
    /// Check whether a village id refers to a known village.
    async fn exists(&self, village_id: &str) -> Result<bool, StoreError>;
}
