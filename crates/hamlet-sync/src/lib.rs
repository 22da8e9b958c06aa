//! Employee synchronization for the Hamlet platform.
//!
//! Pulls employee records from an HRIS via [`hamlet_hris`], reconciles
//! them against the local identity store with a fixed-priority matching
//! order, isolates ambiguities as conflict records (auto-resolving the
//! deterministic ones), and tracks every run with aggregate counters
//! and per-record failures.
//!
//! The entry point is [`SyncOrchestrator`]; storage is abstracted
//! behind the traits in [`store`], with in-memory implementations in
//! [`memory`] for tests and embedding.

pub mod audit;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod reconcile;
pub mod resolution;
pub mod store;
pub mod types;

pub use audit::{AuditEntry, AuditSink, MemoryAuditSink, TracingAuditSink, SYSTEM_ACTOR};
pub use error::{StoreError, SyncError, SyncResult};
pub use memory::{
    MemoryConflictStore, MemoryIdentityStore, MemoryRunStore, MemoryVillageDirectory,
};
pub use orchestrator::{SyncOrchestrator, SyncOrchestratorBuilder, SyncRequest};
pub use reconcile::{ReconcileAction, ReconcileEngine, ReconcileOutcome};
pub use resolution::{ConflictResolver, ConflictStats, ConflictTypeCounts, ResolveRequest};
pub use store::{BeginRun, ConflictFilter, ConflictStore, IdentityStore, RunStore, VillageDirectory};
pub use types::{
    Conflict, ConflictStatus, ConflictType, Identity, RecordFailure, Resolution, RunCounters,
    SyncReport, SyncRun, SyncStatus, SyncType, VillageInterval,
};
