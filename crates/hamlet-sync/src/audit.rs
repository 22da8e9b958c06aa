//! Audit sink contract and built-in sinks.
//!
//! One entry is emitted per identity mutation and one summary entry per
//! completed run. Audit failures never affect sync outcomes; sinks are
//! expected to swallow and log their own errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Actor name used for automated sync mutations.
pub const SYSTEM_ACTOR: &str = "system";

/// One audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Action name, e.g. `user.created` or `sync.completed`.
    pub action: String,
    /// Who performed the action.
    pub actor: String,
    /// Type of the affected resource.
    pub resource_type: String,
    /// Id of the affected resource.
    pub resource_id: String,
    /// Metadata payload (employee snapshot, sync id, counters).
    pub metadata: serde_json::Value,
    /// When the entry was recorded.
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    /// Create an entry attributed to the automated sync.
    pub fn system(
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self::by_actor(SYSTEM_ACTOR, action, resource_type, resource_id, metadata)
    }

    /// Create an entry attributed to a named actor.
    pub fn by_actor(
        actor: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            action: action.into(),
            actor: actor.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            metadata,
            at: Utc::now(),
        }
    }
}

/// Destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record an entry. Implementations must not fail the caller.
    async fn record(&self, entry: AuditEntry);
}

/// Audit sink that emits structured log events.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditEntry) {
        info!(
            target: "audit",
            action = %entry.action,
            actor = %entry.actor,
            resource_type = %entry.resource_type,
            resource_id = %entry.resource_id,
            metadata = %entry.metadata,
            "audit entry"
        );
    }
}

/// Audit sink that captures entries for test assertions.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded entries.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Entries with the given action name.
    #[must_use]
    pub fn with_action(&self, action: &str) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.action == action)
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}
