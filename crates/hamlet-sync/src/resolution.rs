//! Conflict resolution: deterministic auto-resolution rules and the
//! operator-facing resolve API.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditSink};
use crate::error::{StoreError, SyncError, SyncResult};
use crate::store::{ConflictFilter, ConflictStore, IdentityStore, VillageDirectory};
use crate::types::{Conflict, ConflictStatus, ConflictType, Identity, Resolution};

/// Operator-supplied resolution of a pending conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    /// How to resolve the conflict.
    pub resolution: Resolution,
    /// Operator identifier for the audit trail.
    pub resolved_by: String,
    /// Optional notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Per-type conflict counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictTypeCounts {
    /// `email_change` conflicts.
    pub email_change: u64,
    /// `duplicate_email` conflicts.
    pub duplicate_email: u64,
    /// `village_not_found` conflicts.
    pub village_not_found: u64,
}

/// Aggregate conflict statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictStats {
    /// All conflicts in scope.
    pub total: u64,
    /// Still awaiting resolution.
    pub pending: u64,
    /// Resolved by the deterministic rules.
    pub auto_resolved: u64,
    /// Resolved by an operator.
    pub manually_resolved: u64,
    /// Dismissed.
    pub ignored: u64,
    /// Breakdown by conflict type.
    pub by_type: ConflictTypeCounts,
}

/// Applies resolutions to conflicts and the identities they reference.
pub struct ConflictResolver {
    identities: Arc<dyn IdentityStore>,
    conflicts: Arc<dyn ConflictStore>,
    villages: Arc<dyn VillageDirectory>,
    audit: Arc<dyn AuditSink>,
}

impl ConflictResolver {
    /// Create a new resolver over the given collaborators.
    #[must_use]
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        conflicts: Arc<dyn ConflictStore>,
        villages: Arc<dyn VillageDirectory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            identities,
            conflicts,
            villages,
            audit,
        }
    }

    /// The deterministic auto-resolution decision for a conflict,
    /// without applying anything.
    ///
    /// - `email_change` resolves to `use_hris` iff the HRIS email is
    ///   not claimed by a different identity at decision time.
    /// - `duplicate_email` never auto-resolves.
    /// - `village_not_found` resolves to `create_new`.
    pub async fn auto_resolution_for(
        &self,
        conflict: &Conflict,
    ) -> Result<Option<Resolution>, StoreError> {
        match conflict.conflict_type {
            ConflictType::EmailChange => {
                let claimant = self
                    .identities
                    .find_by_email(&conflict.hris_data.email)
                    .await?;
                match claimant {
                    Some(other) if Some(other.id) != conflict.existing_user_id => Ok(None),
                    _ => Ok(Some(Resolution::UseHris)),
                }
            }
            ConflictType::DuplicateEmail => Ok(None),
            ConflictType::VillageNotFound => Ok(Some(Resolution::CreateNew)),
        }
    }

    /// Attempt to auto-resolve a pending conflict.
    ///
    /// Returns the applied resolution, or `None` when the conflict is
    /// not pending or no deterministic rule applies (it then stays
    /// pending for manual review). Re-invocation on a non-pending
    /// conflict is a no-op.
    pub async fn auto_resolve(&self, conflict_id: Uuid) -> SyncResult<Option<Resolution>> {
        let mut conflict = self
            .conflicts
            .get(conflict_id)
            .await
            .map_err(SyncError::from)?
            .ok_or_else(|| SyncError::not_found("conflict", conflict_id))?;

        if !conflict.is_pending() {
            return Ok(None);
        }

        let Some(resolution) = self.auto_resolution_for(&conflict).await? else {
            return Ok(None);
        };

        let affected = self.apply(&conflict, resolution).await?;
        conflict.mark_auto_resolved(resolution);
        self.conflicts.update(&conflict).await?;

        info!(
            conflict_id = %conflict.id,
            conflict_type = %conflict.conflict_type,
            resolution = %resolution,
            "Conflict auto-resolved"
        );
        self.audit
            .record(AuditEntry::system(
                "conflict.auto_resolved",
                "conflict",
                conflict.id.to_string(),
                serde_json::json!({
                    "syncId": conflict.sync_id,
                    "resolution": resolution,
                    "employee": conflict.hris_data,
                    "affectedUserId": affected,
                }),
            ))
            .await;

        Ok(Some(resolution))
    }

    /// Resolve a conflict with an operator-supplied decision.
    ///
    /// Fails with `NotFound` when the conflict does not exist and with
    /// `AlreadyResolved` when it is no longer pending.
    pub async fn resolve(
        &self,
        conflict_id: Uuid,
        request: ResolveRequest,
    ) -> SyncResult<Conflict> {
        let mut conflict = self
            .conflicts
            .get(conflict_id)
            .await
            .map_err(SyncError::from)?
            .ok_or_else(|| SyncError::not_found("conflict", conflict_id))?;

        if !conflict.is_pending() {
            return Err(SyncError::AlreadyResolved { id: conflict_id });
        }

        let affected = self.apply(&conflict, request.resolution).await?;
        conflict.mark_manually_resolved(
            request.resolution,
            request.resolved_by.clone(),
            request.notes,
        );
        self.conflicts.update(&conflict).await?;

        info!(
            conflict_id = %conflict.id,
            resolution = %request.resolution,
            resolved_by = %request.resolved_by,
            "Conflict resolved"
        );
        self.audit
            .record(AuditEntry::by_actor(
                request.resolved_by,
                "conflict.resolved",
                "conflict",
                conflict.id.to_string(),
                serde_json::json!({
                    "syncId": conflict.sync_id,
                    "resolution": request.resolution,
                    "employee": conflict.hris_data,
                    "affectedUserId": affected,
                }),
            ))
            .await;

        Ok(conflict)
    }

    /// Apply one resolution to the identity store.
    ///
    /// Returns the id of the affected identity, if any.
    async fn apply(&self, conflict: &Conflict, resolution: Resolution) -> SyncResult<Option<Uuid>> {
        let employee = &conflict.hris_data;
        match resolution {
            Resolution::KeepSystem => Ok(None),

            Resolution::UseHris => {
                let mut identity = self.linked_identity(conflict).await?;
                identity.employee_id = Some(employee.employee_id.clone());
                identity.email = employee.email.clone();
                identity.display_name = employee.effective_display_name();
                if let Some(role) = &employee.role {
                    identity.role = Some(role.clone());
                }
                if let Some(village_id) = &employee.village_id {
                    if identity.current_village_id.as_deref() != Some(village_id) {
                        let at = employee.transfer_date.unwrap_or_else(Utc::now);
                        identity.record_transfer(village_id.clone(), at);
                    }
                }
                self.identities.update(&identity).await?;
                Ok(Some(identity.id))
            }

            Resolution::Merge => {
                let mut identity = self.linked_identity(conflict).await?;
                // Fill gaps only; non-empty email/employee_id are never
                // overwritten by a merge.
                if identity.employee_id.is_none() {
                    identity.employee_id = Some(employee.employee_id.clone());
                }
                if identity.display_name.is_empty() {
                    identity.display_name = employee.effective_display_name();
                }
                if identity.role.is_none() {
                    identity.role = employee.role.clone();
                }
                if identity.current_village_id.is_none() {
                    if let Some(village_id) = &employee.village_id {
                        if self.villages.exists(village_id).await? {
                            let at = employee.transfer_date.unwrap_or_else(Utc::now);
                            identity.record_transfer(village_id.clone(), at);
                        }
                    }
                }
                self.identities.update(&identity).await?;
                Ok(Some(identity.id))
            }

            Resolution::CreateNew => {
                let identity = match &employee.village_id {
                    Some(village_id) if self.villages.exists(village_id).await? => {
                        let at = employee.transfer_date.unwrap_or_else(Utc::now);
                        Identity::from_employee_in_village(employee, village_id, at)
                    }
                    _ => Identity::from_employee(employee),
                };
                self.identities.insert(&identity).await?;
                Ok(Some(identity.id))
            }
        }
    }

    async fn linked_identity(&self, conflict: &Conflict) -> SyncResult<Identity> {
        let id = conflict.existing_user_id.ok_or_else(|| {
            SyncError::internal(format!(
                "conflict {} has no linked identity to resolve against",
                conflict.id
            ))
        })?;
        self.identities
            .get(id)
            .await
            .map_err(SyncError::from)?
            .ok_or_else(|| {
                warn!(conflict_id = %conflict.id, identity_id = %id, "Linked identity vanished");
                SyncError::not_found("identity", id)
            })
    }

    /// Pending conflicts, optionally restricted to one run.
    pub async fn pending(&self, sync_id: Option<Uuid>) -> SyncResult<Vec<Conflict>> {
        Ok(self
            .conflicts
            .list(ConflictFilter {
                sync_id,
                status: Some(ConflictStatus::Pending),
                conflict_type: None,
            })
            .await?)
    }

    /// Aggregate statistics, optionally restricted to one run.
    pub async fn stats(&self, sync_id: Option<Uuid>) -> SyncResult<ConflictStats> {
        let conflicts = self
            .conflicts
            .list(ConflictFilter {
                sync_id,
                ..ConflictFilter::default()
            })
            .await?;

        let mut stats = ConflictStats::default();
        for conflict in &conflicts {
            stats.total += 1;
            match conflict.status {
                ConflictStatus::Pending => stats.pending += 1,
                ConflictStatus::AutoResolved => stats.auto_resolved += 1,
                ConflictStatus::ManuallyResolved => stats.manually_resolved += 1,
                ConflictStatus::Ignored => stats.ignored += 1,
            }
            match conflict.conflict_type {
                ConflictType::EmailChange => stats.by_type.email_change += 1,
                ConflictType::DuplicateEmail => stats.by_type.duplicate_email += 1,
                ConflictType::VillageNotFound => stats.by_type.village_not_found += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::memory::{MemoryConflictStore, MemoryIdentityStore, MemoryVillageDirectory};
    use hamlet_hris::{Employee, EmployeeStatus};

    fn employee(id: &str, email: &str, village: Option<&str>) -> Employee {
        Employee {
            employee_id: id.to_string(),
            email: email.to_string(),
            first_name: "Test".into(),
            last_name: id.to_string(),
            display_name: None,
            department: None,
            village_id: village.map(String::from),
            role: Some("resident".into()),
            status: EmployeeStatus::Active,
            start_date: None,
            end_date: None,
            transfer_date: None,
            previous_village_id: None,
        }
    }

    struct Fixture {
        identities: Arc<MemoryIdentityStore>,
        conflicts: Arc<MemoryConflictStore>,
        audit: Arc<MemoryAuditSink>,
        resolver: ConflictResolver,
    }

    fn fixture() -> Fixture {
        let identities = Arc::new(MemoryIdentityStore::new());
        let conflicts = Arc::new(MemoryConflictStore::new());
        let villages = Arc::new(MemoryVillageDirectory::with_villages(["V1", "V2"]));
        let audit = Arc::new(MemoryAuditSink::new());
        let resolver = ConflictResolver::new(
            identities.clone(),
            conflicts.clone(),
            villages,
            audit.clone(),
        );
        Fixture {
            identities,
            conflicts,
            audit,
            resolver,
        }
    }

    async fn seed_conflict(fx: &Fixture, conflict: &Conflict) {
        fx.conflicts.insert(conflict).await.unwrap();
    }

    #[tokio::test]
    async fn village_not_found_auto_resolves_to_create_new() {
        let fx = fixture();
        let conflict = Conflict::detected(
            Uuid::new_v4(),
            ConflictType::VillageNotFound,
            &employee("E1", "e1@x.com", Some("NOWHERE")),
            None,
        );
        seed_conflict(&fx, &conflict).await;

        let applied = fx.resolver.auto_resolve(conflict.id).await.unwrap();
        assert_eq!(applied, Some(Resolution::CreateNew));

        // Identity created without a village assignment.
        let created = fx
            .identities
            .find_by_employee_id("E1")
            .await
            .unwrap()
            .unwrap();
        assert!(created.current_village_id.is_none());
        assert!(created.village_history.is_empty());

        let stored = fx.conflicts.get(conflict.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConflictStatus::AutoResolved);
        assert_eq!(fx.audit.with_action("conflict.auto_resolved").len(), 1);
    }

    #[tokio::test]
    async fn email_change_auto_resolves_when_email_unclaimed() {
        let fx = fixture();
        let mut existing = Identity::from_employee(&employee("E1", "old@x.com", None));
        fx.identities.insert(&existing).await.unwrap();
        existing = fx.identities.get(existing.id).await.unwrap().unwrap();

        let conflict = Conflict::detected(
            Uuid::new_v4(),
            ConflictType::EmailChange,
            &employee("E1", "new@x.com", None),
            Some(&existing),
        );
        seed_conflict(&fx, &conflict).await;

        let applied = fx.resolver.auto_resolve(conflict.id).await.unwrap();
        assert_eq!(applied, Some(Resolution::UseHris));

        let updated = fx.identities.get(existing.id).await.unwrap().unwrap();
        assert_eq!(updated.email, "new@x.com");
    }

    #[tokio::test]
    async fn email_change_stays_pending_when_email_claimed() {
        let fx = fixture();
        let existing = Identity::from_employee(&employee("E1", "old@x.com", None));
        fx.identities.insert(&existing).await.unwrap();
        let claimant = Identity::from_employee(&employee("E2", "new@x.com", None));
        fx.identities.insert(&claimant).await.unwrap();

        let conflict = Conflict::detected(
            Uuid::new_v4(),
            ConflictType::EmailChange,
            &employee("E1", "new@x.com", None),
            Some(&existing),
        );
        seed_conflict(&fx, &conflict).await;

        let applied = fx.resolver.auto_resolve(conflict.id).await.unwrap();
        assert_eq!(applied, None);
        let stored = fx.conflicts.get(conflict.id).await.unwrap().unwrap();
        assert!(stored.is_pending());
        // Local email untouched.
        let unchanged = fx.identities.get(existing.id).await.unwrap().unwrap();
        assert_eq!(unchanged.email, "old@x.com");
    }

    #[tokio::test]
    async fn duplicate_email_never_auto_resolves() {
        let fx = fixture();
        let other = Identity::from_employee(&employee("OTHER", "shared@x.com", None));
        fx.identities.insert(&other).await.unwrap();

        let conflict = Conflict::detected(
            Uuid::new_v4(),
            ConflictType::DuplicateEmail,
            &employee("E1", "shared@x.com", None),
            Some(&other),
        );
        seed_conflict(&fx, &conflict).await;

        assert_eq!(fx.resolver.auto_resolve(conflict.id).await.unwrap(), None);
        assert!(fx
            .conflicts
            .get(conflict.id)
            .await
            .unwrap()
            .unwrap()
            .is_pending());
    }

    #[tokio::test]
    async fn auto_resolve_is_noop_on_resolved_conflict() {
        let fx = fixture();
        let conflict = Conflict::detected(
            Uuid::new_v4(),
            ConflictType::VillageNotFound,
            &employee("E1", "e1@x.com", Some("NOWHERE")),
            None,
        );
        seed_conflict(&fx, &conflict).await;

        assert!(fx.resolver.auto_resolve(conflict.id).await.unwrap().is_some());
        let identities_before = fx.identities.all().len();

        // Second invocation: not applied, no further mutation.
        assert_eq!(fx.resolver.auto_resolve(conflict.id).await.unwrap(), None);
        assert_eq!(fx.identities.all().len(), identities_before);
    }

    #[tokio::test]
    async fn auto_resolve_unknown_conflict_is_not_found() {
        let fx = fixture();
        let err = fx.resolver.auto_resolve(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));
    }

    #[tokio::test]
    async fn manual_resolve_keep_system_mutates_nothing() {
        let fx = fixture();
        let existing = Identity::from_employee(&employee("E1", "old@x.com", None));
        fx.identities.insert(&existing).await.unwrap();
        let conflict = Conflict::detected(
            Uuid::new_v4(),
            ConflictType::EmailChange,
            &employee("E1", "new@x.com", None),
            Some(&existing),
        );
        seed_conflict(&fx, &conflict).await;

        let resolved = fx
            .resolver
            .resolve(
                conflict.id,
                ResolveRequest {
                    resolution: Resolution::KeepSystem,
                    resolved_by: "ops@example.com".into(),
                    notes: Some("HR ticket 4411".into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(resolved.status, ConflictStatus::ManuallyResolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("ops@example.com"));
        assert_eq!(resolved.resolution_notes.as_deref(), Some("HR ticket 4411"));
        let unchanged = fx.identities.get(existing.id).await.unwrap().unwrap();
        assert_eq!(unchanged.email, "old@x.com");
    }

    #[tokio::test]
    async fn manual_resolve_merge_fills_only_gaps() {
        let fx = fixture();
        let mut existing = Identity::from_employee(&employee("SEED", "keep@x.com", None));
        existing.employee_id = None;
        existing.role = None;
        fx.identities.insert(&existing).await.unwrap();

        let conflict = Conflict::detected(
            Uuid::new_v4(),
            ConflictType::DuplicateEmail,
            &employee("E1", "hris@x.com", Some("V1")),
            Some(&existing),
        );
        seed_conflict(&fx, &conflict).await;

        fx.resolver
            .resolve(
                conflict.id,
                ResolveRequest {
                    resolution: Resolution::Merge,
                    resolved_by: "ops@example.com".into(),
                    notes: None,
                },
            )
            .await
            .unwrap();

        let merged = fx.identities.get(existing.id).await.unwrap().unwrap();
        // Gaps filled.
        assert_eq!(merged.employee_id.as_deref(), Some("E1"));
        assert_eq!(merged.role.as_deref(), Some("resident"));
        assert_eq!(merged.current_village_id.as_deref(), Some("V1"));
        // Non-empty email never overwritten.
        assert_eq!(merged.email, "keep@x.com");
    }

    #[tokio::test]
    async fn manual_resolve_create_new_leaves_existing_alone() {
        let fx = fixture();
        let existing = Identity::from_employee(&employee("OTHER", "shared@x.com", None));
        fx.identities.insert(&existing).await.unwrap();

        let conflict = Conflict::detected(
            Uuid::new_v4(),
            ConflictType::DuplicateEmail,
            &employee("E1", "shared@x.com", Some("V1")),
            Some(&existing),
        );
        seed_conflict(&fx, &conflict).await;

        fx.resolver
            .resolve(
                conflict.id,
                ResolveRequest {
                    resolution: Resolution::CreateNew,
                    resolved_by: "ops@example.com".into(),
                    notes: None,
                },
            )
            .await
            .unwrap();

        let created = fx
            .identities
            .find_by_employee_id("E1")
            .await
            .unwrap()
            .unwrap();
        assert_ne!(created.id, existing.id);
        assert_eq!(created.current_village_id.as_deref(), Some("V1"));
        let untouched = fx.identities.get(existing.id).await.unwrap().unwrap();
        assert_eq!(untouched.employee_id.as_deref(), Some("OTHER"));
    }

    #[tokio::test]
    async fn resolve_errors_match_the_contract() {
        let fx = fixture();
        let missing = fx
            .resolver
            .resolve(
                Uuid::new_v4(),
                ResolveRequest {
                    resolution: Resolution::KeepSystem,
                    resolved_by: "ops".into(),
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(missing, SyncError::NotFound { .. }));

        let conflict = Conflict::detected(
            Uuid::new_v4(),
            ConflictType::VillageNotFound,
            &employee("E1", "e1@x.com", Some("NOWHERE")),
            None,
        );
        seed_conflict(&fx, &conflict).await;
        fx.resolver.auto_resolve(conflict.id).await.unwrap();

        let already = fx
            .resolver
            .resolve(
                conflict.id,
                ResolveRequest {
                    resolution: Resolution::KeepSystem,
                    resolved_by: "ops".into(),
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(already, SyncError::AlreadyResolved { .. }));
    }

    #[tokio::test]
    async fn stats_break_down_by_status_and_type() {
        let fx = fixture();
        let sync_id = Uuid::new_v4();
        let c1 = Conflict::detected(
            sync_id,
            ConflictType::VillageNotFound,
            &employee("E1", "e1@x.com", Some("NOWHERE")),
            None,
        );
        let c2 = Conflict::detected(
            sync_id,
            ConflictType::DuplicateEmail,
            &employee("E2", "e2@x.com", None),
            None,
        );
        let c3 = Conflict::detected(
            Uuid::new_v4(),
            ConflictType::EmailChange,
            &employee("E3", "e3@x.com", None),
            None,
        );
        for c in [&c1, &c2, &c3] {
            seed_conflict(&fx, c).await;
        }
        fx.resolver.auto_resolve(c1.id).await.unwrap();

        let all = fx.resolver.stats(None).await.unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.auto_resolved, 1);
        assert_eq!(all.pending, 2);
        assert_eq!(all.by_type.village_not_found, 1);
        assert_eq!(all.by_type.duplicate_email, 1);
        assert_eq!(all.by_type.email_change, 1);

        let scoped = fx.resolver.stats(Some(sync_id)).await.unwrap();
        assert_eq!(scoped.total, 2);

        let pending = fx.resolver.pending(Some(sync_id)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, c2.id);
    }
}
