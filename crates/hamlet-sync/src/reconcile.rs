//! Reconciliation engine: classifies one HRIS employee against the
//! identity store.
//!
//! Matching rules are evaluated in a fixed priority order; the first
//! rule that fires wins. The engine only classifies and, for conflicts,
//! persists the conflict record — applying creates and updates is the
//! orchestrator's job.

use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use hamlet_hris::Employee;

use crate::error::StoreError;
use crate::store::{ConflictStore, IdentityStore, VillageDirectory};
use crate::types::{Conflict, ConflictType, Identity};

/// Decision for one employee record.
#[derive(Debug, Clone)]
pub enum ReconcileAction {
    /// No identity matches; create one.
    Create,
    /// An identity matches; apply an update to it.
    Update {
        /// The matched identity, as loaded during classification.
        identity: Identity,
        /// True for an email-only match: the identity has no employee
        /// id yet and must have it assigned during apply.
        backfill_employee_id: bool,
    },
    /// An ambiguity was detected and isolated as a conflict.
    Conflict {
        /// The conflict record. Persisted unless this was a preview.
        conflict: Conflict,
        /// Whether the record was written to the conflict store.
        persisted: bool,
    },
    /// The record could not be classified; it is counted as failed and
    /// the run continues.
    Skip,
}

/// Outcome of reconciling one employee.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// The decision.
    pub action: ReconcileAction,
    /// Which rule fired, or the underlying error for a skip.
    pub reason: String,
}

/// Internal classification, before conflict persistence.
enum Match {
    Exact(Identity),
    EmailChanged(Identity),
    DuplicateEmail(Identity),
    EmailOnly(Identity),
    UnknownVillage,
    New,
}

/// Classifies employees against the identity store.
pub struct ReconcileEngine {
    identities: Arc<dyn IdentityStore>,
    conflicts: Arc<dyn ConflictStore>,
    villages: Arc<dyn VillageDirectory>,
}

impl ReconcileEngine {
    /// Create a new engine over the given stores.
    #[must_use]
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        conflicts: Arc<dyn ConflictStore>,
        villages: Arc<dyn VillageDirectory>,
    ) -> Self {
        Self {
            identities,
            conflicts,
            villages,
        }
    }

    /// Reconcile one employee, persisting a conflict record when the
    /// classification is a conflict.
    ///
    /// Never errors: store failures (including a failure to persist the
    /// conflict itself) degrade to a skip outcome so one bad record
    /// cannot abort a run.
    pub async fn reconcile(&self, employee: &Employee, sync_id: Uuid) -> ReconcileOutcome {
        self.run(employee, sync_id, true).await
    }

    /// Classify one employee without writing anything.
    ///
    /// Used by dry runs: the returned conflict record (if any) carries
    /// the detection snapshot but is not persisted.
    pub async fn preview(&self, employee: &Employee, sync_id: Uuid) -> ReconcileOutcome {
        self.run(employee, sync_id, false).await
    }

    async fn run(&self, employee: &Employee, sync_id: Uuid, persist: bool) -> ReconcileOutcome {
        let matched = match self.classify(employee).await {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    employee_id = %employee.employee_id,
                    error = %e,
                    "Reconciliation lookup failed, skipping record"
                );
                return ReconcileOutcome {
                    action: ReconcileAction::Skip,
                    reason: e.to_string(),
                };
            }
        };

        let (conflict_type, existing, reason) = match matched {
            Match::Exact(identity) => {
                return ReconcileOutcome {
                    action: ReconcileAction::Update {
                        identity,
                        backfill_employee_id: false,
                    },
                    reason: "matched by employee id and email".to_string(),
                };
            }
            Match::EmailOnly(identity) => {
                return ReconcileOutcome {
                    action: ReconcileAction::Update {
                        identity,
                        backfill_employee_id: true,
                    },
                    reason: "matched by email, employee id unassigned".to_string(),
                };
            }
            Match::New => {
                return ReconcileOutcome {
                    action: ReconcileAction::Create,
                    reason: "no existing identity".to_string(),
                };
            }
            Match::EmailChanged(identity) => (
                ConflictType::EmailChange,
                Some(identity),
                "matched by employee id, stored email differs",
            ),
            Match::DuplicateEmail(identity) => (
                ConflictType::DuplicateEmail,
                Some(identity),
                "email claimed by an identity with a different employee id",
            ),
            Match::UnknownVillage => (
                ConflictType::VillageNotFound,
                None,
                "employee references an unknown village",
            ),
        };

        let conflict = Conflict::detected(sync_id, conflict_type, employee, existing.as_ref());

        if persist {
            if let Err(e) = self.conflicts.insert(&conflict).await {
                warn!(
                    employee_id = %employee.employee_id,
                    conflict_type = %conflict_type,
                    error = %e,
                    "Failed to persist conflict, skipping record"
                );
                return ReconcileOutcome {
                    action: ReconcileAction::Skip,
                    reason: format!("failed to record {conflict_type} conflict: {e}"),
                };
            }
            debug!(
                employee_id = %employee.employee_id,
                conflict_id = %conflict.id,
                conflict_type = %conflict_type,
                "Conflict recorded"
            );
        }

        ReconcileOutcome {
            action: ReconcileAction::Conflict {
                conflict,
                persisted: persist,
            },
            reason: reason.to_string(),
        }
    }

    /// Apply the matching rules in fixed priority order.
    async fn classify(&self, employee: &Employee) -> Result<Match, StoreError> {
        let by_employee_id = self
            .identities
            .find_by_employee_id(&employee.employee_id)
            .await?;
        let by_email = self.identities.find_by_email(&employee.email).await?;

        // Rules 2 and 3: the employee-id match takes precedence; a
        // simultaneous email collision with another identity still
        // classifies as an email change against the id match.
        if let Some(identity) = by_employee_id {
            if identity.email.eq_ignore_ascii_case(&employee.email) {
                return Ok(Match::Exact(identity));
            }
            return Ok(Match::EmailChanged(identity));
        }

        // Rules 4 and 5.
        if let Some(identity) = by_email {
            return match &identity.employee_id {
                Some(stored) if *stored != employee.employee_id => {
                    Ok(Match::DuplicateEmail(identity))
                }
                Some(_) => {
                    // Same employee id would have matched rule 2; the
                    // stores disagree, treat as exact match.
                    Ok(Match::Exact(identity))
                }
                None => Ok(Match::EmailOnly(identity)),
            };
        }

        // Rules 6 and 7.
        if let Some(village_id) = &employee.village_id {
            if !self.villages.exists(village_id).await? {
                return Ok(Match::UnknownVillage);
            }
        }
        Ok(Match::New)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConflictStore, MemoryIdentityStore, MemoryVillageDirectory};
    use crate::store::ConflictFilter;
    use crate::types::ConflictStatus;
    use hamlet_hris::EmployeeStatus;

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
        engine: ReconcileEngine,
    }

    fn fixture() -> Fixture {
        let identities = Arc::new(MemoryIdentityStore::new());
        let conflicts = Arc::new(MemoryConflictStore::new());
        let villages = Arc::new(MemoryVillageDirectory::with_villages(["V1", "V2", "V3"]));
        let engine = ReconcileEngine::new(
            identities.clone(),
            conflicts.clone(),
            villages,
        );
        Fixture {
            identities,
            conflicts,
            engine,
        }
    }

    async fn seed_identity(fx: &Fixture, employee_id: Option<&str>, email: &str) -> Identity {
        let mut identity = Identity::from_employee(&employee(
            employee_id.unwrap_or("SEED"),
            email,
            None,
        ));
        identity.employee_id = employee_id.map(String::from);
        fx.identities.insert(&identity).await.unwrap();
        identity
    }

    #[tokio::test]
    async fn fresh_employee_creates() {
        let fx = fixture();
        let outcome = fx
            .engine
            .reconcile(&employee("E1", "e1@x.com", Some("V1")), Uuid::new_v4())
            .await;
        assert!(matches!(outcome.action, ReconcileAction::Create));
    }

    #[tokio::test]
    async fn exact_match_updates() {
        let fx = fixture();
        let seeded = seed_identity(&fx, Some("E1"), "e1@x.com").await;
        let outcome = fx
            .engine
            .reconcile(&employee("E1", "e1@x.com", None), Uuid::new_v4())
            .await;
        match outcome.action {
            ReconcileAction::Update {
                identity,
                backfill_employee_id,
            } => {
                assert_eq!(identity.id, seeded.id);
                assert!(!backfill_employee_id);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn changed_email_is_conflict() {
        let fx = fixture();
        let seeded = seed_identity(&fx, Some("E1"), "old@x.com").await;
        let outcome = fx
            .engine
            .reconcile(&employee("E1", "new@x.com", None), Uuid::new_v4())
            .await;
        match outcome.action {
            ReconcileAction::Conflict {
                conflict,
                persisted,
            } => {
                assert_eq!(conflict.conflict_type, ConflictType::EmailChange);
                assert_eq!(conflict.existing_user_id, Some(seeded.id));
                assert!(persisted);
                assert_eq!(fx.conflicts.len(), 1);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn claimed_email_is_duplicate_conflict() {
        let fx = fixture();
        seed_identity(&fx, Some("OTHER"), "shared@x.com").await;
        let outcome = fx
            .engine
            .reconcile(&employee("E1", "shared@x.com", None), Uuid::new_v4())
            .await;
        match outcome.action {
            ReconcileAction::Conflict { conflict, .. } => {
                assert_eq!(conflict.conflict_type, ConflictType::DuplicateEmail);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn email_only_match_backfills_employee_id() {
        let fx = fixture();
        let seeded = seed_identity(&fx, None, "e1@x.com").await;
        let outcome = fx
            .engine
            .reconcile(&employee("E1", "e1@x.com", None), Uuid::new_v4())
            .await;
        match outcome.action {
            ReconcileAction::Update {
                identity,
                backfill_employee_id,
            } => {
                assert_eq!(identity.id, seeded.id);
                assert!(backfill_employee_id);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_village_is_conflict() {
        let fx = fixture();
        let outcome = fx
            .engine
            .reconcile(&employee("E1", "e1@x.com", Some("NOWHERE")), Uuid::new_v4())
            .await;
        match outcome.action {
            ReconcileAction::Conflict { conflict, .. } => {
                assert_eq!(conflict.conflict_type, ConflictType::VillageNotFound);
                assert!(conflict.existing_user_id.is_none());
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn double_collision_prefers_email_change() {
        // Employee id matches identity X while the email matches a
        // different identity Y: the id match wins the classification.
        let fx = fixture();
        let x = seed_identity(&fx, Some("E1"), "x@x.com").await;
        seed_identity(&fx, Some("E2"), "collide@x.com").await;

        let outcome = fx
            .engine
            .reconcile(&employee("E1", "collide@x.com", None), Uuid::new_v4())
            .await;
        match outcome.action {
            ReconcileAction::Conflict { conflict, .. } => {
                assert_eq!(conflict.conflict_type, ConflictType::EmailChange);
                assert_eq!(conflict.existing_user_id, Some(x.id));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn store_failure_skips_without_error() {
        let fx = fixture();
        fx.identities.set_offline(true);
        let outcome = fx
            .engine
            .reconcile(&employee("E1", "e1@x.com", None), Uuid::new_v4())
            .await;
        assert!(matches!(outcome.action, ReconcileAction::Skip));
        assert!(outcome.reason.contains("unavailable"));
    }

    #[tokio::test]
    async fn conflict_persist_failure_degrades_to_skip() {
        let fx = fixture();
        seed_identity(&fx, Some("E1"), "old@x.com").await;
        fx.conflicts.set_offline(true);
        let outcome = fx
            .engine
            .reconcile(&employee("E1", "new@x.com", None), Uuid::new_v4())
            .await;
        assert!(matches!(outcome.action, ReconcileAction::Skip));
    }

    #[tokio::test]
    async fn preview_does_not_persist_conflicts() {
        let fx = fixture();
        seed_identity(&fx, Some("E1"), "old@x.com").await;
        let outcome = fx
            .engine
            .preview(&employee("E1", "new@x.com", None), Uuid::new_v4())
            .await;
        match outcome.action {
            ReconcileAction::Conflict { persisted, .. } => assert!(!persisted),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert!(fx.conflicts.is_empty());
        assert!(fx
            .conflicts
            .list(ConflictFilter {
                status: Some(ConflictStatus::Pending),
                ..ConflictFilter::default()
            })
            .await
            .unwrap()
            .is_empty());
    }
}
