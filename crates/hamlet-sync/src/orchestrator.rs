//! Sync orchestrator: run lifecycle, the reconciliation loop and
//! partial-failure accounting.
//!
//! At most one run is in progress at a time; mutual exclusion is the
//! run store's guarantee, the orchestrator just refuses when `begin`
//! reports an existing run. Per-record failures never abort the loop;
//! only an upstream fetch failure fails the whole run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use hamlet_hris::{Employee, EmployeeFilter, HrisClient, HrisError};

use crate::audit::{AuditEntry, AuditSink, SYSTEM_ACTOR};
use crate::error::{SyncError, SyncResult};
use crate::reconcile::{ReconcileAction, ReconcileEngine};
use crate::resolution::ConflictResolver;
use crate::store::{BeginRun, ConflictStore, IdentityStore, RunStore, VillageDirectory};
use crate::types::{
    Identity, RecordFailure, Resolution, RunCounters, SyncReport, SyncRun, SyncStatus, SyncType,
};

/// Parameters for one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Kind of run.
    pub sync_type: SyncType,
    /// Operator identifier, for scheduled runs `None`.
    #[serde(default)]
    pub triggered_by: Option<String>,
    /// Classify and count without writing identities or conflicts.
    #[serde(default)]
    pub dry_run: bool,
    /// Change watermark for incremental runs.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

impl SyncRequest {
    /// A scheduled full run.
    #[must_use]
    pub fn full() -> Self {
        Self {
            sync_type: SyncType::Full,
            triggered_by: None,
            dry_run: false,
            since: None,
        }
    }

    /// A scheduled incremental run over changes since `since`.
    #[must_use]
    pub fn incremental(since: DateTime<Utc>) -> Self {
        Self {
            sync_type: SyncType::Incremental,
            triggered_by: None,
            dry_run: false,
            since: Some(since),
        }
    }

    /// An operator-triggered run.
    #[must_use]
    pub fn manual(triggered_by: impl Into<String>) -> Self {
        Self {
            sync_type: SyncType::Manual,
            triggered_by: Some(triggered_by.into()),
            dry_run: false,
            since: None,
        }
    }

    /// Turn this request into a dry run.
    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Fold an employee snapshot into a matched identity.
///
/// Returns the updated identity, or `None` when the snapshot changes
/// nothing. An absent incoming village leaves the assignment untouched;
/// a differing one closes the open interval at `transfer_date` (or now)
/// and opens a new one.
fn merged(identity: &Identity, employee: &Employee, backfill_employee_id: bool) -> Option<Identity> {
    let mut updated = identity.clone();
    if backfill_employee_id {
        updated.employee_id = Some(employee.employee_id.clone());
    }
    updated.display_name = employee.effective_display_name();
    if let Some(role) = &employee.role {
        updated.role = Some(role.clone());
    }
    if let Some(village_id) = &employee.village_id {
        if updated.current_village_id.as_deref() != Some(village_id) {
            let at = employee.transfer_date.unwrap_or_else(Utc::now);
            updated.record_transfer(village_id, at);
        }
    }
    (updated != *identity).then_some(updated)
}

/// Drives sync runs end to end.
pub struct SyncOrchestrator {
    client: Arc<dyn HrisClient>,
    identities: Arc<dyn IdentityStore>,
    runs: Arc<dyn RunStore>,
    audit: Arc<dyn AuditSink>,
    engine: ReconcileEngine,
    resolver: ConflictResolver,
}

/// Builder for [`SyncOrchestrator`].
#[derive(Default)]
pub struct SyncOrchestratorBuilder {
    client: Option<Arc<dyn HrisClient>>,
    identities: Option<Arc<dyn IdentityStore>>,
    conflicts: Option<Arc<dyn ConflictStore>>,
    runs: Option<Arc<dyn RunStore>>,
    villages: Option<Arc<dyn VillageDirectory>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl SyncOrchestratorBuilder {
    /// Set the HRIS client.
    #[must_use]
    pub fn client(mut self, client: Arc<dyn HrisClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the identity store.
    #[must_use]
    pub fn identities(mut self, identities: Arc<dyn IdentityStore>) -> Self {
        self.identities = Some(identities);
        self
    }

    /// Set the conflict store.
    #[must_use]
    pub fn conflicts(mut self, conflicts: Arc<dyn ConflictStore>) -> Self {
        self.conflicts = Some(conflicts);
        self
    }

    /// Set the run store.
    #[must_use]
    pub fn runs(mut self, runs: Arc<dyn RunStore>) -> Self {
        self.runs = Some(runs);
        self
    }

    /// Set the village directory.
    #[must_use]
    pub fn villages(mut self, villages: Arc<dyn VillageDirectory>) -> Self {
        self.villages = Some(villages);
        self
    }

    /// Set the audit sink.
    #[must_use]
    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Build the orchestrator.
    ///
    /// Fails with `Internal` when a collaborator is missing.
    pub fn build(self) -> SyncResult<SyncOrchestrator> {
        let missing = |what: &str| SyncError::internal(format!("orchestrator requires {what}"));
        let client = self.client.ok_or_else(|| missing("an HRIS client"))?;
        let identities = self.identities.ok_or_else(|| missing("an identity store"))?;
        let conflicts = self.conflicts.ok_or_else(|| missing("a conflict store"))?;
        let runs = self.runs.ok_or_else(|| missing("a run store"))?;
        let villages = self.villages.ok_or_else(|| missing("a village directory"))?;
        let audit = self.audit.ok_or_else(|| missing("an audit sink"))?;
        Ok(SyncOrchestrator::new(
            client, identities, conflicts, runs, villages, audit,
        ))
    }
}

impl SyncOrchestrator {
    /// Create a new orchestrator over the given collaborators.
    #[must_use]
    pub fn new(
        client: Arc<dyn HrisClient>,
        identities: Arc<dyn IdentityStore>,
        conflicts: Arc<dyn ConflictStore>,
        runs: Arc<dyn RunStore>,
        villages: Arc<dyn VillageDirectory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let engine = ReconcileEngine::new(identities.clone(), conflicts.clone(), villages.clone());
        let resolver = ConflictResolver::new(
            identities.clone(),
            conflicts,
            villages,
            audit.clone(),
        );
        Self {
            client,
            identities,
            runs,
            audit,
            engine,
            resolver,
        }
    }

    /// Start building an orchestrator.
    #[must_use]
    pub fn builder() -> SyncOrchestratorBuilder {
        SyncOrchestratorBuilder::default()
    }

    /// The conflict resolver sharing this orchestrator's stores.
    #[must_use]
    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    /// Execute one sync run to completion.
    ///
    /// Fails fast with `AlreadyRunning` when a run is in progress and
    /// with `Fatal` when the employee fetch itself fails; per-record
    /// failures are accumulated instead and reflected in the report.
    #[instrument(skip_all, fields(sync_type = %request.sync_type, dry_run = request.dry_run))]
    pub async fn perform_sync(&self, request: SyncRequest) -> SyncResult<SyncReport> {
        let started = Instant::now();
        let mut run = SyncRun::start(request.sync_type, request.triggered_by.clone());
        match self.runs.begin(&run).await? {
            BeginRun::Started => {}
            BeginRun::Refused { existing } => {
                return Err(SyncError::AlreadyRunning { run_id: existing });
            }
        }
        info!(sync_id = %run.id, "Sync run started");

        let employees = match self.fetch(&request).await {
            Ok(employees) => employees,
            Err(e) => return self.fail_run(run, e).await,
        };

        let mut counters = RunCounters::default();
        let mut failures: Vec<RecordFailure> = Vec::new();
        let mut auto_resolved = 0u64;

        for employee in &employees {
            counters.records_processed += 1;
            let outcome = if request.dry_run {
                self.engine.preview(employee, run.id).await
            } else {
                self.engine.reconcile(employee, run.id).await
            };

            match outcome.action {
                ReconcileAction::Create => {
                    if request.dry_run {
                        counters.records_created += 1;
                    } else {
                        match self.create_identity(employee, run.id).await {
                            Ok(()) => counters.records_created += 1,
                            Err(e) => {
                                counters.records_failed += 1;
                                failures.push(RecordFailure {
                                    employee_id: employee.employee_id.clone(),
                                    error: e.to_string(),
                                });
                            }
                        }
                    }
                }
                ReconcileAction::Update {
                    identity,
                    backfill_employee_id,
                } => {
                    // An exact match with nothing to change is counted
                    // as processed only, so re-running on an unchanged
                    // employee set reports zero updates.
                    match merged(&identity, employee, backfill_employee_id) {
                        None => {}
                        Some(_) if request.dry_run => counters.records_updated += 1,
                        Some(updated) => {
                            match self.persist_update(updated, employee, run.id).await {
                                Ok(()) => counters.records_updated += 1,
                                Err(e) => {
                                    counters.records_failed += 1;
                                    failures.push(RecordFailure {
                                        employee_id: employee.employee_id.clone(),
                                        error: e.to_string(),
                                    });
                                }
                            }
                        }
                    }
                }
                ReconcileAction::Conflict { conflict, .. } => {
                    counters.conflicts_detected += 1;
                    let applied = if request.dry_run {
                        self.resolver
                            .auto_resolution_for(&conflict)
                            .await
                            .unwrap_or_else(|e| {
                                warn!(
                                    conflict_id = %conflict.id,
                                    error = %e,
                                    "Auto-resolution preview failed"
                                );
                                None
                            })
                    } else {
                        match self.resolver.auto_resolve(conflict.id).await {
                            Ok(applied) => applied,
                            Err(e) => {
                                // The conflict stays pending; it is
                                // counted as detected, not as a failure.
                                warn!(
                                    conflict_id = %conflict.id,
                                    error = %e,
                                    "Auto-resolution failed, conflict left pending"
                                );
                                None
                            }
                        }
                    };
                    if let Some(resolution) = applied {
                        auto_resolved += 1;
                        match resolution {
                            Resolution::CreateNew => counters.records_created += 1,
                            _ => counters.records_updated += 1,
                        }
                    }
                }
                ReconcileAction::Skip => {
                    counters.records_failed += 1;
                    failures.push(RecordFailure {
                        employee_id: employee.employee_id.clone(),
                        error: outcome.reason,
                    });
                }
            }
        }

        let status = counters.final_status();
        run.counters = counters;
        run.error_details = failures;
        run.finalize(status);
        self.runs.update(&run).await?;

        info!(
            sync_id = %run.id,
            status = %status,
            records_processed = counters.records_processed,
            records_created = counters.records_created,
            records_updated = counters.records_updated,
            records_failed = counters.records_failed,
            conflicts_detected = counters.conflicts_detected,
            "Sync run finished"
        );
        let actor = request
            .triggered_by
            .unwrap_or_else(|| SYSTEM_ACTOR.to_string());
        self.audit
            .record(AuditEntry::by_actor(
                actor,
                "sync.completed",
                "sync_run",
                run.id.to_string(),
                serde_json::json!({
                    "status": status,
                    "syncType": run.sync_type,
                    "dryRun": request.dry_run,
                    "counters": counters,
                }),
            ))
            .await;

        Ok(SyncReport {
            sync_id: run.id,
            status,
            counters,
            conflicts_auto_resolved: auto_resolved,
            duration_ms: started.elapsed().as_millis() as u64,
            errors: run.error_details,
        })
    }

    async fn fetch(&self, request: &SyncRequest) -> Result<Vec<Employee>, HrisError> {
        match (request.sync_type, request.since) {
            (SyncType::Incremental, Some(since)) => self.client.fetch_since(since).await,
            _ => self.client.fetch_all(EmployeeFilter::active()).await,
        }
    }

    async fn fail_run(&self, mut run: SyncRun, cause: HrisError) -> SyncResult<SyncReport> {
        error!(sync_id = %run.id, error = %cause, "Employee fetch failed, aborting run");
        run.finalize(SyncStatus::Failed);
        if let Err(store_err) = self.runs.update(&run).await {
            warn!(sync_id = %run.id, error = %store_err, "Could not persist failed run");
        }
        Err(SyncError::Fatal(cause))
    }

    async fn create_identity(&self, employee: &Employee, sync_id: Uuid) -> SyncResult<()> {
        // Unknown villages were already diverted to a conflict, so a
        // present village id can be assigned directly here.
        let identity = match &employee.village_id {
            Some(village_id) => {
                let at = employee.start_date.unwrap_or_else(Utc::now);
                Identity::from_employee_in_village(employee, village_id, at)
            }
            None => Identity::from_employee(employee),
        };
        self.identities.insert(&identity).await?;
        info!(
            sync_id = %sync_id,
            employee_id = %employee.employee_id,
            identity_id = %identity.id,
            "Identity created"
        );
        self.audit
            .record(AuditEntry::system(
                "user.created",
                "identity",
                identity.id.to_string(),
                serde_json::json!({
                    "syncId": sync_id,
                    "employeeId": employee.employee_id,
                    "villageId": identity.current_village_id,
                }),
            ))
            .await;
        Ok(())
    }

    async fn persist_update(
        &self,
        identity: Identity,
        employee: &Employee,
        sync_id: Uuid,
    ) -> SyncResult<()> {
        self.identities.update(&identity).await?;
        info!(
            sync_id = %sync_id,
            employee_id = %employee.employee_id,
            identity_id = %identity.id,
            "Identity updated"
        );
        self.audit
            .record(AuditEntry::system(
                "user.updated",
                "identity",
                identity.id.to_string(),
                serde_json::json!({
                    "syncId": sync_id,
                    "employeeId": employee.employee_id,
                    "villageId": identity.current_village_id,
                }),
            ))
            .await;
        Ok(())
    }

    /// Past runs, most recently started first.
    pub async fn sync_history(&self, limit: usize, offset: usize) -> SyncResult<Vec<SyncRun>> {
        Ok(self.runs.list(limit, offset).await?)
    }

    /// Look up one run.
    pub async fn sync_status(&self, sync_id: Uuid) -> SyncResult<SyncRun> {
        self.runs
            .get(sync_id)
            .await?
            .ok_or_else(|| SyncError::not_found("sync run", sync_id))
    }

    /// The most recently started run, regardless of status.
    pub async fn latest_sync(&self) -> SyncResult<Option<SyncRun>> {
        Ok(self.runs.latest().await?)
    }

    /// Whether a run is currently in progress.
    pub async fn is_sync_running(&self) -> SyncResult<bool> {
        Ok(self.runs.find_in_progress().await?.is_some())
    }
}
