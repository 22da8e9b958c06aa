//! Domain types: identities, conflicts, and sync runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use hamlet_hris::Employee;

/// Kind of sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    /// Full fetch of all active employees.
    Full,
    /// Fetch of employees changed since a watermark.
    Incremental,
    /// Operator-triggered run.
    Manual,
}

impl SyncType {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Full => "full",
            SyncType::Incremental => "incremental",
            SyncType::Manual => "manual",
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(SyncType::Full),
            "incremental" => Ok(SyncType::Incremental),
            "manual" => Ok(SyncType::Manual),
            _ => Err(format!("Unknown sync type: {s}")),
        }
    }
}

/// Status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Run is executing.
    InProgress,
    /// Every record processed cleanly.
    Completed,
    /// Some records failed, others succeeded.
    CompletedWithErrors,
    /// The run aborted, or every record failed.
    Failed,
}

impl SyncStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::InProgress => "in_progress",
            SyncStatus::Completed => "completed",
            SyncStatus::CompletedWithErrors => "completed_with_errors",
            SyncStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncStatus::InProgress)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_progress" => Ok(SyncStatus::InProgress),
            "completed" => Ok(SyncStatus::Completed),
            "completed_with_errors" => Ok(SyncStatus::CompletedWithErrors),
            "failed" => Ok(SyncStatus::Failed),
            _ => Err(format!("Unknown sync status: {s}")),
        }
    }
}

/// Type of detected reconciliation conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Matched by employee id, but the HRIS email differs from ours.
    EmailChange,
    /// The HRIS email is already claimed by a different identity.
    DuplicateEmail,
    /// The employee references a village we do not know.
    VillageNotFound,
}

impl ConflictType {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::EmailChange => "email_change",
            ConflictType::DuplicateEmail => "duplicate_email",
            ConflictType::VillageNotFound => "village_not_found",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConflictType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "email_change" => Ok(ConflictType::EmailChange),
            "duplicate_email" => Ok(ConflictType::DuplicateEmail),
            "village_not_found" => Ok(ConflictType::VillageNotFound),
            _ => Err(format!("Unknown conflict type: {s}")),
        }
    }
}

/// Lifecycle status of a conflict record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Awaiting resolution.
    Pending,
    /// Resolved by the deterministic auto-resolution rules.
    AutoResolved,
    /// Resolved by an operator.
    ManuallyResolved,
    /// Dismissed without action.
    Ignored,
}

impl ConflictStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStatus::Pending => "pending",
            ConflictStatus::AutoResolved => "auto_resolved",
            ConflictStatus::ManuallyResolved => "manually_resolved",
            ConflictStatus::Ignored => "ignored",
        }
    }

    /// Check if the conflict can still be resolved.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, ConflictStatus::Pending)
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConflictStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ConflictStatus::Pending),
            "auto_resolved" => Ok(ConflictStatus::AutoResolved),
            "manually_resolved" => Ok(ConflictStatus::ManuallyResolved),
            "ignored" => Ok(ConflictStatus::Ignored),
            _ => Err(format!("Unknown conflict status: {s}")),
        }
    }
}

/// How a conflict was (or should be) resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep local data untouched.
    KeepSystem,
    /// Overwrite local fields from the HRIS snapshot.
    UseHris,
    /// Fill only empty local fields from the HRIS snapshot.
    Merge,
    /// Create a fresh identity from the HRIS snapshot.
    CreateNew,
}

impl Resolution {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::KeepSystem => "keep_system",
            Resolution::UseHris => "use_hris",
            Resolution::Merge => "merge",
            Resolution::CreateNew => "create_new",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep_system" => Ok(Resolution::KeepSystem),
            "use_hris" => Ok(Resolution::UseHris),
            "merge" => Ok(Resolution::Merge),
            "create_new" => Ok(Resolution::CreateNew),
            _ => Err(format!("Unknown resolution: {s}")),
        }
    }
}

/// One interval of an identity's village assignment history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VillageInterval {
    /// Assigned village.
    pub village_id: String,
    /// When the assignment started.
    pub from: DateTime<Utc>,
    /// When the assignment ended; `None` while the assignment is current.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
}

/// A local user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Internal id; generated once, never reused.
    pub id: Uuid,
    /// External HRIS key; unique once set, unset until first linked.
    pub employee_id: Option<String>,
    /// Unique email address.
    pub email: String,
    /// Display name.
    pub display_name: String,
    /// Current village assignment.
    pub current_village_id: Option<String>,
    /// Role within the platform.
    pub role: Option<String>,
    /// Append-only interval log of village assignments. At most one
    /// interval is open (`to == None`) at any time.
    pub village_history: Vec<VillageInterval>,
}

impl Identity {
    /// Create an identity from an HRIS snapshot, without a village.
    #[must_use]
    pub fn from_employee(employee: &Employee) -> Self {
        Self {
            id: Uuid::new_v4(),
            employee_id: Some(employee.employee_id.clone()),
            email: employee.email.clone(),
            display_name: employee.effective_display_name(),
            current_village_id: None,
            role: employee.role.clone(),
            village_history: Vec::new(),
        }
    }

    /// Create an identity from an HRIS snapshot with an initial village
    /// assignment effective at `at`.
    #[must_use]
    pub fn from_employee_in_village(employee: &Employee, village_id: &str, at: DateTime<Utc>) -> Self {
        let mut identity = Self::from_employee(employee);
        identity.record_transfer(village_id, at);
        identity
    }

    /// The currently open village interval, if any.
    #[must_use]
    pub fn open_interval(&self) -> Option<&VillageInterval> {
        self.village_history.iter().find(|i| i.to.is_none())
    }

    /// Move the identity to a new village effective at `at`.
    ///
    /// Closes the open interval (if any) at `at` and appends a new open
    /// one, keeping the at-most-one-open-interval invariant. Closing and
    /// opening happen in one call so a single reconciliation observes
    /// them atomically.
    pub fn record_transfer(&mut self, village_id: impl Into<String>, at: DateTime<Utc>) {
        let village_id = village_id.into();
        if let Some(open) = self.village_history.iter_mut().find(|i| i.to.is_none()) {
            open.to = Some(at);
        }
        self.village_history.push(VillageInterval {
            village_id: village_id.clone(),
            from: at,
            to: None,
        });
        self.current_village_id = Some(village_id);
    }
}

/// A detected ambiguity that reconciliation cannot resolve unilaterally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    /// Conflict id.
    pub id: Uuid,
    /// Run that detected the conflict.
    pub sync_id: Uuid,
    /// What kind of ambiguity was detected.
    pub conflict_type: ConflictType,
    /// HRIS employee key.
    pub hris_employee_id: String,
    /// HRIS email at detection time.
    pub hris_email: Option<String>,
    /// Full HRIS snapshot at detection time.
    pub hris_data: Employee,
    /// Local identity involved, if any.
    pub existing_user_id: Option<Uuid>,
    /// Local identity snapshot at detection time.
    pub system_data: Option<Identity>,
    /// Lifecycle status.
    pub status: ConflictStatus,
    /// Applied resolution, once resolved.
    pub resolution: Option<Resolution>,
    /// Who resolved it (`"system"` for auto-resolution).
    pub resolved_by: Option<String>,
    /// When it was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Operator notes.
    pub resolution_notes: Option<String>,
    /// When the conflict was detected.
    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    /// Create a pending conflict from a reconciliation decision.
    #[must_use]
    pub fn detected(
        sync_id: Uuid,
        conflict_type: ConflictType,
        employee: &Employee,
        existing: Option<&Identity>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sync_id,
            conflict_type,
            hris_employee_id: employee.employee_id.clone(),
            hris_email: Some(employee.email.clone()),
            hris_data: employee.clone(),
            existing_user_id: existing.map(|i| i.id),
            system_data: existing.cloned(),
            status: ConflictStatus::Pending,
            resolution: None,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
            detected_at: Utc::now(),
        }
    }

    /// Check if the conflict is still pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    /// Stamp the conflict as auto-resolved.
    pub fn mark_auto_resolved(&mut self, resolution: Resolution) {
        self.status = ConflictStatus::AutoResolved;
        self.resolution = Some(resolution);
        self.resolved_by = Some("system".to_string());
        self.resolved_at = Some(Utc::now());
    }

    /// Stamp the conflict as manually resolved.
    pub fn mark_manually_resolved(
        &mut self,
        resolution: Resolution,
        resolved_by: impl Into<String>,
        notes: Option<String>,
    ) {
        self.status = ConflictStatus::ManuallyResolved;
        self.resolution = Some(resolution);
        self.resolved_by = Some(resolved_by.into());
        self.resolved_at = Some(Utc::now());
        self.resolution_notes = notes;
    }
}

/// A single failed record within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    /// HRIS employee key of the failed record.
    pub employee_id: String,
    /// Failure description.
    pub error: String,
}

/// Aggregate counters for a sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Employees fed through the loop, regardless of outcome.
    pub records_processed: u64,
    /// Identities created.
    pub records_created: u64,
    /// Identities updated.
    pub records_updated: u64,
    /// Records that failed in isolation.
    pub records_failed: u64,
    /// Conflicts detected.
    pub conflicts_detected: u64,
}

impl RunCounters {
    /// Compute the final run status from the counters.
    ///
    /// Failed iff every processed record failed (and at least one was
    /// processed); completed-with-errors iff some but not all failed.
    #[must_use]
    pub fn final_status(&self) -> SyncStatus {
        if self.records_failed > 0 && self.records_failed == self.records_processed {
            SyncStatus::Failed
        } else if self.records_failed > 0 {
            SyncStatus::CompletedWithErrors
        } else {
            SyncStatus::Completed
        }
    }
}

/// One bounded execution of the reconciliation loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    /// Run id.
    pub id: Uuid,
    /// Run status; finalized exactly once.
    pub status: SyncStatus,
    /// Kind of run.
    pub sync_type: SyncType,
    /// Who triggered the run, if an operator did.
    pub triggered_by: Option<String>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Aggregate counters.
    pub counters: RunCounters,
    /// Per-record failures accumulated during the run.
    pub error_details: Vec<RecordFailure>,
}

impl SyncRun {
    /// Create a new in-progress run.
    #[must_use]
    pub fn start(sync_type: SyncType, triggered_by: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: SyncStatus::InProgress,
            sync_type,
            triggered_by,
            started_at: Utc::now(),
            completed_at: None,
            counters: RunCounters::default(),
            error_details: Vec::new(),
        }
    }

    /// Finalize the run with a terminal status.
    pub fn finalize(&mut self, status: SyncStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}

/// Result returned to the caller of a sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Run id.
    pub sync_id: Uuid,
    /// Final run status.
    pub status: SyncStatus,
    /// Aggregate counters.
    #[serde(flatten)]
    pub counters: RunCounters,
    /// Conflicts resolved by the deterministic rules during this run.
    pub conflicts_auto_resolved: u64,
    /// Wall-clock duration of the run in milliseconds.
    pub duration_ms: u64,
    /// Per-record failures.
    pub errors: Vec<RecordFailure>,
}
