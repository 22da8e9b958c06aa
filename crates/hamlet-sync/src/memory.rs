//! In-memory store implementations.
//!
//! Back the repository contracts with `RwLock`-guarded maps. Used as
//! test fakes and for embedded/preview deployments. Each store has an
//! offline toggle so failure paths can be exercised deterministically.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{
    BeginRun, ConflictFilter, ConflictStore, IdentityStore, RunStore, VillageDirectory,
};
use crate::types::{Conflict, Identity, SyncRun, SyncStatus};

// A poisoning panic cannot leave these maps half-written (every write is
// a single insert), so recover the guard rather than panicking.
fn read_guard<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_guard<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn offline_check(offline: &AtomicBool, what: &str) -> Result<(), StoreError> {
    if offline.load(Ordering::SeqCst) {
        Err(StoreError::new(format!("{what} store unavailable")))
    } else {
        Ok(())
    }
}

/// In-memory identity store.
#[derive(Default)]
pub struct MemoryIdentityStore {
    identities: RwLock<HashMap<Uuid, Identity>>,
    offline: AtomicBool,
}

impl MemoryIdentityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store becoming unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Snapshot of every identity, for assertions.
    #[must_use]
    pub fn all(&self) -> Vec<Identity> {
        read_guard(&self.identities)
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        offline_check(&self.offline, "identity")?;
        Ok(read_guard(&self.identities).get(&id).cloned())
    }

    async fn find_by_employee_id(
        &self,
        employee_id: &str,
    ) -> Result<Option<Identity>, StoreError> {
        offline_check(&self.offline, "identity")?;
        Ok(read_guard(&self.identities)
            .values()
            .find(|i| i.employee_id.as_deref() == Some(employee_id))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        offline_check(&self.offline, "identity")?;
        Ok(read_guard(&self.identities)
            .values()
            .find(|i| i.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert(&self, identity: &Identity) -> Result<(), StoreError> {
        offline_check(&self.offline, "identity")?;
        write_guard(&self.identities)
            .insert(identity.id, identity.clone());
        Ok(())
    }

    async fn update(&self, identity: &Identity) -> Result<(), StoreError> {
        offline_check(&self.offline, "identity")?;
        let mut identities = write_guard(&self.identities);
        if !identities.contains_key(&identity.id) {
            return Err(StoreError::new(format!(
                "identity {} does not exist",
                identity.id
            )));
        }
        identities.insert(identity.id, identity.clone());
        Ok(())
    }
}

/// In-memory conflict store.
#[derive(Default)]
pub struct MemoryConflictStore {
    conflicts: RwLock<HashMap<Uuid, Conflict>>,
    offline: AtomicBool,
}

impl MemoryConflictStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store becoming unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of recorded conflicts, for assertions.
    #[must_use]
    pub fn len(&self) -> usize {
        read_guard(&self.conflicts).len()
    }

    /// Check if no conflicts are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConflictStore for MemoryConflictStore {
    async fn get(&self, id: Uuid) -> Result<Option<Conflict>, StoreError> {
        offline_check(&self.offline, "conflict")?;
        Ok(read_guard(&self.conflicts).get(&id).cloned())
    }

    async fn insert(&self, conflict: &Conflict) -> Result<(), StoreError> {
        offline_check(&self.offline, "conflict")?;
        write_guard(&self.conflicts)
            .insert(conflict.id, conflict.clone());
        Ok(())
    }

    async fn update(&self, conflict: &Conflict) -> Result<(), StoreError> {
        offline_check(&self.offline, "conflict")?;
        let mut conflicts = write_guard(&self.conflicts);
        if !conflicts.contains_key(&conflict.id) {
            return Err(StoreError::new(format!(
                "conflict {} does not exist",
                conflict.id
            )));
        }
        conflicts.insert(conflict.id, conflict.clone());
        Ok(())
    }

    async fn list(&self, filter: ConflictFilter) -> Result<Vec<Conflict>, StoreError> {
        offline_check(&self.offline, "conflict")?;
        let mut matching: Vec<Conflict> = read_guard(&self.conflicts)
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(matching)
    }
}

/// In-memory run store.
///
/// `begin` holds the write lock across the in-progress check and the
/// insert, so "at most one in-progress run" is a real store guarantee
/// rather than a check-then-act race.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<Uuid, SyncRun>>,
}

impl MemoryRunStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn begin(&self, run: &SyncRun) -> Result<BeginRun, StoreError> {
        let mut runs = write_guard(&self.runs);
        if let Some(existing) = runs
            .values()
            .find(|r| r.status == SyncStatus::InProgress)
        {
            return Ok(BeginRun::Refused {
                existing: existing.id,
            });
        }
        runs.insert(run.id, run.clone());
        Ok(BeginRun::Started)
    }

    async fn get(&self, id: Uuid) -> Result<Option<SyncRun>, StoreError> {
        Ok(read_guard(&self.runs).get(&id).cloned())
    }

    async fn update(&self, run: &SyncRun) -> Result<(), StoreError> {
        let mut runs = write_guard(&self.runs);
        if !runs.contains_key(&run.id) {
            return Err(StoreError::new(format!("run {} does not exist", run.id)));
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn find_in_progress(&self) -> Result<Option<SyncRun>, StoreError> {
        Ok(read_guard(&self.runs)
            .values()
            .find(|r| r.status == SyncStatus::InProgress)
            .cloned())
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<SyncRun>, StoreError> {
        let mut runs: Vec<SyncRun> = read_guard(&self.runs)
            .values()
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs.into_iter().skip(offset).take(limit).collect())
    }

    async fn latest(&self) -> Result<Option<SyncRun>, StoreError> {
        Ok(read_guard(&self.runs)
            .values()
            .max_by_key(|r| r.started_at)
            .cloned())
    }
}

/// In-memory village directory.
#[derive(Default)]
pub struct MemoryVillageDirectory {
    villages: RwLock<HashSet<String>>,
}

impl MemoryVillageDirectory {
    /// Create a directory knowing the given villages.
    pub fn with_villages<I, S>(villages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            villages: RwLock::new(villages.into_iter().map(Into::into).collect()),
        }
    }

    /// Register a village.
    pub fn add(&self, village_id: impl Into<String>) {
        write_guard(&self.villages)
            .insert(village_id.into());
    }
}

#[async_trait]
impl VillageDirectory for MemoryVillageDirectory {
    async fn exists(&self, village_id: &str) -> Result<bool, StoreError> {
        Ok(read_guard(&self.villages)
            .contains(village_id))
    }
}
