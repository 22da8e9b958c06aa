//! Fixture transport for tests and previews.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::error::{HrisError, HrisResult};
use crate::traits::{ConnectionProbe, HrisClient};
use crate::types::{Employee, EmployeeFilter};

/// An in-memory HRIS source with a canned employee set.
///
/// Each employee carries a change timestamp so incremental fetches
/// behave like the real `updated?since=…` endpoint. Flipping the client
/// offline makes every fetch fail with a `Network` error, which is how
/// tests exercise fatal-fetch and partial-failure paths.
pub struct FixtureHrisClient {
    records: RwLock<Vec<FixtureRecord>>,
    online: AtomicBool,
}

struct FixtureRecord {
    employee: Employee,
    changed_at: DateTime<Utc>,
}

impl FixtureHrisClient {
    /// Create a fixture with the given employees, all marked changed now.
    #[must_use]
    pub fn new(employees: Vec<Employee>) -> Self {
        let now = Utc::now();
        Self {
            records: RwLock::new(
                employees
                    .into_iter()
                    .map(|employee| FixtureRecord {
                        employee,
                        changed_at: now,
                    })
                    .collect(),
            ),
            online: AtomicBool::new(true),
        }
    }

    /// Create an empty fixture.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Add or replace an employee, stamping it changed at `changed_at`.
    pub fn upsert(&self, employee: Employee, changed_at: DateTime<Utc>) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = records
            .iter_mut()
            .find(|r| r.employee.employee_id == employee.employee_id)
        {
            record.employee = employee;
            record.changed_at = changed_at;
        } else {
            records.push(FixtureRecord {
                employee,
                changed_at,
            });
        }
    }

    /// Take the fixture offline or back online.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn check_online(&self) -> HrisResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(HrisError::network("fixture HRIS is offline"))
        }
    }
}

#[async_trait]
impl HrisClient for FixtureHrisClient {
    async fn fetch_all(&self, filter: EmployeeFilter) -> HrisResult<Vec<Employee>> {
        self.check_online()?;
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .iter()
            .filter(|r| filter.status.is_none_or(|s| r.employee.status == s))
            .map(|r| r.employee.clone())
            .collect())
    }

    async fn fetch_one(&self, employee_id: &str) -> HrisResult<Option<Employee>> {
        self.check_online()?;
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .iter()
            .find(|r| r.employee.employee_id == employee_id)
            .map(|r| r.employee.clone()))
    }

    async fn fetch_since(&self, since: DateTime<Utc>) -> HrisResult<Vec<Employee>> {
        self.check_online()?;
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .iter()
            .filter(|r| r.changed_at >= since)
            .map(|r| r.employee.clone())
            .collect())
    }

    async fn test_connection(&self) -> ConnectionProbe {
        match self.check_online() {
            Ok(()) => ConnectionProbe::ok(),
            Err(e) => ConnectionProbe::failed(e.to_string()),
        }
    }
}
