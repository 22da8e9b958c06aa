//! The uniform fetch contract for HRIS transports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::HrisResult;
use crate::types::{Employee, EmployeeFilter};

/// Result of a liveness probe against the HRIS.
#[derive(Debug, Clone)]
pub struct ConnectionProbe {
    /// Whether the HRIS answered the probe.
    pub success: bool,
    /// Failure description when `success` is false.
    pub error: Option<String>,
}

impl ConnectionProbe {
    /// A successful probe.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// A failed probe.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Uniform fetch contract against the HRIS, regardless of transport.
///
/// All methods are read-only: the client performs no local mutation, so
/// every fetch is safe to retry from the caller's perspective.
#[async_trait]
pub trait HrisClient: Send + Sync {
    /// Fetch all employees matching the filter, following pagination to
    /// exhaustion before returning.
    async fn fetch_all(&self, filter: EmployeeFilter) -> HrisResult<Vec<Employee>>;

    /// Fetch a single employee by its stable external key.
    ///
    /// Returns `Ok(None)` when the HRIS does not know the employee;
    /// "not found" is not an error.
    async fn fetch_one(&self, employee_id: &str) -> HrisResult<Option<Employee>>;

    /// Fetch employees changed at or after `since`.
    ///
    /// Used only for incremental sync runs.
    async fn fetch_since(&self, since: DateTime<Utc>) -> HrisResult<Vec<Employee>>;

    /// Probe the HRIS for liveness.
    ///
    /// Never errors; transport failures are reported in the probe result.
    async fn test_connection(&self) -> ConnectionProbe;
}
