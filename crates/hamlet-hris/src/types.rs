//! Employee records and the HRIS REST response envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Employment status as reported by the HRIS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeStatus {
    /// Currently employed.
    Active,
    /// On leave or otherwise inactive.
    Inactive,
    /// No longer employed.
    Departed,
}

impl EmployeeStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeStatus::Active => "active",
            EmployeeStatus::Inactive => "inactive",
            EmployeeStatus::Departed => "departed",
        }
    }
}

impl fmt::Display for EmployeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EmployeeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(EmployeeStatus::Active),
            "inactive" => Ok(EmployeeStatus::Inactive),
            "departed" => Ok(EmployeeStatus::Departed),
            _ => Err(format!("Unknown employee status: {s}")),
        }
    }
}

/// An employee record as fetched from the HRIS.
///
/// Immutable snapshot per fetch; it has no local identity until it has
/// been reconciled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    /// Stable external key in the HRIS.
    pub employee_id: String,
    /// Work email address.
    pub email: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Preferred display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Department name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Assigned village, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub village_id: Option<String>,
    /// Role within the organization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Employment status.
    pub status: EmployeeStatus,
    /// Employment start date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// Employment end date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Effective date of a village transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_date: Option<DateTime<Utc>>,
    /// Village the employee transferred out of.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_village_id: Option<String>,
}

impl Employee {
    /// Display name, falling back to "First Last".
    #[must_use]
    pub fn effective_display_name(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.first_name, self.last_name))
    }
}

/// Filter for full/paged employee fetches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmployeeFilter {
    /// Restrict to a single employment status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EmployeeStatus>,
    /// Page to start from (1-based). Defaults to the first page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Page size override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl EmployeeFilter {
    /// Filter for active employees only.
    #[must_use]
    pub fn active() -> Self {
        Self {
            status: Some(EmployeeStatus::Active),
            ..Self::default()
        }
    }
}

/// Pagination block of the HRIS response envelope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    /// Current page (1-based).
    pub page: u32,
    /// Records per page.
    pub page_size: u32,
    /// Total records across all pages.
    pub total: u64,
}

impl Pagination {
    /// Check whether pages remain after this one.
    #[must_use]
    pub fn has_more(&self) -> bool {
        u64::from(self.page) * u64::from(self.page_size) < self.total
    }
}

/// Response envelope returned by every HRIS endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    /// Whether the HRIS considers the call successful.
    pub success: bool,
    /// Employee payload.
    #[serde(default)]
    pub data: Option<Vec<Employee>>,
    /// Error message when `success` is false.
    #[serde(default)]
    pub error: Option<String>,
    /// Pagination info for list endpoints.
    #[serde(default)]
    pub pagination: Option<Pagination>,
}
