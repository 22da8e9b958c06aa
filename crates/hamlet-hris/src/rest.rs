//! REST transport against the HRIS API.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{HrisError, HrisResult};
use crate::traits::{ConnectionProbe, HrisClient};
use crate::types::{ApiEnvelope, Employee, EmployeeFilter};

/// Default per-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default page size for list fetches.
const DEFAULT_PAGE_SIZE: u32 = 100;

/// Configuration for the REST HRIS client.
#[derive(Debug, Clone)]
pub struct RestHrisConfig {
    /// Base URL of the HRIS, without the `/api/v1` prefix.
    pub base_url: String,
    /// Bearer token presented on every request.
    pub bearer_token: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Page size used when the caller does not override it.
    pub page_size: u32,
}

impl Default for RestHrisConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            bearer_token: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// HRIS client over the REST contract:
/// `GET /api/v1/employees`, `GET /api/v1/employees/{id}`,
/// `GET /api/v1/employees/updated?since=…`, `GET /api/v1/health`.
pub struct RestHrisClient {
    config: RestHrisConfig,
    client: Client,
}

impl std::fmt::Debug for RestHrisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestHrisClient")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl RestHrisClient {
    /// Create a new REST client with the given configuration.
    pub fn new(config: RestHrisConfig) -> HrisResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HrisError::network_with_source("failed to build HTTP client", e))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Issue a GET and return the raw response.
    ///
    /// Transport failures and timeouts map to `Network`.
    async fn get(&self, path: &str, query: &[(&str, String)]) -> HrisResult<reqwest::Response> {
        let url = self.url(path);
        debug!(url = %url, "HRIS request");

        self.client
            .get(&url)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.bearer_token),
            )
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HrisError::network_with_source(format!("request timed out: {url}"), e)
                } else {
                    HrisError::network_with_source(format!("request failed: {url}"), e)
                }
            })
    }

    /// Decode a response into the HRIS envelope.
    ///
    /// Non-2xx maps to `Network`; an unparseable body or a `success:
    /// false` envelope maps to `Schema`.
    async fn decode(&self, response: reqwest::Response) -> HrisResult<ApiEnvelope> {
        let status = response.status();
        if !status.is_success() {
            return Err(HrisError::network(format!(
                "HRIS returned {status} for {}",
                response.url()
            )));
        }

        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|e| HrisError::schema(format!("invalid response body: {e}")))?;

        if !envelope.success {
            return Err(HrisError::schema(format!(
                "HRIS reported failure: {}",
                envelope.error.as_deref().unwrap_or("no error message")
            )));
        }

        Ok(envelope)
    }

    fn employees_from(envelope: ApiEnvelope) -> Vec<Employee> {
        envelope.data.unwrap_or_default()
    }
}

#[async_trait]
impl HrisClient for RestHrisClient {
    async fn fetch_all(&self, filter: EmployeeFilter) -> HrisResult<Vec<Employee>> {
        let page_size = filter.page_size.unwrap_or(self.config.page_size);
        let mut page = filter.page.unwrap_or(1);
        let mut employees = Vec::new();

        loop {
            let mut query = vec![
                ("page", page.to_string()),
                ("page_size", page_size.to_string()),
            ];
            if let Some(status) = filter.status {
                query.push(("status", status.as_str().to_string()));
            }

            let response = self.get("/employees", &query).await?;
            let envelope = self.decode(response).await?;
            let pagination = envelope.pagination;
            let batch = Self::employees_from(envelope);
            let batch_len = batch.len();
            employees.extend(batch);

            // An empty page always terminates, even when the pagination
            // block claims more remain, so a misreporting server cannot
            // spin this loop forever.
            if batch_len == 0 {
                break;
            }
            let more = match pagination {
                Some(p) => p.has_more(),
                // No pagination block: a short page means we are done.
                None => batch_len as u32 >= page_size,
            };
            if !more {
                break;
            }
            page += 1;
        }

        debug!(count = employees.len(), "Fetched employees from HRIS");
        Ok(employees)
    }

    async fn fetch_one(&self, employee_id: &str) -> HrisResult<Option<Employee>> {
        let response = self.get(&format!("/employees/{employee_id}"), &[]).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let envelope = self.decode(response).await?;
        Ok(Self::employees_from(envelope).into_iter().next())
    }

    async fn fetch_since(&self, since: DateTime<Utc>) -> HrisResult<Vec<Employee>> {
        let query = [(
            "since",
            since.to_rfc3339_opts(SecondsFormat::Secs, true),
        )];
        let response = self.get("/employees/updated", &query).await?;
        let envelope = self.decode(response).await?;
        Ok(Self::employees_from(envelope))
    }

    async fn test_connection(&self) -> ConnectionProbe {
        match self.get("/health", &[]).await {
            Ok(response) if response.status().is_success() => ConnectionProbe::ok(),
            Ok(response) => {
                warn!(status = %response.status(), "HRIS health probe failed");
                ConnectionProbe::failed(format!("health endpoint returned {}", response.status()))
            }
            Err(e) => {
                warn!(error = %e, "HRIS health probe failed");
                ConnectionProbe::failed(e.to_string())
            }
        }
    }
}
