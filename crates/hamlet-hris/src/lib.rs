//! # HRIS Client Framework
//!
//! Data acquisition layer for hamlet employee sync.
//!
//! This crate defines the uniform fetch contract against the external
//! Human Resources Information System and two transports:
//!
//! - [`RestHrisClient`] — the production transport against the HRIS REST
//!   API (bearer-authenticated, bounded request timeout, paged fetch).
//! - [`FixtureHrisClient`] — an in-memory source for tests and previews.
//!
//! All fetch methods are read-only and safe to retry from the caller's
//! perspective; the client performs no local mutation.
//!
//! ## Example
//!
//! ```ignore
//! use hamlet_hris::{HrisClient, RestHrisClient, RestHrisConfig};
//!
//! let client = RestHrisClient::new(RestHrisConfig {
//!     base_url: "https://hris.example.com".into(),
//!     bearer_token: token,
//!     ..RestHrisConfig::default()
//! })?;
//!
//! let employees = client.fetch_all(Default::default()).await?;
//! ```

pub mod error;
pub mod fixture;
pub mod rest;
pub mod traits;
pub mod types;

pub use error::{HrisError, HrisResult};
pub use fixture::FixtureHrisClient;
pub use rest::{RestHrisClient, RestHrisConfig};
pub use traits::{ConnectionProbe, HrisClient};
pub use types::{Employee, EmployeeFilter, EmployeeStatus};
