//! HRIS client error types.

use thiserror::Error;

/// Errors that can occur when talking to the HRIS.
#[derive(Debug, Error)]
pub enum HrisError {
    /// Transport failure: unreachable host, request timeout, or a
    /// non-2xx response. Retryable by the caller; never retried here.
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The response body does not validate against the expected
    /// employee shape.
    #[error("schema error: {message}")]
    Schema { message: String },
}

impl HrisError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with an underlying cause.
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Check if this error is transient and the call may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, HrisError::Network { .. })
    }
}

/// Result type for HRIS client operations.
pub type HrisResult<T> = Result<T, HrisError>;
