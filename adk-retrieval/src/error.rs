//! Error types for the `adk-retrieval` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to retrieval collaborators.
///
/// Pipeline stages catch these at their boundary and degrade to a documented
/// fallback; only the collaborator traits and the configuration builder
/// surface them to callers.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStore {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during reranking.
    #[error("Reranker error ({reranker}): {message}")]
    Reranker {
        /// The reranker that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during text generation.
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The text generator that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A collaborator call did not complete within its deadline.
    #[error("Operation '{operation}' timed out after {after:?}")]
    Timeout {
        /// The name of the operation that timed out.
        operation: String,
        /// The deadline that was exceeded.
        after: Duration,
    },

    /// A collaborator returned data the pipeline could not use.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A collaborator refused the request itself, e.g. bad credentials or
    /// invalid input. Repeating the same request cannot succeed.
    #[error("Request rejected by {provider} (HTTP {status}): {message}")]
    Rejected {
        /// The collaborator that rejected the request.
        provider: String,
        /// The HTTP status code returned.
        status: u16,
        /// A description of the failure.
        message: String,
    },
}

impl RetrievalError {
    /// Whether retrying the failed call might succeed.
    ///
    /// Upstream failures and timeouts are transient; malformed responses,
    /// rejected requests and configuration errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Embedding { .. }
                | Self::VectorStore { .. }
                | Self::Reranker { .. }
                | Self::Generation { .. }
                | Self::Timeout { .. }
        )
    }
}

/// Map a non-success HTTP status from `provider` to an error.
///
/// Client errors other than 408 (request timeout) and 429 (rate limited)
/// become [`RetrievalError::Rejected`]; every other status is passed to
/// `upstream`, which produces the adapter's transient error variant.
pub fn http_status_error(
    provider: &str,
    status: u16,
    message: String,
    upstream: fn(String) -> RetrievalError,
) -> RetrievalError {
    if (400..500).contains(&status) && status != 408 && status != 429 {
        RetrievalError::Rejected { provider: provider.to_string(), status, message }
    } else {
        upstream(message)
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;
