//! Error types for autoroute.
//!
//! Only the failures that must reach the host are modeled here. Candidate
//! rejection during planning (validator hits, caps mismatches, failed
//! negotiation) is normal control flow and never surfaces as an error.

use thiserror::Error;

/// Errors surfaced to the host.
#[derive(Debug, Error)]
pub enum RouteError {
    /// No catalog provider was configured on the policy.
    #[error("no factory catalog provider configured")]
    MissingCatalog,

    /// An endpoint handle did not resolve, or pointed the wrong way.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// Committing the selected proposals to a live graph failed. The
    /// partial graph has already been torn down.
    #[error("graph rebuild failed: {0}")]
    BuildFailed(String),
}

/// Result type alias for autoroute operations.
pub type RouteResult<T> = Result<T, RouteError>;

impl RouteError {
    /// Create a build failure with a message.
    pub fn build_failed(msg: impl Into<String>) -> Self {
        Self::BuildFailed(msg.into())
    }

    /// Create an unknown-endpoint error with a description of the handle.
    pub fn unknown_endpoint(msg: impl Into<String>) -> Self {
        Self::UnknownEndpoint(msg.into())
    }
}
