//! error.rs - Failure taxonomy for seller resolution and aggregation
//!
//! None of these escape the public `resolve` / `load` entry points; they
//! flow between strategies so each failure can be logged and skipped.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// Request failed, timed out, or returned a non-success status.
    #[error("network error: {0}")]
    Network(String),

    /// The endpoint answered with an anti-automation block signal.
    #[error("blocked by anti-automation defenses (status {status})")]
    Blocked { status: u16 },

    /// Response body or page markup did not have the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// No product id or no snapshot to work from.
    #[error("missing data: {0}")]
    MissingData(String),
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        ResolveError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ResolveError {
    fn from(err: serde_json::Error) -> Self {
        ResolveError::Parse(err.to_string())
    }
}

impl ResolveError {
    pub fn is_blocked(&self) -> bool {
        matches!(self, ResolveError::Blocked { .. })
    }
}
