//! # FeedError
//!
//! Centralized error type for the feed engine. Maps store, validation and
//! identity failures to the categories the transport layer understands.

use std::time::Duration;

use thiserror::Error;

/// The primary error type for all feed operations.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Malformed request input (bad sort token, page/limit out of range).
    /// Raised before any query runs.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Resource not found (e.g., Community, User)
    #[error("{0} not found with ID {1}")]
    NotFound(&'static str, String),

    /// Missing, malformed or expired credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The request deadline elapsed while the store was still working
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// Infrastructure failure (e.g., DB down, malformed row)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl FeedError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Collapses an adapter error into an opaque internal failure.
    /// The full cause chain is kept in the message for logs only.
    pub fn data_access(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

/// A specialized Result type for feed logic.
pub type Result<T> = std::result::Result<T, FeedError>;
