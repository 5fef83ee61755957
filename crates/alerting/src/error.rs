//! Pipeline Error Types

use std::time::Duration;
use thiserror::Error;

/// Errors parsing a single raw alert event
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Status other than firing/resolved
    #[error("Invalid alert status: {0:?}")]
    InvalidStatus(String),

    /// Timestamp not in RFC 3339 form
    #[error("Invalid {field} timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// Batch-level failures; no partial counts are meaningful
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
}

/// Classifier call failures
#[derive(Debug, Clone, Error)]
pub enum ClassificationError {
    #[error("Classification failed: {0}")]
    Failed(String),
    #[error("Classification timeout after {0}ms")]
    Timeout(u64),
}

/// Delivery failures for one target
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("Target rejected alert ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Publish timeout after {0:?}")]
    Timeout(Duration),
    #[error("No sink configured for target kind {0}")]
    NotConfigured(String),
}
