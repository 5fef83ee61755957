//! Storage Layer
//!
//! Append-mostly alert history with retention, behind a repository.

mod repository;

pub use repository::{AlertRecord, AlertRepository};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
}
