//! Repository Implementation

use crate::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::{debug, info};

/// Stored alert state change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    pub fingerprint: String,
    pub alert_name: String,
    pub status: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub starts_at_ms: i64,
    /// `None` while the alert is still open
    pub ends_at_ms: Option<i64>,
    pub generator_url: String,
    pub received_at_ms: i64,
}

/// Repository for alert history (in-memory implementation)
pub struct AlertRepository {
    /// Alert records, oldest first
    alerts: Mutex<VecDeque<AlertRecord>>,
    /// Max alert records kept
    max_records: usize,
    /// Next record ID
    next_id: Mutex<i64>,
}

impl AlertRepository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        Self::with_retention(100_000)
    }

    /// Create a repository keeping at most `max_records` alerts
    pub fn with_retention(max_records: usize) -> Self {
        info!("Creating in-memory alert repository (retention {})", max_records);
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(max_records.min(10_000))),
            max_records: max_records.max(1),
            next_id: Mutex::new(1),
        }
    }

    /// Insert an alert record, returning its assigned ID
    pub fn insert_alert(&self, mut record: AlertRecord) -> Result<i64, StorageError> {
        let mut alerts = self
            .alerts
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))?;

        let mut id = self
            .next_id
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))?;

        record.id = *id;
        *id += 1;

        // Enforce retention
        while alerts.len() >= self.max_records {
            alerts.pop_front();
        }

        let returned_id = record.id;
        debug!("Inserted alert {} with ID {}", record.fingerprint, returned_id);
        alerts.push_back(record);

        Ok(returned_id)
    }

    /// Get the most recent alert records, newest first
    pub fn get_recent(&self, limit: usize) -> Result<Vec<AlertRecord>, StorageError> {
        let alerts = self
            .alerts
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))?;

        Ok(alerts.iter().rev().take(limit).cloned().collect())
    }

    /// Get the history of one fingerprint, newest first
    pub fn get_by_fingerprint(
        &self,
        fingerprint: &str,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, StorageError> {
        let alerts = self
            .alerts
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))?;

        Ok(alerts
            .iter()
            .rev()
            .filter(|r| r.fingerprint == fingerprint)
            .take(limit)
            .cloned()
            .collect())
    }

    /// Get the latest record of one fingerprint
    pub fn latest(&self, fingerprint: &str) -> Result<AlertRecord, StorageError> {
        self.get_by_fingerprint(fingerprint, 1)?
            .into_iter()
            .next()
            .ok_or(StorageError::NotFound)
    }

    /// Get total alert count
    pub fn alert_count(&self) -> usize {
        self.alerts.lock().map(|a| a.len()).unwrap_or(0)
    }
}

impl Default for AlertRepository {
    fn default() -> Self {
        Self::new()
    }
}
