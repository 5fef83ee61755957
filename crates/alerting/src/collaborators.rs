//! Collaborator Interfaces
//!
//! Narrow async boundaries to storage, classification, filtering, publishing
//! and the target registry. Optional collaborators are injected through
//! [`Capabilities`]; the pipeline branches on their presence.

use crate::error::ClassificationError;
use crate::model::{Alert, ClassificationResult, EnrichedAlert, FilterDecision, PublishOutcome, Target};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use storage::{AlertRecord, AlertRepository, StorageError};

/// Write-only alert history
#[async_trait]
pub trait AlertStorage: Send + Sync {
    async fn append_alert(&self, alert: &Alert) -> Result<(), StorageError>;
}

/// Severity classifier
#[async_trait]
pub trait ClassificationService: Send + Sync {
    async fn classify(&self, alert: &Alert) -> Result<ClassificationResult, ClassificationError>;
}

/// Publish gate used in enriched mode
#[async_trait]
pub trait FilterEngine: Send + Sync {
    async fn should_publish(&self, alert: &EnrichedAlert) -> FilterDecision;

    /// Called once for every allowed alert with whether any target accepted it
    async fn record_delivery(&self, _alert: &EnrichedAlert, _delivered: bool) {}
}

/// Delivers one alert to a set of targets
#[async_trait]
pub trait AlertPublisher: Send + Sync {
    /// Publish to every target, returning one outcome per target
    async fn publish_to_targets(
        &self,
        alert: &EnrichedAlert,
        targets: &[Target],
        delay: Option<Duration>,
    ) -> Vec<PublishOutcome>;
}

/// Source of configured targets
#[async_trait]
pub trait TargetRegistry: Send + Sync {
    async fn active_targets(&self) -> Vec<Target>;
    async fn is_metrics_only_mode(&self) -> bool;
}

/// Optional collaborators available to the pipeline
#[derive(Clone, Default)]
pub struct Capabilities {
    pub classifier: Option<Arc<dyn ClassificationService>>,
    pub filter: Option<Arc<dyn FilterEngine>>,
    pub publisher: Option<Arc<dyn AlertPublisher>>,
    pub targets: Option<Arc<dyn TargetRegistry>>,
}

impl Capabilities {
    /// No optional collaborators
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ClassificationService>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn FilterEngine>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn AlertPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_targets(mut self, targets: Arc<dyn TargetRegistry>) -> Self {
        self.targets = Some(targets);
        self
    }
}

impl From<&Alert> for AlertRecord {
    fn from(alert: &Alert) -> Self {
        AlertRecord {
            id: 0,
            fingerprint: alert.fingerprint.clone(),
            alert_name: alert.alert_name.clone(),
            status: alert.status.as_str().to_string(),
            labels: alert.labels.clone(),
            annotations: alert.annotations.clone(),
            starts_at_ms: alert.starts_at.timestamp_millis(),
            ends_at_ms: alert.ends_at.map(|t| t.timestamp_millis()),
            generator_url: alert.generator_url.clone(),
            received_at_ms: alert.received_at.timestamp_millis(),
        }
    }
}

#[async_trait]
impl AlertStorage for AlertRepository {
    async fn append_alert(&self, alert: &Alert) -> Result<(), StorageError> {
        self.insert_alert(AlertRecord::from(alert)).map(|_| ())
    }
}
