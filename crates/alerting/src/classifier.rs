//! Rule-Based Label Classifier
//!
//! Used when no model-backed classifier is configured. Severity comes from the
//! alert's `severity` label; recommendations from its annotations.

use crate::collaborators::ClassificationService;
use crate::error::ClassificationError;
use crate::model::{Alert, AlertStatus, ClassificationResult, Severity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Label classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelClassifierConfig {
    /// Label holding the declared severity
    pub severity_label: String,
    /// Confidence when the label is present and recognised (default: 0.9)
    pub labelled_confidence: f64,
    /// Severity assumed when the label is missing or unknown
    pub fallback_severity: Severity,
    /// Confidence for the fallback severity (default: 0.5)
    pub fallback_confidence: f64,
}

impl Default for LabelClassifierConfig {
    fn default() -> Self {
        Self {
            severity_label: "severity".to_string(),
            labelled_confidence: 0.9,
            fallback_severity: Severity::Warning,
            fallback_confidence: 0.5,
        }
    }
}

/// Heuristic classifier over alert labels
#[derive(Debug, Clone, Default)]
pub struct LabelClassifier {
    config: LabelClassifierConfig,
}

impl LabelClassifier {
    pub fn new(config: LabelClassifierConfig) -> Self {
        Self { config }
    }

    fn recommendations(alert: &Alert, severity: Severity) -> Vec<String> {
        let mut recommendations = Vec::new();
        if let Some(runbook) = alert.annotation("runbook_url") {
            recommendations.push(format!("Follow runbook: {}", runbook));
        }
        match (alert.status, severity) {
            (AlertStatus::Resolved, _) => {
                recommendations.push("Confirm recovery and close the incident".to_string())
            }
            (AlertStatus::Firing, Severity::Critical) => {
                recommendations.push("Page the on-call responder".to_string())
            }
            (AlertStatus::Firing, Severity::Warning) => {
                recommendations.push("Review during working hours".to_string())
            }
            (AlertStatus::Firing, Severity::Info) => {}
        }
        recommendations
    }
}

#[async_trait]
impl ClassificationService for LabelClassifier {
    async fn classify(&self, alert: &Alert) -> Result<ClassificationResult, ClassificationError> {
        let declared = alert
            .label(&self.config.severity_label)
            .map(|value| (value, value.parse::<Severity>()));

        let (severity, confidence, reasoning) = match declared {
            Some((_, Ok(severity))) => (
                severity,
                self.config.labelled_confidence,
                format!("Declared by '{}' label", self.config.severity_label),
            ),
            Some((value, Err(_))) => (
                self.config.fallback_severity,
                self.config.fallback_confidence,
                format!("Unrecognised severity '{}'; using fallback", value),
            ),
            None => (
                self.config.fallback_severity,
                self.config.fallback_confidence,
                "No severity label; using fallback".to_string(),
            ),
        };

        debug!(
            "Classified {} as {} ({:.2})",
            alert.fingerprint, severity, confidence
        );

        Ok(ClassificationResult::new(
            severity,
            confidence,
            reasoning,
            Self::recommendations(alert, severity),
        ))
    }
}
