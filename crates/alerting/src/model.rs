//! Alert Domain Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Alert state reported by the notifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Firing => "firing",
            Self::Resolved => "resolved",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firing" => Ok(Self::Firing),
            "resolved" => Ok(Self::Resolved),
            other => Err(other.to_string()),
        }
    }
}

/// Classified severity, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        })
    }
}

impl FromStr for Severity {
    type Err = String;

    /// Accepts the common severity label spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" | "informational" | "low" | "none" | "debug" => Ok(Self::Info),
            "warning" | "warn" | "medium" | "minor" => Ok(Self::Warning),
            "critical" | "high" | "error" | "major" | "fatal" | "page" => Ok(Self::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Canonical parsed alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Stable identity of the underlying condition, never empty
    pub fingerprint: String,
    pub alert_name: String,
    pub status: AlertStatus,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub starts_at: DateTime<Utc>,
    /// `None` while the alert is still open
    pub ends_at: Option<DateTime<Utc>>,
    pub generator_url: String,
    pub received_at: DateTime<Utc>,
}

impl Alert {
    pub fn is_open(&self) -> bool {
        self.ends_at.is_none()
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    pub fn annotation(&self, name: &str) -> Option<&str> {
        self.annotations.get(name).map(String::as_str)
    }
}

/// Classifier verdict for one alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub severity: Severity,
    /// Always within [0, 1]
    pub confidence: f64,
    pub reasoning: String,
    pub recommendations: Vec<String>,
}

impl ClassificationResult {
    pub fn new(
        severity: Severity,
        confidence: f64,
        reasoning: impl Into<String>,
        recommendations: Vec<String>,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            severity,
            confidence,
            reasoning: reasoning.into(),
            recommendations,
        }
    }
}

/// Alert plus its optional classification.
///
/// Built once per alert per request and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedAlert {
    alert: Alert,
    classification: Option<ClassificationResult>,
}

impl EnrichedAlert {
    pub fn new(alert: Alert, classification: Option<ClassificationResult>) -> Self {
        Self {
            alert,
            classification,
        }
    }

    pub fn alert(&self) -> &Alert {
        &self.alert
    }

    pub fn classification(&self) -> Option<&ClassificationResult> {
        self.classification.as_ref()
    }

    pub fn severity(&self) -> Option<Severity> {
        self.classification.as_ref().map(|c| c.severity)
    }
}

/// Kind of downstream incident-management endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Rootly,
    PagerDuty,
    Slack,
    Webhook,
}

/// Configured publishing target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub kind: TargetKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Target {
    pub fn new(id: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: true,
        }
    }
}

/// Result of publishing one alert to one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub target_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PublishOutcome {
    pub fn succeeded(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(target_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Filter verdict for one enriched alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterDecision {
    pub allow: bool,
    /// Suggested publish delay, honoured by the publisher
    pub delay: Option<Duration>,
}

impl FilterDecision {
    pub fn allow() -> Self {
        Self {
            allow: true,
            delay: None,
        }
    }

    pub fn allow_after(delay: Duration) -> Self {
        Self {
            allow: true,
            delay: Some(delay),
        }
    }

    pub fn deny() -> Self {
        Self {
            allow: false,
            delay: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering_and_aliases() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
        assert_eq!("High".parse::<Severity>(), Ok(Severity::Critical));
        assert_eq!("warn".parse::<Severity>(), Ok(Severity::Warning));
        assert!("bogus".parse::<Severity>().is_err());
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(ClassificationResult::new(Severity::Info, 1.7, "", vec![]).confidence, 1.0);
        assert_eq!(ClassificationResult::new(Severity::Info, -0.2, "", vec![]).confidence, 0.0);
        assert_eq!(ClassificationResult::new(Severity::Info, f64::NAN, "", vec![]).confidence, 0.0);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("FIRING".parse::<AlertStatus>(), Ok(AlertStatus::Firing));
        assert_eq!("resolved".parse::<AlertStatus>(), Ok(AlertStatus::Resolved));
        assert!("pending".parse::<AlertStatus>().is_err());
    }
}
