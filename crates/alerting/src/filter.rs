//! Threshold Filter Engine
//!
//! Confidence and severity gating with per-fingerprint duplicate suppression
//! and an hourly publish throttle. Cooldowns and the throttle window live in
//! the coordinator, so they hold across every instance sharing its cache.
//! A cooldown is given back when no target accepted the alert.

use crate::collaborators::FilterEngine;
use crate::model::{AlertStatus, EnrichedAlert, FilterDecision, Severity};
use async_trait::async_trait;
use coordination::{operation_key, StatelessCoordinator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Confidence threshold for publishing (default: 0.75)
    pub confidence_threshold: f64,
    /// Confidence above which non-critical alerts publish without delay (default: 0.90)
    pub critical_threshold: f64,
    /// Lowest severity published for firing alerts
    pub min_severity: Severity,
    /// Cooldown period between duplicate publishes (seconds)
    pub cooldown_seconds: u64,
    /// Delay hint for non-critical alerts below the critical threshold (seconds)
    pub low_priority_delay_seconds: u64,
    /// Whether alerts without a classification may be published
    pub allow_unclassified: bool,
    /// Maximum firing alerts delivered per hour before throttling (0 disables)
    pub max_publishes_per_hour: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.75,
            critical_threshold: 0.90,
            min_severity: Severity::Warning,
            cooldown_seconds: 1800, // 30 minutes
            low_priority_delay_seconds: 300,
            allow_unclassified: true,
            max_publishes_per_hour: 10,
        }
    }
}

impl FilterConfig {
    /// Create strict config (only confident critical alerts)
    pub fn strict() -> Self {
        Self {
            confidence_threshold: 0.85,
            min_severity: Severity::Critical,
            allow_unclassified: false,
            ..Default::default()
        }
    }

    /// Create lenient config (everything classified, short cooldown)
    pub fn lenient() -> Self {
        Self {
            confidence_threshold: 0.0,
            min_severity: Severity::Info,
            cooldown_seconds: 60,
            max_publishes_per_hour: 0,
            ..Default::default()
        }
    }
}

/// Counter holding delivered firing alerts for the current hour
const THROTTLE_COUNTER: &str = "publish-throttle";
const THROTTLE_WINDOW: Duration = Duration::from_secs(3600);

/// Filter engine for gating and deduplication
pub struct ThresholdFilter {
    config: FilterConfig,
    coordinator: Arc<StatelessCoordinator>,
}

impl ThresholdFilter {
    /// Create a new threshold filter
    pub fn new(config: FilterConfig, coordinator: Arc<StatelessCoordinator>) -> Self {
        info!("Creating threshold filter with config: {:?}", config);
        Self {
            config,
            coordinator,
        }
    }

    /// Check confidence and severity gates, ignoring cooldown
    fn passes_thresholds(&self, alert: &EnrichedAlert) -> bool {
        let fingerprint = &alert.alert().fingerprint;
        let Some(classification) = alert.classification() else {
            if !self.config.allow_unclassified {
                debug!("Alert {} suppressed: unclassified", fingerprint);
            }
            return self.config.allow_unclassified;
        };

        // Resolutions close incidents that were already published
        if alert.alert().status == AlertStatus::Resolved {
            return true;
        }

        if classification.confidence < self.config.confidence_threshold {
            debug!(
                "Alert {} suppressed: confidence {} < threshold {}",
                fingerprint, classification.confidence, self.config.confidence_threshold
            );
            return false;
        }

        if classification.severity < self.config.min_severity {
            debug!(
                "Alert {} suppressed: severity {} below {}",
                fingerprint, classification.severity, self.config.min_severity
            );
            return false;
        }

        true
    }

    fn cooldown_key(alert: &EnrichedAlert) -> String {
        let inner = alert.alert();
        operation_key(
            "publish-cooldown",
            [inner.fingerprint.as_str(), inner.status.as_str()],
        )
    }

    /// Firing alerts delivered in the current throttle window
    pub async fn publishes_this_hour(&self) -> u64 {
        self.coordinator.counter_value(THROTTLE_COUNTER).await
    }

    async fn throttled(&self, alert: &EnrichedAlert) -> bool {
        let max = self.config.max_publishes_per_hour;
        if max == 0 || alert.alert().status != AlertStatus::Firing {
            return false;
        }
        let sent = self.publishes_this_hour().await;
        if sent >= max {
            debug!(
                "Alert {} throttled: {} publishes this hour (max {})",
                alert.alert().fingerprint, sent, max
            );
            return true;
        }
        false
    }

    fn delay_hint(&self, alert: &EnrichedAlert) -> Option<Duration> {
        let classification = alert.classification()?;
        let low_priority = alert.alert().status == AlertStatus::Firing
            && classification.severity < Severity::Critical
            && classification.confidence < self.config.critical_threshold;
        (low_priority && self.config.low_priority_delay_seconds > 0)
            .then(|| Duration::from_secs(self.config.low_priority_delay_seconds))
    }
}

#[async_trait]
impl FilterEngine for ThresholdFilter {
    async fn should_publish(&self, alert: &EnrichedAlert) -> FilterDecision {
        if !self.passes_thresholds(alert) {
            return FilterDecision::deny();
        }

        if self.throttled(alert).await {
            return FilterDecision::deny();
        }

        // Check cooldown
        let cooldown = Duration::from_secs(self.config.cooldown_seconds);
        let claim = self
            .coordinator
            .ensure_idempotent_operation(&Self::cooldown_key(alert), cooldown)
            .await;
        if !claim.may_proceed {
            debug!(
                "Alert {} suppressed: in cooldown period",
                alert.alert().fingerprint
            );
            return FilterDecision::deny();
        }

        match self.delay_hint(alert) {
            Some(delay) => FilterDecision::allow_after(delay),
            None => FilterDecision::allow(),
        }
    }

    async fn record_delivery(&self, alert: &EnrichedAlert, delivered: bool) {
        if delivered {
            if alert.alert().status == AlertStatus::Firing && self.config.max_publishes_per_hour > 0 {
                self.coordinator
                    .increment_counter(THROTTLE_COUNTER, THROTTLE_WINDOW)
                    .await;
            }
            return;
        }
        if self
            .coordinator
            .release_operation(&Self::cooldown_key(alert))
            .await
        {
            debug!(
                "Alert {} undelivered; cooldown released",
                alert.alert().fingerprint
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Alert, ClassificationResult};
    use chrono::Utc;
    use coordination::{CoordinatorConfig, MemoryCache, SharedCache};
    use std::collections::HashMap;

    fn coordinator() -> Arc<StatelessCoordinator> {
        let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new());
        Arc::new(StatelessCoordinator::with_instance_id(
            "test",
            Some(cache),
            CoordinatorConfig::default(),
        ))
    }

    fn enriched(
        fingerprint: &str,
        status: AlertStatus,
        classification: Option<(Severity, f64)>,
    ) -> EnrichedAlert {
        let alert = Alert {
            fingerprint: fingerprint.to_string(),
            alert_name: "Test".to_string(),
            status,
            labels: HashMap::new(),
            annotations: HashMap::new(),
            starts_at: Utc::now(),
            ends_at: None,
            generator_url: String::new(),
            received_at: Utc::now(),
        };
        EnrichedAlert::new(
            alert,
            classification.map(|(s, c)| ClassificationResult::new(s, c, "test", vec![])),
        )
    }

    #[tokio::test]
    async fn test_confidence_threshold() {
        let filter = ThresholdFilter::new(FilterConfig::default(), coordinator());

        // Low confidence should not publish
        let low = enriched("a", AlertStatus::Firing, Some((Severity::Critical, 0.5)));
        assert!(!filter.should_publish(&low).await.allow);

        // High confidence should publish
        let high = enriched("b", AlertStatus::Firing, Some((Severity::Critical, 0.95)));
        assert_eq!(filter.should_publish(&high).await, FilterDecision::allow());
    }

    #[tokio::test]
    async fn test_severity_floor() {
        let filter = ThresholdFilter::new(FilterConfig::default(), coordinator());
        let info = enriched("a", AlertStatus::Firing, Some((Severity::Info, 0.99)));
        assert!(!filter.should_publish(&info).await.allow);
    }

    #[tokio::test]
    async fn test_deduplication() {
        let filter = ThresholdFilter::new(FilterConfig::default(), coordinator());
        let alert = enriched("dup", AlertStatus::Firing, Some((Severity::Critical, 0.95)));

        // First alert should publish
        assert!(filter.should_publish(&alert).await.allow);

        // Immediate duplicate should not publish
        assert!(!filter.should_publish(&alert).await.allow);

        // Resolution of the same fingerprint is a distinct event
        let resolved = enriched("dup", AlertStatus::Resolved, Some((Severity::Critical, 0.95)));
        assert!(filter.should_publish(&resolved).await.allow);
    }

    #[tokio::test]
    async fn test_cooldown_shared_between_filters() {
        let shared = coordinator();
        let a = ThresholdFilter::new(FilterConfig::default(), Arc::clone(&shared));
        let b = ThresholdFilter::new(FilterConfig::default(), shared);
        let alert = enriched("x", AlertStatus::Firing, Some((Severity::Critical, 0.95)));

        assert!(a.should_publish(&alert).await.allow);
        assert!(!b.should_publish(&alert).await.allow);
    }

    #[tokio::test]
    async fn test_undelivered_alert_releases_cooldown() {
        let filter = ThresholdFilter::new(FilterConfig::default(), coordinator());
        let alert = enriched("retry", AlertStatus::Firing, Some((Severity::Critical, 0.95)));

        assert!(filter.should_publish(&alert).await.allow);
        filter.record_delivery(&alert, false).await;

        // Nothing reached a target, so the resend is not a duplicate
        assert!(filter.should_publish(&alert).await.allow);
        filter.record_delivery(&alert, true).await;
        assert!(!filter.should_publish(&alert).await.allow);
    }

    #[tokio::test]
    async fn test_hourly_throttle() {
        let config = FilterConfig {
            max_publishes_per_hour: 2,
            ..Default::default()
        };
        let shared = coordinator();
        let a = ThresholdFilter::new(config.clone(), Arc::clone(&shared));
        let b = ThresholdFilter::new(config, shared);

        for fingerprint in ["t1", "t2"] {
            let alert = enriched(fingerprint, AlertStatus::Firing, Some((Severity::Critical, 0.95)));
            assert!(a.should_publish(&alert).await.allow);
            a.record_delivery(&alert, true).await;
        }
        assert_eq!(b.publishes_this_hour().await, 2);

        // The window is shared, so the other filter is throttled too
        let third = enriched("t3", AlertStatus::Firing, Some((Severity::Critical, 0.95)));
        assert!(!b.should_publish(&third).await.allow);

        // Resolutions still go out
        let resolved = enriched("t1", AlertStatus::Resolved, Some((Severity::Critical, 0.95)));
        assert!(b.should_publish(&resolved).await.allow);
    }

    #[tokio::test]
    async fn test_undelivered_alerts_do_not_count_toward_throttle() {
        let config = FilterConfig {
            max_publishes_per_hour: 1,
            ..Default::default()
        };
        let filter = ThresholdFilter::new(config, coordinator());
        let first = enriched("f1", AlertStatus::Firing, Some((Severity::Critical, 0.95)));
        let second = enriched("f2", AlertStatus::Firing, Some((Severity::Critical, 0.95)));

        assert!(filter.should_publish(&first).await.allow);
        filter.record_delivery(&first, false).await;
        assert!(filter.should_publish(&second).await.allow);
        assert_eq!(filter.publishes_this_hour().await, 0);
    }

    #[tokio::test]
    async fn test_delay_hint_for_low_priority() {
        let filter = ThresholdFilter::new(FilterConfig::default(), coordinator());
        let warning = enriched("w", AlertStatus::Firing, Some((Severity::Warning, 0.8)));
        assert_eq!(
            filter.should_publish(&warning).await,
            FilterDecision::allow_after(Duration::from_secs(300))
        );
    }

    #[tokio::test]
    async fn test_unclassified_policy() {
        let lenient = ThresholdFilter::new(FilterConfig::default(), coordinator());
        let strict = ThresholdFilter::new(FilterConfig::strict(), coordinator());
        let alert = enriched("u", AlertStatus::Firing, None);

        assert!(lenient.should_publish(&alert).await.allow);
        assert!(!strict.should_publish(&alert).await.allow);
    }
}
