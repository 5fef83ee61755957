//! Alert Ingestion Pipeline
//!
//! Converts a notifier batch into classified, filtered, multi-target
//! published outcomes. Each alert runs parse → classify → filter → publish in
//! order; a failure in one alert never aborts its siblings.

use crate::collaborators::{AlertStorage, Capabilities};
use crate::error::ClassificationError;
use crate::model::{Alert, ClassificationResult, EnrichedAlert, PublishOutcome, Severity, Target};
use crate::webhook::{parse_alert, WebhookPayload};
use chrono::Utc;
use enrichment::{EnrichmentMode, EnrichmentModeResolver, ModeState};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-alert classification entry in a batch response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassificationSummary {
    Classified {
        severity: Severity,
        confidence: f64,
        reasoning: String,
        recommendations: Vec<String>,
    },
    Failed {
        error: String,
    },
}

impl From<&ClassificationResult> for ClassificationSummary {
    fn from(result: &ClassificationResult) -> Self {
        Self::Classified {
            severity: result.severity,
            confidence: result.confidence,
            reasoning: result.reasoning.clone(),
            recommendations: result.recommendations.clone(),
        }
    }
}

/// Per-alert publishing entry in a batch response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishSummary {
    pub targets: usize,
    pub successful: usize,
    pub failed: usize,
    pub outcomes: Vec<PublishOutcome>,
}

impl PublishSummary {
    pub fn from_outcomes(outcomes: Vec<PublishOutcome>) -> Self {
        let successful = outcomes.iter().filter(|o| o.success).count();
        Self {
            targets: outcomes.len(),
            successful,
            failed: outcomes.len() - successful,
            outcomes,
        }
    }

    /// At least one target accepted the alert
    pub fn delivered(&self) -> bool {
        self.successful > 0
    }
}

/// Aggregated result of one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub processed_count: usize,
    pub published_count: usize,
    pub filtered_count: usize,
    pub classification_results: BTreeMap<String, ClassificationSummary>,
    pub publishing_results: BTreeMap<String, PublishSummary>,
    pub metrics_only_mode: bool,
    /// `None` under the legacy contract
    pub enrichment_mode: Option<ModeState>,
    pub processing_duration_ms: u64,
}

impl BatchResponse {
    fn empty(metrics_only_mode: bool, enrichment_mode: Option<ModeState>) -> Self {
        Self {
            processed_count: 0,
            published_count: 0,
            filtered_count: 0,
            classification_results: BTreeMap::new(),
            publishing_results: BTreeMap::new(),
            metrics_only_mode,
            enrichment_mode,
            processing_duration_ms: 0,
        }
    }
}

/// What happened to one alert
#[derive(Debug, Default)]
struct AlertReport {
    classification: Option<ClassificationSummary>,
    publishing: Option<PublishSummary>,
    filtered: bool,
}

enum Eligibility {
    Skip,
    Denied,
    /// `gated` is set when the filter engine allowed the alert
    Publish { delay: Option<Duration>, gated: bool },
}

/// Short random token distinguishing placeholder fingerprints per request
fn request_nonce() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// Batch orchestrator over the injected collaborators
pub struct AlertIngestionPipeline {
    storage: Arc<dyn AlertStorage>,
    capabilities: Capabilities,
    modes: Arc<EnrichmentModeResolver>,
    classify_timeout: Duration,
}

/// Classifier calls running longer than this are reported as failed
pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(5);

impl AlertIngestionPipeline {
    /// Create a pipeline. Storage is mandatory; everything else is optional.
    pub fn new(
        storage: Arc<dyn AlertStorage>,
        capabilities: Capabilities,
        modes: Arc<EnrichmentModeResolver>,
    ) -> Self {
        info!(
            "Creating ingestion pipeline (classifier: {}, filter: {}, publisher: {}, targets: {})",
            capabilities.classifier.is_some(),
            capabilities.filter.is_some(),
            capabilities.publisher.is_some(),
            capabilities.targets.is_some()
        );
        Self {
            storage,
            capabilities,
            modes,
            classify_timeout: DEFAULT_CLASSIFY_TIMEOUT,
        }
    }

    /// Bound each classifier call
    pub fn with_classify_timeout(mut self, timeout: Duration) -> Self {
        self.classify_timeout = timeout;
        self
    }

    /// Enrichment mode resolver shared with the mode endpoints
    pub fn modes(&self) -> &Arc<EnrichmentModeResolver> {
        &self.modes
    }

    /// Process a batch through the legacy or intelligent contract.
    ///
    /// Legacy handling applies when there is no classifier and no active target.
    pub async fn process(
        &self,
        payload: WebhookPayload,
        explicit_mode: Option<EnrichmentMode>,
    ) -> BatchResponse {
        if self.uses_legacy_contract().await {
            self.process_legacy(payload).await
        } else {
            self.process_intelligent(payload, explicit_mode).await
        }
    }

    async fn uses_legacy_contract(&self) -> bool {
        if self.capabilities.classifier.is_some() {
            return false;
        }
        match &self.capabilities.targets {
            Some(registry) => registry.active_targets().await.is_empty(),
            None => true,
        }
    }

    /// Store and count only; no classification, filtering or publishing
    pub async fn process_legacy(&self, payload: WebhookPayload) -> BatchResponse {
        let started = Instant::now();
        let metrics_only = self.metrics_only().await;
        let mut response = BatchResponse::empty(metrics_only, None);

        let alerts = self.parse_batch(&payload);
        for alert in alerts.iter().flatten() {
            self.store(alert).await;
        }
        response.processed_count = alerts.len();
        metrics::counter!("alerts_processed_total").increment(alerts.len() as u64);

        response.processing_duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Legacy batch processed: {} alerts in {}ms",
            response.processed_count, response.processing_duration_ms
        );
        response
    }

    /// Resolve the mode, store the batch, then enrich and publish alert by alert
    pub async fn process_intelligent(
        &self,
        payload: WebhookPayload,
        explicit_mode: Option<EnrichmentMode>,
    ) -> BatchResponse {
        let started = Instant::now();
        let mode_state = self.modes.current(explicit_mode).await;
        let mode = mode_state.mode;

        let alerts = self.parse_batch(&payload);
        for alert in alerts.iter().flatten() {
            self.store(alert).await;
        }

        let (targets, metrics_only) = match &self.capabilities.targets {
            Some(registry) if mode.publishes() => (
                registry.active_targets().await,
                registry.is_metrics_only_mode().await,
            ),
            _ => (Vec::new(), self.metrics_only().await),
        };

        let mut response = BatchResponse::empty(metrics_only, Some(mode_state));

        for alert in alerts {
            response.processed_count += 1;
            let Some(alert) = alert else {
                continue;
            };
            let fingerprint = alert.fingerprint.clone();

            let report = AssertUnwindSafe(self.process_alert(alert, mode, &targets, metrics_only))
                .catch_unwind()
                .await;
            let report = match report {
                Ok(report) => report,
                Err(_) => {
                    error!("Processing alert {} panicked; continuing with batch", fingerprint);
                    continue;
                }
            };

            if let Some(summary) = report.classification {
                response
                    .classification_results
                    .insert(fingerprint.clone(), summary);
            }
            if report.filtered {
                response.filtered_count += 1;
            }
            if let Some(summary) = report.publishing {
                if summary.delivered() {
                    response.published_count += 1;
                }
                response.publishing_results.insert(fingerprint, summary);
            }
        }

        metrics::counter!("alerts_processed_total").increment(response.processed_count as u64);
        metrics::counter!("alerts_published_total").increment(response.published_count as u64);
        metrics::counter!("alerts_filtered_total").increment(response.filtered_count as u64);

        response.processing_duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Batch processed in {} mode: {} processed, {} published, {} filtered in {}ms",
            mode,
            response.processed_count,
            response.published_count,
            response.filtered_count,
            response.processing_duration_ms
        );
        response
    }

    async fn process_alert(
        &self,
        alert: Alert,
        mode: EnrichmentMode,
        targets: &[Target],
        metrics_only: bool,
    ) -> AlertReport {
        let mut report = AlertReport::default();

        let classification = if mode.classifies() {
            self.classify(&alert, &mut report).await
        } else {
            None
        };
        let enriched = EnrichedAlert::new(alert, classification);

        let (delay, gated) = match self.eligibility(mode, &enriched).await {
            Eligibility::Skip => return report,
            Eligibility::Denied => {
                report.filtered = true;
                return report;
            }
            Eligibility::Publish { delay, gated } => (delay, gated),
        };

        let summary = self.deliver(&enriched, targets, metrics_only, delay).await;
        if gated {
            if let Some(filter) = &self.capabilities.filter {
                let delivered = summary.as_ref().is_some_and(PublishSummary::delivered);
                filter.record_delivery(&enriched, delivered).await;
            }
        }
        report.publishing = summary;
        report
    }

    async fn deliver(
        &self,
        enriched: &EnrichedAlert,
        targets: &[Target],
        metrics_only: bool,
        delay: Option<Duration>,
    ) -> Option<PublishSummary> {
        let fingerprint = &enriched.alert().fingerprint;
        if targets.is_empty() {
            debug!("No active targets for {}", fingerprint);
            return None;
        }
        if metrics_only {
            debug!("Metrics-only mode, not publishing {}", fingerprint);
            return None;
        }
        let Some(publisher) = &self.capabilities.publisher else {
            debug!("No publisher configured, not publishing {}", fingerprint);
            return None;
        };

        let outcomes = publisher.publish_to_targets(enriched, targets, delay).await;
        let summary = PublishSummary::from_outcomes(outcomes);
        if !summary.delivered() {
            warn!(
                "Alert {} failed on all {} targets",
                fingerprint, summary.targets
            );
        }
        Some(summary)
    }

    async fn classify(&self, alert: &Alert, report: &mut AlertReport) -> Option<ClassificationResult> {
        let classifier = self.capabilities.classifier.as_ref()?;
        let result = tokio::time::timeout(self.classify_timeout, classifier.classify(alert))
            .await
            .unwrap_or_else(|_| {
                Err(ClassificationError::Timeout(
                    self.classify_timeout.as_millis() as u64,
                ))
            });
        match result {
            Ok(result) => {
                report.classification = Some(ClassificationSummary::from(&result));
                Some(result)
            }
            Err(e) => {
                warn!("Classification failed for {}: {}", alert.fingerprint, e);
                metrics::counter!("alert_classification_failures_total").increment(1);
                report.classification = Some(ClassificationSummary::Failed {
                    error: e.to_string(),
                });
                None
            }
        }
    }

    async fn eligibility(&self, mode: EnrichmentMode, alert: &EnrichedAlert) -> Eligibility {
        if !mode.publishes() {
            return Eligibility::Skip;
        }
        if !mode.applies_filter() {
            return Eligibility::Publish {
                delay: None,
                gated: false,
            };
        }
        let Some(filter) = &self.capabilities.filter else {
            debug!("No filter engine; publishing {} unfiltered", alert.alert().fingerprint);
            return Eligibility::Publish {
                delay: None,
                gated: false,
            };
        };

        let decision = filter.should_publish(alert).await;
        if decision.allow {
            Eligibility::Publish {
                delay: decision.delay,
                gated: true,
            }
        } else {
            debug!("Alert {} denied by filter", alert.alert().fingerprint);
            Eligibility::Denied
        }
    }

    /// Parse every raw event; failures are logged and become `None`
    fn parse_batch(&self, payload: &WebhookPayload) -> Vec<Option<Alert>> {
        let nonce = request_nonce();
        let received_at = Utc::now();
        payload
            .alerts
            .iter()
            .enumerate()
            .map(|(index, raw)| match parse_alert(raw, index, &nonce, received_at) {
                Ok(alert) => Some(alert),
                Err(e) => {
                    warn!(
                        "Skipping alert #{} ({}): {}",
                        index,
                        raw.fingerprint.as_deref().unwrap_or("no fingerprint"),
                        e
                    );
                    None
                }
            })
            .collect()
    }

    async fn store(&self, alert: &Alert) {
        if let Err(e) = self.storage.append_alert(alert).await {
            warn!("Failed to store alert {}: {}", alert.fingerprint, e);
        }
    }

    async fn metrics_only(&self) -> bool {
        match &self.capabilities.targets {
            Some(registry) => registry.is_metrics_only_mode().await,
            None => false,
        }
    }
}
