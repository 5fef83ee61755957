//! Multi-Target Publishing
//!
//! Fan-out publisher with per-target isolation, a static target registry and
//! a logging sink for dry runs.

use crate::collaborators::{AlertPublisher, TargetRegistry};
use crate::error::PublishError;
use crate::model::{EnrichedAlert, PublishOutcome, Target, TargetKind};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Transport for one kind of target (Rootly, PagerDuty, Slack, webhook)
#[async_trait]
pub trait TargetSink: Send + Sync {
    /// Get the name of this sink
    fn name(&self) -> &'static str;

    /// Deliver the alert to a single target
    async fn deliver(
        &self,
        alert: &EnrichedAlert,
        target: &Target,
        delay: Option<Duration>,
    ) -> Result<(), PublishError>;
}

/// Publishes to every target concurrently, one sink per target kind
pub struct FanoutPublisher {
    sinks: HashMap<TargetKind, Arc<dyn TargetSink>>,
    timeout: Duration,
}

impl FanoutPublisher {
    /// Create a publisher with a per-target delivery timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            sinks: HashMap::new(),
            timeout,
        }
    }

    /// Route targets of `kind` to `sink`
    pub fn with_sink(mut self, kind: TargetKind, sink: Arc<dyn TargetSink>) -> Self {
        self.sinks.insert(kind, sink);
        self
    }

    async fn publish_one(
        &self,
        alert: &EnrichedAlert,
        target: &Target,
        delay: Option<Duration>,
    ) -> PublishOutcome {
        let fingerprint = &alert.alert().fingerprint;
        let Some(sink) = self.sinks.get(&target.kind) else {
            let error = PublishError::NotConfigured(format!("{:?}", target.kind));
            warn!("Cannot publish {} to {}: {}", fingerprint, target.id, error);
            return PublishOutcome::failed(&target.id, error.to_string());
        };

        let result = match tokio::time::timeout(self.timeout, sink.deliver(alert, target, delay)).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout(self.timeout)),
        };

        match result {
            Ok(()) => {
                debug!("Published {} to {} via {}", fingerprint, target.id, sink.name());
                PublishOutcome::succeeded(&target.id)
            }
            Err(e) => {
                warn!("Publishing {} to {} failed: {}", fingerprint, target.id, e);
                PublishOutcome::failed(&target.id, e.to_string())
            }
        }
    }
}

#[async_trait]
impl AlertPublisher for FanoutPublisher {
    async fn publish_to_targets(
        &self,
        alert: &EnrichedAlert,
        targets: &[Target],
        delay: Option<Duration>,
    ) -> Vec<PublishOutcome> {
        join_all(
            targets
                .iter()
                .map(|target| self.publish_one(alert, target, delay)),
        )
        .await
    }
}

/// Sink that only logs deliveries
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl TargetSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(
        &self,
        alert: &EnrichedAlert,
        target: &Target,
        delay: Option<Duration>,
    ) -> Result<(), PublishError> {
        info!(
            "Delivering {} ({}, severity {:?}) to {} after {:?}",
            alert.alert().fingerprint,
            alert.alert().status.as_str(),
            alert.severity(),
            target.id,
            delay.unwrap_or_default()
        );
        Ok(())
    }
}

/// Registry over a fixed target list
pub struct StaticTargetRegistry {
    targets: Vec<Target>,
    metrics_only: AtomicBool,
}

impl StaticTargetRegistry {
    pub fn new(targets: Vec<Target>, metrics_only: bool) -> Self {
        if metrics_only {
            info!("Target registry in metrics-only mode; publishing disabled");
        }
        Self {
            targets,
            metrics_only: AtomicBool::new(metrics_only),
        }
    }

    /// Toggle administrative metrics-only mode
    pub fn set_metrics_only(&self, metrics_only: bool) {
        self.metrics_only.store(metrics_only, Ordering::Relaxed);
    }
}

#[async_trait]
impl TargetRegistry for StaticTargetRegistry {
    async fn active_targets(&self) -> Vec<Target> {
        self.targets.iter().filter(|t| t.enabled).cloned().collect()
    }

    async fn is_metrics_only_mode(&self) -> bool {
        self.metrics_only.load(Ordering::Relaxed)
    }
}
