//! Service Configuration
//!
//! Layered: built-in defaults, then an optional config file, then
//! `ALERT_INGEST__*` environment variables (`__` separates nested keys).

use alerting::{FilterConfig, Target};
use config::{Config, ConfigError, Environment, File};
use enrichment::EnrichmentMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "ALERT_INGEST";

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Listen address
    pub bind_addr: String,
    /// Maximum log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines
    pub log_json: bool,
    /// Mode used when neither the request nor the shared store sets one
    pub default_mode: EnrichmentMode,
    /// Use the in-process shared cache; disable to run without any
    pub shared_cache: bool,
    /// Upper bound for each shared-cache call (milliseconds)
    pub cache_timeout_ms: u64,
    /// Window in which a resubmitted batch is treated as a duplicate (seconds)
    pub idempotency_ttl_seconds: u64,
    /// Heartbeat refresh cadence (seconds)
    pub heartbeat_interval_seconds: u64,
    /// Enable the label-based classifier
    pub classifier_enabled: bool,
    /// Upper bound for each classifier call (milliseconds)
    pub classify_timeout_ms: u64,
    /// Filter engine thresholds
    pub filter: FilterConfig,
    /// Per-target publish timeout (milliseconds)
    pub publish_timeout_ms: u64,
    /// Keep targets configured but do not deliver
    pub metrics_only: bool,
    /// Downstream targets
    pub targets: Vec<Target>,
    /// Maximum alert records kept in storage
    pub retention: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            default_mode: EnrichmentMode::Transparent,
            shared_cache: true,
            cache_timeout_ms: 250,
            idempotency_ttl_seconds: 300,
            heartbeat_interval_seconds: 60,
            classifier_enabled: true,
            classify_timeout_ms: 5_000,
            filter: FilterConfig::default(),
            publish_timeout_ms: 5_000,
            metrics_only: false,
            targets: Vec::new(),
            retention: 100_000,
        }
    }
}

impl ServiceConfig {
    /// Load configuration, optionally from a file (extension picks the format)
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_seconds)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds.max(1))
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_millis(self.classify_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::{Severity, TargetKind};
    use std::io::Write;

    #[test]
    fn test_defaults_round_trip() {
        let config = ServiceConfig::load(None).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.default_mode, EnrichmentMode::Transparent);
        assert_eq!(config.filter.min_severity, Severity::Warning);
        assert!(config.targets.is_empty());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("alert-ingest-test-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
default_mode = "enriched"
metrics_only = true

[filter]
cooldown_seconds = 60
max_publishes_per_hour = 50

[[targets]]
id = "pd-primary"
kind = "pagerduty"
"#
        )
        .unwrap();

        let config = ServiceConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.default_mode, EnrichmentMode::Enriched);
        assert!(config.metrics_only);
        assert_eq!(config.filter.cooldown_seconds, 60);
        assert_eq!(config.filter.max_publishes_per_hour, 50);
        assert_eq!(config.filter.confidence_threshold, 0.75);
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.targets[0].kind, TargetKind::PagerDuty);
        assert!(config.targets[0].enabled);
    }

    #[test]
    fn test_missing_file_is_optional() {
        let config = ServiceConfig::load(Some("/nonexistent/alert-ingest")).unwrap();
        assert_eq!(config.retention, 100_000);
        assert_eq!(config.classify_timeout(), Duration::from_secs(5));
    }
}
