//! Alert Ingestion
//!
//! Parses notifier batches, classifies and filters alerts according to the
//! enrichment mode, and publishes them to downstream incident targets.

mod classifier;
mod collaborators;
mod error;
mod filter;
mod model;
mod pipeline;
mod publisher;
mod webhook;

pub use classifier::{LabelClassifier, LabelClassifierConfig};
pub use collaborators::{
    AlertPublisher, AlertStorage, Capabilities, ClassificationService, FilterEngine,
    TargetRegistry,
};
pub use error::{ClassificationError, ParseError, PipelineError, PublishError};
pub use filter::{FilterConfig, ThresholdFilter};
pub use model::{
    Alert, AlertStatus, ClassificationResult, EnrichedAlert, FilterDecision, PublishOutcome,
    Severity, Target, TargetKind,
};
pub use pipeline::{
    AlertIngestionPipeline, BatchResponse, ClassificationSummary, PublishSummary,
    DEFAULT_CLASSIFY_TIMEOUT,
};
pub use publisher::{FanoutPublisher, LogSink, StaticTargetRegistry, TargetSink};
pub use webhook::{derive_fingerprint, parse_alert, parse_timestamp, RawAlertEvent, WebhookPayload};
