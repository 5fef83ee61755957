//! Enrichment Mode Types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How much of the pipeline runs for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentMode {
    /// Store only; no classification, filtering or publishing
    Transparent,
    /// Classify for information; publish everything unfiltered
    TransparentWithRecommendations,
    /// Classify, filter, publish only what the filter allows
    Enriched,
}

impl EnrichmentMode {
    pub const ALL: [EnrichmentMode; 3] = [
        EnrichmentMode::Transparent,
        EnrichmentMode::TransparentWithRecommendations,
        EnrichmentMode::Enriched,
    ];

    /// Whether alerts are sent to the classifier
    pub fn classifies(self) -> bool {
        !matches!(self, Self::Transparent)
    }

    /// Whether the filter engine gates publishing
    pub fn applies_filter(self) -> bool {
        matches!(self, Self::Enriched)
    }

    /// Whether any publishing happens at all
    pub fn publishes(self) -> bool {
        !matches!(self, Self::Transparent)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transparent => "transparent",
            Self::TransparentWithRecommendations => "transparent_with_recommendations",
            Self::Enriched => "enriched",
        }
    }
}

impl fmt::Display for EnrichmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrichmentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown enrichment mode '{}'", s))
    }
}

/// Where a resolved mode came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeSource {
    ExplicitOverride,
    SharedStore,
    Default,
}

/// Resolved mode with provenance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeState {
    pub mode: EnrichmentMode,
    pub source: ModeSource,
}
