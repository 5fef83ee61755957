//! Enrichment Mode Resolver

use crate::mode::{EnrichmentMode, ModeSource, ModeState};
use coordination::{CacheError, SharedCache};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Mode resolution errors
#[derive(Debug, Error)]
pub enum ModeError {
    #[error("No shared store configured; mode cannot be changed across instances")]
    NoSharedStore,
    #[error("Shared store error: {0}")]
    Store(#[from] CacheError),
}

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Mode used when neither an override nor a stored value exists
    pub default_mode: EnrichmentMode,
    /// Shared-store key holding the mode
    pub store_key: String,
    /// Upper bound for a single store call
    pub store_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_mode: EnrichmentMode::Transparent,
            store_key: "enrichment:mode".to_string(),
            store_timeout: Duration::from_millis(250),
        }
    }
}

/// Pick the first present mode from an ordered list of sources.
///
/// Earlier sources take precedence; `default` applies when none is present.
pub fn resolve(
    sources: &[(ModeSource, Option<EnrichmentMode>)],
    default: EnrichmentMode,
) -> ModeState {
    sources
        .iter()
        .find_map(|(source, mode)| mode.map(|mode| ModeState { mode, source: *source }))
        .unwrap_or(ModeState {
            mode: default,
            source: ModeSource::Default,
        })
}

/// Reads and writes the enrichment mode shared by all instances
pub struct EnrichmentModeResolver {
    store: Option<Arc<dyn SharedCache>>,
    config: ResolverConfig,
}

impl EnrichmentModeResolver {
    /// Create a resolver. Without a store every instance uses its own default.
    pub fn new(store: Option<Arc<dyn SharedCache>>, config: ResolverConfig) -> Self {
        if store.is_none() {
            warn!(
                "No shared store for enrichment mode; instances fall back to default '{}' independently",
                config.default_mode
            );
        }
        Self { store, config }
    }

    /// Resolve the mode for one request. Never mutates state.
    pub async fn current(&self, explicit: Option<EnrichmentMode>) -> ModeState {
        // An override short-circuits the store read
        let stored = match explicit {
            Some(_) => None,
            None => self.read_stored().await,
        };
        let state = resolve(
            &[
                (ModeSource::ExplicitOverride, explicit),
                (ModeSource::SharedStore, stored),
            ],
            self.config.default_mode,
        );
        debug!("Resolved enrichment mode {} from {:?}", state.mode, state.source);
        state
    }

    /// Persist a new mode for every instance
    pub async fn set_mode(&self, mode: EnrichmentMode) -> Result<ModeState, ModeError> {
        let store = self.store.as_ref().ok_or(ModeError::NoSharedStore)?;
        let write = store.set(&self.config.store_key, mode.as_str().to_string(), None);
        match tokio::time::timeout(self.config.store_timeout, write).await {
            Ok(result) => {
                result?;
            }
            Err(_) => return Err(CacheError::Timeout(self.config.store_timeout).into()),
        }
        info!("Enrichment mode set to {}", mode);
        Ok(ModeState {
            mode,
            source: ModeSource::SharedStore,
        })
    }

    async fn read_stored(&self) -> Option<EnrichmentMode> {
        let store = self.store.as_ref()?;
        let read = store.get(&self.config.store_key);
        let raw = match tokio::time::timeout(self.config.store_timeout, read).await {
            Ok(Ok(raw)) => raw?,
            Ok(Err(e)) => {
                warn!("Failed to read enrichment mode: {}", e);
                return None;
            }
            Err(_) => {
                warn!("Enrichment mode read timed out");
                return None;
            }
        };
        match raw.parse() {
            Ok(mode) => Some(mode),
            Err(e) => {
                warn!("Ignoring stored enrichment mode: {}", e);
                None
            }
        }
    }
}
