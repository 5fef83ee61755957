//! Enrichment Mode
//!
//! Tri-state policy deciding whether a batch is classified and filtered, and
//! its resolution from explicit overrides, the shared store and defaults.

mod mode;
mod resolver;

pub use mode::{EnrichmentMode, ModeSource, ModeState};
pub use resolver::{resolve, EnrichmentModeResolver, ModeError, ResolverConfig};
