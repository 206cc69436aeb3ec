//! Extraction strategy chain: PDF bytes → [`ExtractedDocument`].
//!
//! Strategies are tried strictly in the configured order and the first one
//! that produces a non-empty document wins. Each attempt is isolated: an
//! error or a panic inside a parsing library is logged and the chain moves
//! on, so one broken engine cannot take the others down with it.
//!
//! ```text
//! bytes ──► layout (pdfium + lopdf images)
//!             │ fail
//!             ▼
//!           table (lopdf spans → tables)
//!             │ fail
//!             ▼
//!           minimal (pdf-extract text)
//!             │ fail
//!             ▼
//!           PipelineError::ExtractionExhausted
//! ```

pub mod fallback;
pub mod images;
pub mod layout;
pub(crate) mod objects;
pub mod spans;
pub mod structure;
pub mod tables;

use crate::config::{ExtractorKind, PipelineConfig};
use crate::error::{ExtractError, PipelineError};
use crate::model::{ExtractedDocument, RawDocument};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{info, warn};

pub use fallback::MinimalFallback;
pub use layout::LayoutEngine;
pub use structure::TableSpecialist;

/// One way of turning PDF bytes into structured pages.
///
/// Implementations are blocking and may call into C libraries.
pub trait Extractor: Send + Sync {
    /// Short identifier, recorded in [`ExtractedDocument::extractor`].
    fn name(&self) -> &str;

    fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument, ExtractError>;
}

/// An ordered list of strategies. Cheap to clone.
#[derive(Clone)]
pub struct ExtractionChain {
    strategies: Vec<Arc<dyn Extractor>>,
}

impl std::fmt::Debug for ExtractionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|s| s.name()))
            .finish()
    }
}

impl ExtractionChain {
    pub fn new(strategies: Vec<Arc<dyn Extractor>>) -> Self {
        Self { strategies }
    }

    /// Builds the built-in strategies in `config.extractors` order.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let strategies = config
            .extractors
            .iter()
            .map(|kind| -> Arc<dyn Extractor> {
                match kind {
                    ExtractorKind::Layout => {
                        Arc::new(LayoutEngine::new(config.pdfium_library_path.clone()))
                    }
                    ExtractorKind::TableSpecialist => Arc::new(TableSpecialist::new()),
                    ExtractorKind::MinimalFallback => Arc::new(MinimalFallback),
                }
            })
            .collect();
        Self::new(strategies)
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Runs the chain on the calling thread.
    pub fn extract(&self, raw: &RawDocument) -> Result<ExtractedDocument, PipelineError> {
        let mut last_error = String::from("no extraction strategy configured");

        for strategy in &self.strategies {
            info!("Extracting '{}' with '{}'", raw.filename, strategy.name());
            match attempt(strategy.as_ref(), &raw.bytes) {
                Ok(doc) => {
                    info!(
                        "'{}' extracted by '{}': {} pages, {} images",
                        raw.filename,
                        strategy.name(),
                        doc.total_pages(),
                        doc.image_count()
                    );
                    return Ok(doc);
                }
                Err(e) => {
                    warn!("Strategy '{}' failed on '{}': {}", strategy.name(), raw.filename, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(PipelineError::ExtractionExhausted {
            filename: raw.filename.clone(),
            attempted: self.strategies.len(),
            last_error,
        })
    }

    /// Runs the chain on the blocking pool.
    pub async fn run(&self, raw: RawDocument) -> Result<ExtractedDocument, PipelineError> {
        let chain = self.clone();
        tokio::task::spawn_blocking(move || chain.extract(&raw))
            .await
            .map_err(|e| PipelineError::Internal(format!("Extraction task panicked: {}", e)))?
    }
}

fn attempt(strategy: &dyn Extractor, bytes: &[u8]) -> Result<ExtractedDocument, ExtractError> {
    let result = catch_unwind(AssertUnwindSafe(|| strategy.extract(bytes))).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        ExtractError::Panicked {
            strategy: strategy.name().to_string(),
            message,
        }
    })??;

    if result.total_pages() == 0 {
        return Err(ExtractError::Empty);
    }
    Ok(result)
}
