//! Progress-callback trait for per-chunk translation events.
//!
//! Inject an [`Arc<dyn TranslationProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through the chunks of a document.
//!
//! Chunks are translated strictly in order, so events for one document
//! arrive sequentially. A single callback shared by several concurrent
//! documents still has to synchronise its own state.
//!
//! # Example
//!
//! ```rust
//! use pdf_translate::{PipelineConfig, TranslationProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl TranslationProgressCallback for CountingCallback {
//!     fn on_chunk_complete(&self, chunk: usize, total: usize, output_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Chunk {}/{} done ({} chars)", chunk, total, output_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn TranslationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the translation orchestrator as it processes each chunk.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait TranslationProgressCallback: Send + Sync {
    /// Called once, after chunking and before the first backend call.
    fn on_translation_start(&self, total_chunks: usize) {
        let _ = total_chunks;
    }

    /// Called before a chunk is sent. `chunk` is 1-indexed.
    fn on_chunk_start(&self, chunk: usize, total_chunks: usize) {
        let _ = (chunk, total_chunks);
    }

    /// Called when a chunk's cleaned translation is accepted.
    ///
    /// `output_len` counts the characters of the translated text, not its bytes.
    fn on_chunk_complete(&self, chunk: usize, total_chunks: usize, output_len: usize) {
        let _ = (chunk, total_chunks, output_len);
    }

    /// Called once after every chunk succeeded. Not called on failure.
    fn on_translation_complete(&self, total_chunks: usize) {
        let _ = total_chunks;
    }
}

/// A no-op implementation, the default when no callback is configured.
pub struct NoopProgressCallback;

impl TranslationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn TranslationProgressCallback>;
