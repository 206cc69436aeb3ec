//! Binary storage for extracted images.
//!
//! The pipeline only ever sees opaque locator strings. [`MemoryStore`]
//! keeps everything in process (tests, single-shot CLI runs) and
//! [`FsStore`] writes under a root directory.

use crate::error::PipelineError;
use crate::model::ImageFormat;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Put/get of arbitrary bytes behind an opaque locator.
pub trait BinaryStore: Send + Sync {
    /// Stores `bytes` and returns the locator to fetch them with.
    fn put(
        &self,
        bytes: &[u8],
        suggested_name: &str,
        content_type: &str,
        folder: &str,
    ) -> Result<String, PipelineError>;

    fn get(&self, locator: &str) -> Result<Vec<u8>, PipelineError>;
}

/// Turns an image reference found in Markdown into an inline `data:` URI.
pub trait ImageResolver: Send + Sync {
    /// `None` when the reference cannot be resolved.
    fn resolve(&self, locator: &str) -> Option<String>;
}

impl<S: BinaryStore + ?Sized> ImageResolver for S {
    fn resolve(&self, locator: &str) -> Option<String> {
        let bytes = self.get(locator).ok()?;
        Some(data_uri(&bytes))
    }
}

/// `data:<mime>;base64,<payload>`, with the MIME type sniffed from the bytes.
pub fn data_uri(bytes: &[u8]) -> String {
    let mime = ImageFormat::sniff(bytes)
        .map(|f| f.mime())
        .unwrap_or("application/octet-stream");
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

fn storage_error(locator: impl Into<String>, detail: impl ToString) -> PipelineError {
    PipelineError::StorageFailure {
        locator: locator.into(),
        detail: detail.to_string(),
    }
}

// ── In-memory ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content type recorded at `put` time.
    pub fn content_type(&self, locator: &str) -> Option<String> {
        let objects = self.objects.lock().ok()?;
        objects.get(locator).map(|(_, ct)| ct.clone())
    }
}

impl BinaryStore for MemoryStore {
    fn put(
        &self,
        bytes: &[u8],
        suggested_name: &str,
        content_type: &str,
        folder: &str,
    ) -> Result<String, PipelineError> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| storage_error(folder, "memory store lock poisoned"))?;
        // The sequence number keeps repeated names from overwriting each other.
        let locator = format!("mem://{}/{}_{}", folder, objects.len(), suggested_name);
        objects.insert(locator.clone(), (bytes.to_vec(), content_type.to_string()));
        Ok(locator)
    }

    fn get(&self, locator: &str) -> Result<Vec<u8>, PipelineError> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| storage_error(locator, "memory store lock poisoned"))?;
        objects
            .get(locator)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| storage_error(locator, "no such object"))
    }
}

// ── Filesystem ───────────────────────────────────────────────────────────

/// Stores objects as files under `root`; locators are root-relative paths.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rejects absolute paths and `..` so a locator cannot escape the root.
    fn path_for(&self, relative: &str) -> Result<PathBuf, PipelineError> {
        let rel = Path::new(relative);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(storage_error(relative, "locator escapes the store root"));
        }
        Ok(self.root.join(rel))
    }
}

impl BinaryStore for FsStore {
    fn put(
        &self,
        bytes: &[u8],
        suggested_name: &str,
        _content_type: &str,
        folder: &str,
    ) -> Result<String, PipelineError> {
        let locator = if folder.is_empty() {
            suggested_name.to_string()
        } else {
            format!("{}/{}", folder.trim_end_matches('/'), suggested_name)
        };
        let path = self.path_for(&locator)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| storage_error(&locator, e))?;
        }
        std::fs::write(&path, bytes).map_err(|e| storage_error(&locator, e))?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(locator)
    }

    fn get(&self, locator: &str) -> Result<Vec<u8>, PipelineError> {
        let path = self.path_for(locator)?;
        std::fs::read(&path).map_err(|e| storage_error(locator, e))
    }
}
