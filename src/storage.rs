//! Content storage for uploaded files
//!
//! Files are written under a flat directory as `<uuid><ext>`; the returned
//! reference is that file name and is what lands in `Resource::file_path`.

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Persist `data`, returning an opaque reference. `extension` includes the
    /// leading dot or is empty.
    async fn store(&self, extension: &str, data: &[u8]) -> EngineResult<String>;

    async fn retrieve(&self, content_ref: &str) -> EngineResult<Vec<u8>>;
}

fn new_content_ref(extension: &str) -> String {
    format!("{}{}", Uuid::new_v4(), extension.to_ascii_lowercase())
}

/// References are bare file names; anything that could walk out of the root
/// is refused.
fn check_content_ref(content_ref: &str) -> EngineResult<()> {
    let bad = content_ref.is_empty()
        || content_ref.contains('/')
        || content_ref.contains('\\')
        || content_ref.starts_with('.');
    if bad {
        return Err(EngineError::StorageFailure(format!(
            "invalid content reference: {}",
            content_ref
        )));
    }
    Ok(())
}

/// Filesystem-backed content store
pub struct FsContentStore {
    root_dir: PathBuf,
}

impl FsContentStore {
    pub async fn new<P: AsRef<Path>>(root_dir: P) -> EngineResult<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();

        fs::create_dir_all(&root_dir).await.map_err(|e| {
            EngineError::StorageFailure(format!(
                "cannot create upload dir {}: {}",
                root_dir.display(),
                e
            ))
        })?;

        info!(path = %root_dir.display(), "Initialized content store");
        Ok(Self { root_dir })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn store(&self, extension: &str, data: &[u8]) -> EngineResult<String> {
        let content_ref = new_content_ref(extension);
        let path = self.root_dir.join(&content_ref);

        fs::write(&path, data)
            .await
            .map_err(|e| EngineError::StorageFailure(format!("write {}: {}", content_ref, e)))?;

        debug!(content_ref = %content_ref, size = data.len(), "Stored content");
        Ok(content_ref)
    }

    async fn retrieve(&self, content_ref: &str) -> EngineResult<Vec<u8>> {
        check_content_ref(content_ref)?;
        fs::read(self.root_dir.join(content_ref))
            .await
            .map_err(|e| EngineError::StorageFailure(format!("read {}: {}", content_ref, e)))
    }
}

/// In-process content store for tests and database-less runs
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn store(&self, extension: &str, data: &[u8]) -> EngineResult<String> {
        let content_ref = new_content_ref(extension);
        self.blobs.insert(content_ref.clone(), data.to_vec());
        Ok(content_ref)
    }

    async fn retrieve(&self, content_ref: &str) -> EngineResult<Vec<u8>> {
        self.blobs
            .get(content_ref)
            .map(|blob| blob.value().clone())
            .ok_or_else(|| EngineError::StorageFailure(format!("missing content {}", content_ref)))
    }
}
