//! Local blob storage for uploaded content and its thumbnail variants.
//!
//! Every blob gets a fresh UUID path under the storage root; user-supplied
//! names never reach the filesystem. Thumbnails live next to their source
//! as `{path}_{width}`.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Widths of the derived image variants, in generation order.
pub const THUMBNAIL_WIDTHS: [u32; 3] = [500, 250, 100];

#[derive(Debug, Clone)]
pub struct BlobStorage {
    root: PathBuf,
}

impl BlobStorage {
    /// The root directory is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A new, collision-free path under the root. Nothing is written yet.
    pub fn allocate(&self) -> PathBuf {
        self.root.join(Uuid::new_v4().to_string())
    }

    pub fn variant_path(path: &str, width: u32) -> String {
        format!("{path}_{width}")
    }

    /// Writes (or overwrites) a blob.
    pub async fn write(&self, path: impl AsRef<Path>, content: &[u8]) -> io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, content).await
    }

    pub async fn read(&self, path: impl AsRef<Path>) -> io::Result<Vec<u8>> {
        fs::read(path).await
    }

    pub async fn remove(&self, path: impl AsRef<Path>) -> io::Result<()> {
        fs::remove_file(path).await
    }

    pub async fn exists(&self, path: impl AsRef<Path>) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }
}
