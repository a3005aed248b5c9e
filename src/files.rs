//! File tree operations: upload, lookup, listing, visibility and content
//! retrieval, all scoped to the requesting owner.
//!
//! Ownership mismatches, private access and genuine absence are all reported
//! as `FileError::NotFound` so that callers cannot probe for other users'
//! files.

use crate::blob::{BlobStorage, THUMBNAIL_WIDTHS};
use crate::error::FileError;
use crate::jobs::{Job, JobQueue};
use crate::models::{FileKind, FileNode, NewFile, ParentId};
use crate::storage::DocumentStore;
use anyhow::Context;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Nodes per listing page.
pub const PAGE_SIZE: usize = 20;

pub struct FileTreeService {
    store: Arc<dyn DocumentStore>,
    blobs: BlobStorage,
    queue: Arc<dyn JobQueue>,
}

impl FileTreeService {
    pub fn new(store: Arc<dyn DocumentStore>, blobs: BlobStorage, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            store,
            blobs,
            queue,
        }
    }

    /// Validates and stores a new node. Content of files and images is
    /// written to a fresh blob before the metadata is inserted; images then
    /// get a thumbnail job.
    pub async fn create(&self, owner_id: &str, new_file: NewFile) -> Result<FileNode, FileError> {
        let name = new_file
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or(FileError::MissingField("name"))?;
        let kind: FileKind = new_file
            .kind
            .as_deref()
            .and_then(|k| k.parse().ok())
            .ok_or(FileError::InvalidKind)?;
        let content = match kind {
            FileKind::Folder => None,
            FileKind::File | FileKind::Image => Some(
                new_file
                    .content
                    .filter(|c| !c.is_empty())
                    .ok_or(FileError::MissingContent)?,
            ),
        };

        if let ParentId::Node(parent_id) = &new_file.parent_id {
            let parent = self
                .store
                .find_owned_file(parent_id, owner_id)
                .await?
                .ok_or(FileError::ParentNotFound)?;
            if parent.kind != FileKind::Folder {
                return Err(FileError::ParentNotFolder);
            }
        }

        let local_path = match content {
            Some(content) => {
                let path = self.blobs.allocate();
                self.blobs
                    .write(&path, &content)
                    .await
                    .with_context(|| format!("Failed to write blob {}", path.display()))?;
                Some(path.to_string_lossy().into_owned())
            }
            None => None,
        };

        let node = FileNode::new(
            owner_id.to_string(),
            name,
            kind,
            new_file.parent_id,
            new_file.is_public,
            local_path,
        );
        if let Err(e) = self.store.insert_file(node.clone()).await {
            if let Some(path) = &node.local_path {
                if let Err(cleanup) = self.blobs.remove(path).await {
                    warn!(path = %path, "failed to remove orphan blob: {cleanup}");
                }
            }
            return Err(e.into());
        }
        info!(file_id = %node.id, kind = %node.kind, "file created");

        if node.kind == FileKind::Image {
            if let Err(e) = self.queue.push(Job::thumbnail(owner_id, &node.id)).await {
                warn!(file_id = %node.id, "failed to enqueue thumbnail job: {e:#}");
            }
        }

        Ok(node)
    }

    pub async fn get(&self, requester_id: &str, file_id: &str) -> Result<FileNode, FileError> {
        match self.store.find_owned_file(file_id, requester_id).await {
            Ok(Some(node)) => Ok(node),
            Ok(None) => Err(FileError::NotFound),
            Err(e) => {
                warn!(file_id, "file lookup failed: {e:#}");
                Err(FileError::NotFound)
            }
        }
    }

    /// One page of the requester's children of `parent_id`. Pages past the
    /// end are empty.
    pub async fn list(
        &self,
        requester_id: &str,
        parent_id: &ParentId,
        page: usize,
    ) -> Result<Vec<FileNode>, FileError> {
        let skip = page.saturating_mul(PAGE_SIZE);
        Ok(self
            .store
            .list_files(requester_id, parent_id, skip, PAGE_SIZE)
            .await?)
    }

    /// Sets `is_public` on an owned node. Setting the current value is a
    /// successful no-op.
    pub async fn set_visibility(
        &self,
        requester_id: &str,
        file_id: &str,
        is_public: bool,
    ) -> Result<FileNode, FileError> {
        self.store
            .set_file_public(file_id, requester_id, is_public)
            .await?
            .ok_or(FileError::NotFound)
    }

    /// Reads a file's content, or one of its thumbnails when `width` is one
    /// of the generated widths. Other widths fall back to the original.
    ///
    /// A thumbnail that has not been generated yet is `NotFound`, as is any
    /// failure to read the blob.
    pub async fn read_content(
        &self,
        requester_id: Option<&str>,
        file_id: &str,
        width: Option<u32>,
    ) -> Result<(FileNode, Vec<u8>), FileError> {
        let node = match self.store.find_file(file_id).await {
            Ok(Some(node)) => node,
            Ok(None) => return Err(FileError::NotFound),
            Err(e) => {
                warn!(file_id, "file lookup failed: {e:#}");
                return Err(FileError::NotFound);
            }
        };

        if !node.is_public && requester_id != Some(node.user_id.as_str()) {
            return Err(FileError::NotFound);
        }

        if node.kind == FileKind::Folder {
            return Err(FileError::NotAFile);
        }

        let local_path = node.local_path.as_deref().ok_or(FileError::NotFound)?;
        let path = match width.filter(|w| THUMBNAIL_WIDTHS.contains(w)) {
            Some(width) => BlobStorage::variant_path(local_path, width),
            None => local_path.to_string(),
        };

        match self.blobs.read(&path).await {
            Ok(bytes) => Ok((node, bytes)),
            Err(e) => {
                debug!(file_id, "blob read failed: {e}");
                Err(FileError::NotFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{MemoryQueue, RedeliveryPolicy, THUMBNAIL_CHANNEL};
    use crate::storage::JsonDocumentStore;

    struct Fixture {
        _dir: tempfile::TempDir,
        queue: Arc<MemoryQueue>,
        blobs: BlobStorage,
        service: FileTreeService,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let blobs = BlobStorage::new(dir.path());
        let queue = Arc::new(MemoryQueue::new(RedeliveryPolicy::default()));
        let service = FileTreeService::new(
            Arc::new(JsonDocumentStore::in_memory()),
            blobs.clone(),
            queue.clone(),
        );
        Fixture {
            _dir: dir,
            queue,
            blobs,
            service,
        }
    }

    fn folder(name: &str, parent: ParentId) -> NewFile {
        NewFile {
            name: Some(name.to_string()),
            kind: Some("folder".to_string()),
            parent_id: parent,
            ..Default::default()
        }
    }

    fn file(name: &str, kind: &str, parent: ParentId, content: &[u8]) -> NewFile {
        NewFile {
            name: Some(name.to_string()),
            kind: Some(kind.to_string()),
            parent_id: parent,
            content: Some(content.to_vec()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_folder_then_child() {
        let f = fixture();
        let docs = f
            .service
            .create("alice", folder("docs", ParentId::Root))
            .await
            .unwrap();
        assert!(docs.local_path.is_none());

        let child = f
            .service
            .create(
                "alice",
                file("a.txt", "file", ParentId::Node(docs.id.clone()), b"hello"),
            )
            .await
            .unwrap();
        assert_eq!(child.parent_id, ParentId::Node(docs.id));

        let path = child.local_path.unwrap();
        assert!(path.starts_with(&*f.blobs.root().to_string_lossy()));
        assert!(!path.contains("a.txt"));
        assert_eq!(f.blobs.read(&path).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_parent_must_be_owned_folder() {
        let f = fixture();
        let txt = f
            .service
            .create("alice", file("a.txt", "file", ParentId::Root, b"x"))
            .await
            .unwrap();
        let docs = f
            .service
            .create("alice", folder("docs", ParentId::Root))
            .await
            .unwrap();

        let under_file = f
            .service
            .create("alice", folder("sub", ParentId::Node(txt.id)))
            .await;
        assert!(matches!(under_file, Err(FileError::ParentNotFolder)));

        let foreign = f
            .service
            .create("bob", folder("sub", ParentId::Node(docs.id)))
            .await;
        assert!(matches!(foreign, Err(FileError::ParentNotFound)));

        let missing = f
            .service
            .create("alice", folder("sub", ParentId::Node("nope".to_string())))
            .await;
        assert!(matches!(missing, Err(FileError::ParentNotFound)));
    }

    #[tokio::test]
    async fn test_create_validation_order() {
        let f = fixture();

        let no_name = NewFile {
            kind: Some("file".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            f.service.create("alice", no_name).await,
            Err(FileError::MissingField("name"))
        ));

        let bad_kind = NewFile {
            name: Some("x".to_string()),
            kind: Some("video".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            f.service.create("alice", bad_kind).await,
            Err(FileError::InvalidKind)
        ));

        let no_content = NewFile {
            name: Some("x".to_string()),
            kind: Some("image".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            f.service.create("alice", no_content).await,
            Err(FileError::MissingContent)
        ));
    }

    #[tokio::test]
    async fn test_image_upload_enqueues_thumbnail_job() {
        let f = fixture();
        let img = f
            .service
            .create("alice", file("pic.png", "image", ParentId::Root, b"px"))
            .await
            .unwrap();
        f.service
            .create("alice", file("a.txt", "file", ParentId::Root, b"x"))
            .await
            .unwrap();

        assert_eq!(f.queue.pending_on(THUMBNAIL_CHANNEL).await, 1);
        let delivery = f.queue.pop().await.unwrap();
        assert_eq!(delivery.job, Job::thumbnail("alice", &img.id));
    }

    #[tokio::test]
    async fn test_get_hides_foreign_nodes() {
        let f = fixture();
        let docs = f
            .service
            .create("alice", folder("docs", ParentId::Root))
            .await
            .unwrap();

        assert_eq!(f.service.get("alice", &docs.id).await.unwrap(), docs);
        assert!(matches!(
            f.service.get("bob", &docs.id).await,
            Err(FileError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let f = fixture();
        for i in 0..25 {
            f.service
                .create("alice", folder(&format!("f{i:02}"), ParentId::Root))
                .await
                .unwrap();
        }

        let page0 = f.service.list("alice", &ParentId::Root, 0).await.unwrap();
        let page1 = f.service.list("alice", &ParentId::Root, 1).await.unwrap();
        let page2 = f.service.list("alice", &ParentId::Root, 2).await.unwrap();
        assert_eq!(page0.len(), 20);
        assert_eq!(page1.len(), 5);
        assert!(page2.is_empty());
        assert_eq!(page0[0].name, "f00");
        assert_eq!(page1[0].name, "f20");

        assert!(f
            .service
            .list("bob", &ParentId::Root, 0)
            .await
            .unwrap()
            .is_empty());
        assert!(f
            .service
            .list("alice", &ParentId::Root, usize::MAX)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_set_visibility_idempotent() {
        let f = fixture();
        let docs = f
            .service
            .create("alice", folder("docs", ParentId::Root))
            .await
            .unwrap();

        let first = f.service.set_visibility("alice", &docs.id, true).await.unwrap();
        let second = f.service.set_visibility("alice", &docs.id, true).await.unwrap();
        assert_eq!(first, second);
        assert!(first.is_public);

        assert!(matches!(
            f.service.set_visibility("bob", &docs.id, false).await,
            Err(FileError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_read_content_visibility() {
        let f = fixture();
        let txt = f
            .service
            .create("alice", file("a.txt", "file", ParentId::Root, b"secret"))
            .await
            .unwrap();

        let (_, bytes) = f
            .service
            .read_content(Some("alice"), &txt.id, None)
            .await
            .unwrap();
        assert_eq!(bytes, b"secret");

        let private = f.service.read_content(Some("bob"), &txt.id, None).await;
        let anonymous = f.service.read_content(None, &txt.id, None).await;
        let missing = f.service.read_content(Some("bob"), "no-such-id", None).await;
        assert!(matches!(private, Err(FileError::NotFound)));
        assert!(matches!(anonymous, Err(FileError::NotFound)));
        assert!(matches!(missing, Err(FileError::NotFound)));

        f.service.set_visibility("alice", &txt.id, true).await.unwrap();
        let (_, bytes) = f.service.read_content(None, &txt.id, None).await.unwrap();
        assert_eq!(bytes, b"secret");
    }

    #[tokio::test]
    async fn test_read_content_folder() {
        let f = fixture();
        let docs = f
            .service
            .create("alice", folder("docs", ParentId::Root))
            .await
            .unwrap();
        assert!(matches!(
            f.service.read_content(Some("alice"), &docs.id, None).await,
            Err(FileError::NotAFile)
        ));
    }

    #[tokio::test]
    async fn test_read_content_variants() {
        let f = fixture();
        let img = f
            .service
            .create("alice", file("pic.png", "image", ParentId::Root, b"px"))
            .await
            .unwrap();

        let pending = f.service.read_content(Some("alice"), &img.id, Some(100)).await;
        assert!(matches!(pending, Err(FileError::NotFound)));

        let base = img.local_path.clone().unwrap();
        f.blobs
            .write(BlobStorage::variant_path(&base, 100), b"small")
            .await
            .unwrap();
        let (_, bytes) = f
            .service
            .read_content(Some("alice"), &img.id, Some(100))
            .await
            .unwrap();
        assert_eq!(bytes, b"small");

        let (_, bytes) = f
            .service
            .read_content(Some("alice"), &img.id, Some(42))
            .await
            .unwrap();
        assert_eq!(bytes, b"px");
    }

    #[tokio::test]
    async fn test_failed_insert_removes_blob() {
        let blob_dir = tempfile::tempdir().unwrap();
        let data_dir = tempfile::tempdir().unwrap();
        let data = data_dir.path().join("data");
        let store = JsonDocumentStore::open(&data).unwrap();
        std::fs::remove_dir_all(&data).unwrap();

        let blobs = BlobStorage::new(blob_dir.path());
        let queue = Arc::new(MemoryQueue::new(RedeliveryPolicy::default()));
        let service = FileTreeService::new(Arc::new(store), blobs, queue.clone());

        let result = service
            .create("alice", file("pic.png", "image", ParentId::Root, b"px"))
            .await;
        assert!(matches!(result, Err(FileError::Upstream(_))));

        let leftovers = std::fs::read_dir(blob_dir.path()).unwrap().count();
        assert_eq!(leftovers, 0);
        assert_eq!(queue.pending().await, 0);
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let f = fixture();
        let txt = f
            .service
            .create("alice", file("a.txt", "file", ParentId::Root, b"x"))
            .await
            .unwrap();
        tokio::fs::remove_file(txt.local_path.as_ref().unwrap())
            .await
            .unwrap();

        assert!(matches!(
            f.service.read_content(Some("alice"), &txt.id, None).await,
            Err(FileError::NotFound)
        ));
    }
}
