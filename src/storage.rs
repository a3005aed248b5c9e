//! Document store for users and file nodes.
//!
//! `DocumentStore` is the capability the services depend on. The bundled
//! `JsonDocumentStore` keeps each collection in memory, in insertion order,
//! and optionally mirrors it to a pretty-printed JSON file after every write.

use crate::models::{FileNode, ParentId};
use crate::user_models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

const USERS_FILE: &str = "users.json";
const FILES_FILE: &str = "files.json";

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Whether the store can currently serve requests.
    async fn is_alive(&self) -> bool {
        true
    }

    /// Inserts a user. Returns `Ok(false)` when the email is already taken.
    async fn insert_user(&self, user: User) -> Result<bool>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>>;

    async fn count_users(&self) -> Result<usize>;

    async fn insert_file(&self, file: FileNode) -> Result<()>;

    /// Finds a node regardless of owner.
    async fn find_file(&self, id: &str) -> Result<Option<FileNode>>;

    /// Finds a node only if it belongs to `owner_id`.
    async fn find_owned_file(&self, id: &str, owner_id: &str) -> Result<Option<FileNode>>;

    /// Children of `parent_id` owned by `owner_id`, in insertion order,
    /// windowed by `skip` and `limit`.
    async fn list_files(
        &self,
        owner_id: &str,
        parent_id: &ParentId,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<FileNode>>;

    /// Sets the visibility flag of an owned node and returns the updated
    /// record, or `None` when no owned node matches.
    async fn set_file_public(
        &self,
        id: &str,
        owner_id: &str,
        is_public: bool,
    ) -> Result<Option<FileNode>>;

    async fn count_files(&self) -> Result<usize>;
}

struct JsonCollection<T> {
    items: RwLock<Vec<T>>,
    path: Option<PathBuf>,
}

impl<T> JsonCollection<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    fn in_memory() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            path: None,
        }
    }

    fn load(path: PathBuf) -> Result<Self> {
        let items = if path.exists() {
            let data = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Vec::new()
        };

        Ok(Self {
            items: RwLock::new(items),
            path: Some(path),
        })
    }

    fn save_to_disk(&self, items: &[T]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(items).context("Failed to serialize collection")?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

pub struct JsonDocumentStore {
    users: JsonCollection<User>,
    files: JsonCollection<FileNode>,
}

impl JsonDocumentStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            users: JsonCollection::in_memory(),
            files: JsonCollection::in_memory(),
        }
    }

    /// Opens (or creates) a store persisted under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;

        Ok(Self {
            users: JsonCollection::load(dir.join(USERS_FILE))?,
            files: JsonCollection::load(dir.join(FILES_FILE))?,
        })
    }
}

#[async_trait]
impl DocumentStore for JsonDocumentStore {
    async fn insert_user(&self, user: User) -> Result<bool> {
        let mut users = self.users.items.write().await;

        if users.iter().any(|u| u.email == user.email) {
            return Ok(false);
        }

        users.push(user);
        if let Err(e) = self.users.save_to_disk(&users) {
            users.pop();
            return Err(e);
        }
        Ok(true)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.items.read().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let users = self.users.items.read().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn count_users(&self) -> Result<usize> {
        Ok(self.users.items.read().await.len())
    }

    async fn insert_file(&self, file: FileNode) -> Result<()> {
        let mut files = self.files.items.write().await;
        files.push(file);
        if let Err(e) = self.files.save_to_disk(&files) {
            files.pop();
            return Err(e);
        }
        Ok(())
    }

    async fn find_file(&self, id: &str) -> Result<Option<FileNode>> {
        let files = self.files.items.read().await;
        Ok(files.iter().find(|f| f.id == id).cloned())
    }

    async fn find_owned_file(&self, id: &str, owner_id: &str) -> Result<Option<FileNode>> {
        let files = self.files.items.read().await;
        Ok(files
            .iter()
            .find(|f| f.id == id && f.user_id == owner_id)
            .cloned())
    }

    async fn list_files(
        &self,
        owner_id: &str,
        parent_id: &ParentId,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<FileNode>> {
        let files = self.files.items.read().await;
        Ok(files
            .iter()
            .filter(|f| f.user_id == owner_id && &f.parent_id == parent_id)
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn set_file_public(
        &self,
        id: &str,
        owner_id: &str,
        is_public: bool,
    ) -> Result<Option<FileNode>> {
        let mut files = self.files.items.write().await;

        let Some(file) = files
            .iter_mut()
            .find(|f| f.id == id && f.user_id == owner_id)
        else {
            return Ok(None);
        };

        if file.is_public == is_public {
            return Ok(Some(file.clone()));
        }

        file.is_public = is_public;
        let updated = file.clone();
        if let Err(e) = self.files.save_to_disk(&files) {
            if let Some(file) = files.iter_mut().find(|f| f.id == id) {
                file.is_public = !is_public;
            }
            return Err(e);
        }
        Ok(Some(updated))
    }

    async fn count_files(&self) -> Result<usize> {
        Ok(self.files.items.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileKind;

    fn folder(owner: &str, name: &str, parent: ParentId) -> FileNode {
        FileNode::new(
            owner.to_string(),
            name.to_string(),
            FileKind::Folder,
            parent,
            false,
            None,
        )
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = JsonDocumentStore::in_memory();
        assert!(store
            .insert_user(User::new("a@b.c".to_string(), "h".to_string()))
            .await
            .unwrap());
        assert!(!store
            .insert_user(User::new("a@b.c".to_string(), "h2".to_string()))
            .await
            .unwrap());
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_owned_file_checks_owner() {
        let store = JsonDocumentStore::in_memory();
        let node = folder("alice", "docs", ParentId::Root);
        let id = node.id.clone();
        store.insert_file(node).await.unwrap();

        assert!(store.find_owned_file(&id, "alice").await.unwrap().is_some());
        assert!(store.find_owned_file(&id, "bob").await.unwrap().is_none());
        assert!(store.find_file(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_files_window_and_order() {
        let store = JsonDocumentStore::in_memory();
        for i in 0..5 {
            store
                .insert_file(folder("alice", &format!("f{i}"), ParentId::Root))
                .await
                .unwrap();
        }
        store
            .insert_file(folder("bob", "other", ParentId::Root))
            .await
            .unwrap();

        let page = store
            .list_files("alice", &ParentId::Root, 2, 2)
            .await
            .unwrap();
        let names: Vec<_> = page.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["f2", "f3"]);

        let beyond = store
            .list_files("alice", &ParentId::Root, 10, 2)
            .await
            .unwrap();
        assert!(beyond.is_empty());
    }

    #[tokio::test]
    async fn test_set_file_public_idempotent() {
        let store = JsonDocumentStore::in_memory();
        let node = folder("alice", "docs", ParentId::Root);
        let id = node.id.clone();
        store.insert_file(node).await.unwrap();

        let first = store.set_file_public(&id, "alice", true).await.unwrap();
        let second = store.set_file_public(&id, "alice", true).await.unwrap();
        assert_eq!(first, second);
        assert!(first.unwrap().is_public);

        assert!(store
            .set_file_public(&id, "bob", false)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let node = folder("alice", "docs", ParentId::Root);
        let id = node.id.clone();

        {
            let store = JsonDocumentStore::open(dir.path()).unwrap();
            store
                .insert_user(User::new("a@b.c".to_string(), "h".to_string()))
                .await
                .unwrap();
            store.insert_file(node).await.unwrap();
        }

        let reopened = JsonDocumentStore::open(dir.path()).unwrap();
        assert_eq!(reopened.count_users().await.unwrap(), 1);
        assert!(reopened.find_file(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let store = JsonDocumentStore::open(&data).unwrap();
        let docs = folder("alice", "docs", ParentId::Root);
        let docs_id = docs.id.clone();
        store.insert_file(docs).await.unwrap();

        fs::remove_dir_all(&data).unwrap();

        let node = folder("alice", "lost", ParentId::Root);
        let id = node.id.clone();
        assert!(store.insert_file(node).await.is_err());
        assert!(store.find_file(&id).await.unwrap().is_none());
        assert_eq!(store.count_files().await.unwrap(), 1);

        assert!(store
            .insert_user(User::new("a@b.c".to_string(), "h".to_string()))
            .await
            .is_err());
        assert!(store.find_user_by_email("a@b.c").await.unwrap().is_none());

        assert!(store.set_file_public(&docs_id, "alice", true).await.is_err());
        let docs = store.find_file(&docs_id).await.unwrap().unwrap();
        assert!(!docs.is_public);
    }
}
