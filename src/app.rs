//! Wires the capabilities and services together from a [`Config`].

use crate::api::{self, AppState};
use crate::blob::BlobStorage;
use crate::cache::{MemoryCache, SessionCache};
use crate::config::Config;
use crate::files::FileTreeService;
use crate::jobs::{MemoryQueue, RedeliveryPolicy};
use crate::resize::{ImageResizer, Resizer};
use crate::session::SessionManager;
use crate::storage::{DocumentStore, JsonDocumentStore};
use crate::users::UserService;
use crate::worker::Worker;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How often expired sessions are purged from the in-process cache.
pub const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct App {
    pub state: Arc<AppState>,
    pub worker: Arc<Worker>,
    pub queue: Arc<MemoryQueue>,
    pub cache: Arc<MemoryCache>,
}

impl App {
    pub fn build(config: &Config) -> Result<Self> {
        Self::with_resizer(config, Arc::new(ImageResizer))
    }

    pub fn with_resizer(config: &Config, resizer: Arc<dyn Resizer>) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = match config.data_dir() {
            Some(dir) => Arc::new(JsonDocumentStore::open(dir)?),
            None => Arc::new(JsonDocumentStore::in_memory()),
        };
        let memory_cache = Arc::new(MemoryCache::new());
        let cache: Arc<dyn SessionCache> = memory_cache.clone();
        let queue = Arc::new(MemoryQueue::new(RedeliveryPolicy {
            max_attempts: config.job_max_attempts,
        }));
        let blobs = BlobStorage::new(&config.folder_path);

        let state = Arc::new(AppState {
            sessions: SessionManager::with_ttl(cache.clone(), store.clone(), config.session_ttl()),
            users: UserService::new(store.clone(), queue.clone(), config.bcrypt_cost),
            files: FileTreeService::new(store.clone(), blobs.clone(), queue.clone()),
            store: store.clone(),
            cache,
        });

        let worker = Arc::new(Worker::new(
            store,
            blobs,
            resizer,
            config.worker_concurrency,
        ));

        Ok(Self {
            state,
            worker,
            queue,
            cache: memory_cache,
        })
    }

    pub fn router(&self) -> Router {
        api::router(self.state.clone())
    }

    /// Starts the job consumer on its own task.
    pub fn spawn_worker(&self) -> JoinHandle<()> {
        tokio::spawn(self.worker.clone().run(self.queue.clone()))
    }

    /// Starts the periodic purge of expired sessions.
    pub fn spawn_cache_sweeper(&self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(self.cache.clone().run_sweeper(period))
    }
}
