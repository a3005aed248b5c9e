//! Job consumer: thumbnail generation and welcome notifications.
//!
//! Each delivery goes `received -> validated -> processed -> acknowledged`,
//! or ends as a reported failure handed back to the queue. Reprocessing a
//! thumbnail job simply overwrites the derived blobs.

use crate::blob::{BlobStorage, THUMBNAIL_WIDTHS};
use crate::error::JobError;
use crate::jobs::{Delivery, Job, JobQueue, ThumbnailPayload, WelcomePayload};
use crate::resize::Resizer;
use crate::storage::DocumentStore;
use anyhow::{anyhow, Context};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

pub struct Worker {
    store: Arc<dyn DocumentStore>,
    blobs: BlobStorage,
    resizer: Arc<dyn Resizer>,
    concurrency: usize,
}

impl Worker {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blobs: BlobStorage,
        resizer: Arc<dyn Resizer>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            blobs,
            resizer,
            concurrency: concurrency.max(1),
        }
    }

    /// Processes one job. Does not touch the queue.
    pub async fn process(&self, job: &Job) -> Result<(), JobError> {
        match job {
            Job::Thumbnail(payload) => self.generate_thumbnails(payload).await,
            Job::Welcome(payload) => self.send_welcome(payload).await,
        }
    }

    /// Consumer loop. Runs until the task is dropped.
    pub async fn run(self: Arc<Self>, queue: Arc<dyn JobQueue>) {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        info!(concurrency = self.concurrency, "worker is running");

        loop {
            let delivery = match queue.pop().await {
                Ok(delivery) => delivery,
                Err(e) => {
                    error!("failed to receive job: {e:#}");
                    sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };

            let worker = self.clone();
            let queue = queue.clone();
            tokio::spawn(async move {
                worker.handle(queue.as_ref(), delivery).await;
                drop(permit);
            });
        }
    }

    async fn handle(&self, queue: &dyn JobQueue, delivery: Delivery) {
        debug!(id = delivery.id, attempt = delivery.attempt, channel = delivery.job.channel(), "job received");

        let outcome = match self.process(&delivery.job).await {
            Ok(()) => queue.ack(&delivery).await,
            Err(e) => {
                warn!(id = delivery.id, channel = delivery.job.channel(), "job failed: {e}");
                queue.fail(&delivery, &e.to_string()).await
            }
        };

        if let Err(e) = outcome {
            error!(id = delivery.id, "failed to settle job: {e:#}");
        }
    }

    async fn generate_thumbnails(&self, payload: &ThumbnailPayload) -> Result<(), JobError> {
        let file_id = payload.file_id.as_deref().ok_or(JobError::MissingFileId)?;
        let user_id = payload.user_id.as_deref().ok_or(JobError::MissingUserId)?;

        let node = self
            .store
            .find_owned_file(file_id, user_id)
            .await?
            .ok_or(JobError::FileNotFound)?;
        let local_path = node.local_path.ok_or(JobError::FileNotFound)?;

        let source = self
            .blobs
            .read(&local_path)
            .await
            .with_context(|| format!("Failed to read source blob {local_path}"))?;
        let source = Arc::new(source);

        for width in THUMBNAIL_WIDTHS {
            let resizer = self.resizer.clone();
            let bytes = source.clone();
            let thumbnail = tokio::task::spawn_blocking(move || resizer.resize(&bytes, width))
                .await
                .map_err(|e| JobError::Resize {
                    width,
                    source: anyhow!(e),
                })?
                .map_err(|source| JobError::Resize { width, source })?;

            let target = BlobStorage::variant_path(&local_path, width);
            self.blobs
                .write(&target, &thumbnail)
                .await
                .with_context(|| format!("Failed to write thumbnail {target}"))?;
        }

        info!(file_id, "thumbnails generated");
        Ok(())
    }

    async fn send_welcome(&self, payload: &WelcomePayload) -> Result<(), JobError> {
        let user_id = payload.user_id.as_deref().ok_or(JobError::MissingUserId)?;

        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(JobError::UserNotFound)?;

        info!(user_id, "Welcome {}!", user.email);
        Ok(())
    }
}
