//! Background jobs and the queue that delivers them.
//!
//! Delivery is at-least-once: a job stays in flight until it is acked, and
//! in-flight jobs can be handed out again after a consumer dies. Whether a
//! failed attempt is retried is decided by the queue's [`RedeliveryPolicy`],
//! never by the worker.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

pub const THUMBNAIL_CHANNEL: &str = "thumbnails";
pub const WELCOME_CHANNEL: &str = "welcome";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailPayload {
    pub user_id: Option<String>,
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Job {
    Thumbnail(ThumbnailPayload),
    Welcome(WelcomePayload),
}

impl Job {
    pub fn thumbnail(user_id: &str, file_id: &str) -> Self {
        Job::Thumbnail(ThumbnailPayload {
            user_id: Some(user_id.to_string()),
            file_id: Some(file_id.to_string()),
        })
    }

    pub fn welcome(user_id: &str) -> Self {
        Job::Welcome(WelcomePayload {
            user_id: Some(user_id.to_string()),
        })
    }

    pub fn channel(&self) -> &'static str {
        match self {
            Job::Thumbnail(_) => THUMBNAIL_CHANNEL,
            Job::Welcome(_) => WELCOME_CHANNEL,
        }
    }
}

/// One hand-out of a job to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: u64,
    pub job: Job,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: u32,
}

#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    async fn push(&self, job: Job) -> Result<()>;

    /// Waits for the next job.
    async fn pop(&self) -> Result<Delivery>;

    /// Marks a delivery as done.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Reports a failed attempt. The queue decides whether to retry.
    async fn fail(&self, delivery: &Delivery, reason: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct RedeliveryPolicy {
    /// Total deliveries allowed per job; 1 means failures are terminal.
    pub max_attempts: u32,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self { max_attempts: 1 }
    }
}

#[derive(Default)]
struct QueueState {
    next_id: u64,
    pending: VecDeque<Delivery>,
    in_flight: HashMap<u64, Delivery>,
    dead_letters: Vec<(Job, String)>,
}

/// In-process FIFO queue covering both job channels.
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    policy: RedeliveryPolicy,
}

impl MemoryQueue {
    pub fn new(policy: RedeliveryPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            policy,
        }
    }

    pub async fn pending(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn pending_on(&self, channel: &str) -> usize {
        self.state
            .lock()
            .await
            .pending
            .iter()
            .filter(|d| d.job.channel() == channel)
            .count()
    }

    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Jobs that exhausted their attempts, with the last failure reason.
    pub async fn dead_letters(&self) -> Vec<(Job, String)> {
        self.state.lock().await.dead_letters.clone()
    }

    /// Puts every unacknowledged delivery back in front of the queue, as a
    /// broker does when a consumer's connection drops. Returns the count.
    pub async fn recover_in_flight(&self) -> usize {
        let mut state = self.state.lock().await;
        let mut recovered: Vec<Delivery> = state.in_flight.drain().map(|(_, d)| d).collect();
        recovered.sort_by_key(|d| d.id);

        let count = recovered.len();
        for delivery in recovered.into_iter().rev() {
            state.pending.push_front(delivery);
        }
        drop(state);

        for _ in 0..count {
            self.notify.notify_one();
        }
        count
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn push(&self, job: Job) -> Result<()> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let delivery = Delivery {
            id: state.next_id,
            job,
            attempt: 0,
        };
        debug!(id = delivery.id, channel = delivery.job.channel(), "job queued");
        state.pending.push_back(delivery);
        drop(state);

        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self) -> Result<Delivery> {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(mut delivery) = state.pending.pop_front() {
                    delivery.attempt += 1;
                    state.in_flight.insert(delivery.id, delivery.clone());
                    return Ok(delivery);
                }
            }
            self.notify.notified().await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.state.lock().await.in_flight.remove(&delivery.id);
        Ok(())
    }

    async fn fail(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(failed) = state.in_flight.remove(&delivery.id) else {
            return Ok(());
        };

        if failed.attempt < self.policy.max_attempts {
            debug!(id = failed.id, attempt = failed.attempt, "job requeued");
            state.pending.push_back(failed);
            drop(state);
            self.notify.notify_one();
        } else {
            warn!(id = failed.id, channel = failed.job.channel(), "job dead-lettered: {reason}");
            state.dead_letters.push((failed.job, reason.to_string()));
        }
        Ok(())
    }
}
