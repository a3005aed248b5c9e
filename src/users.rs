//! User registration and lookup.

use crate::error::UserError;
use crate::jobs::{Job, JobQueue};
use crate::storage::DocumentStore;
use crate::user_models::User;
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

pub fn hash_password(password: &str, cost: u32) -> anyhow::Result<String> {
    bcrypt::hash(password, cost).context("Failed to hash password")
}

/// A stored hash that bcrypt cannot parse never verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

pub struct UserService {
    store: Arc<dyn DocumentStore>,
    queue: Arc<dyn JobQueue>,
    hash_cost: u32,
}

impl UserService {
    pub fn new(store: Arc<dyn DocumentStore>, queue: Arc<dyn JobQueue>, hash_cost: u32) -> Self {
        Self {
            store,
            queue,
            hash_cost,
        }
    }

    /// Creates a user and enqueues their welcome job.
    pub async fn register(
        &self,
        email: Option<String>,
        password: Option<String>,
    ) -> Result<User, UserError> {
        let email = email
            .filter(|e| !e.trim().is_empty())
            .ok_or(UserError::MissingEmail)?;
        let password = password
            .filter(|p| !p.is_empty())
            .ok_or(UserError::MissingPassword)?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(UserError::Conflict);
        }

        let password_hash = hash_password(&password, self.hash_cost)?;
        let user = User::new(email, password_hash);

        if !self.store.insert_user(user.clone()).await? {
            return Err(UserError::Conflict);
        }
        info!(user_id = %user.id, "registered user");

        if let Err(e) = self.queue.push(Job::welcome(&user.id)).await {
            warn!(user_id = %user.id, "failed to enqueue welcome job: {e:#}");
        }

        Ok(user)
    }

    pub async fn find(&self, user_id: &str) -> Result<Option<User>, UserError> {
        Ok(self.store.find_user_by_id(user_id).await?)
    }
}
