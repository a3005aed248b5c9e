//! Token sessions on top of the session cache.
//!
//! A successful login stores `auth_{token} -> user id` with an absolute TTL.
//! Tokens are never renewed; once the entry expires or is deleted the token
//! is dead for good.

use crate::cache::SessionCache;
use crate::error::SessionError;
use crate::storage::DocumentStore;
use crate::users::verify_password;
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

pub const SESSION_TTL: Duration = Duration::from_secs(86_400);

pub fn session_key(token: &str) -> String {
    format!("auth_{token}")
}

/// Decodes `"<scheme> base64(email:password)"`, splitting on the first colon.
pub fn decode_basic_credentials(header: &str) -> Result<(String, String), SessionError> {
    let (_scheme, encoded) = header
        .trim()
        .split_once(' ')
        .ok_or(SessionError::MalformedCredentials)?;

    let decoded = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| SessionError::MalformedCredentials)?;
    let decoded = String::from_utf8(decoded).map_err(|_| SessionError::MalformedCredentials)?;

    let (email, password) = decoded
        .split_once(':')
        .ok_or(SessionError::MalformedCredentials)?;

    Ok((email.to_string(), password.to_string()))
}

pub struct SessionManager {
    cache: Arc<dyn SessionCache>,
    store: Arc<dyn DocumentStore>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(cache: Arc<dyn SessionCache>, store: Arc<dyn DocumentStore>) -> Self {
        Self::with_ttl(cache, store, SESSION_TTL)
    }

    pub fn with_ttl(
        cache: Arc<dyn SessionCache>,
        store: Arc<dyn DocumentStore>,
        ttl: Duration,
    ) -> Self {
        Self { cache, store, ttl }
    }

    pub async fn login(&self, auth_header: &str) -> Result<String, SessionError> {
        let (email, password) = decode_basic_credentials(auth_header)?;

        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(SessionError::InvalidCredentials)?;

        if !verify_password(&password, &user.password_hash) {
            return Err(SessionError::InvalidCredentials);
        }

        let token = Uuid::new_v4().to_string();
        self.cache
            .set(&session_key(&token), user.id.clone(), self.ttl)
            .await?;
        debug!(user_id = %user.id, "session opened");

        Ok(token)
    }

    /// Resolves a token to its user id. Cache failures resolve to `None`,
    /// which callers treat as unauthorized.
    pub async fn resolve(&self, token: &str) -> Option<String> {
        match self.cache.get(&session_key(token)).await {
            Ok(user_id) => user_id,
            Err(e) => {
                warn!("session lookup failed: {e:#}");
                None
            }
        }
    }

    pub async fn logout(&self, token: &str) -> Result<(), SessionError> {
        if self.cache.del(&session_key(token)).await? {
            debug!("session closed");
            Ok(())
        } else {
            Err(SessionError::NotFound)
        }
    }
}
