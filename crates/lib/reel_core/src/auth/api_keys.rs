//! API key registry.
//!
//! Long-lived bearer credentials a user creates by hand. Keys are capped per
//! user, stored only as SHA-256 digests, and shown in full exactly once.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AuthError;
use super::hasher::{lookup_digest, random_hex};
use crate::clock::Clock;
use crate::models::auth::ApiKeyRecord;
use crate::store::Store;

/// Literal prefix identifying Reel API keys.
pub const API_KEY_PREFIX: &str = "reel_sk_";

/// Random bytes per key (256 bits, 64 hex chars).
const API_KEY_BYTES: usize = 32;

/// Length of a full raw key.
pub const API_KEY_LEN: usize = API_KEY_PREFIX.len() + API_KEY_BYTES * 2;

/// Default number of keys a user may hold.
pub const DEFAULT_API_KEY_CAP: usize = 10;

/// Longest accepted display name.
const MAX_DISPLAY_NAME_CHARS: usize = 64;

/// Upper bound on the detached `last_used_at` write.
const LAST_USED_UPDATE_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// Whether a bearer credential looks like an API key.
pub fn is_api_key(token: &str) -> bool {
    token.starts_with(API_KEY_PREFIX)
}

#[derive(Clone)]
pub struct ApiKeyRegistry {
    cap: usize,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl ApiKeyRegistry {
    pub fn new(cap: usize, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { cap, store, clock }
    }

    /// Create a key. Returns the raw key, which is never retrievable again.
    pub async fn generate(
        &self,
        user_id: Uuid,
        display_name: &str,
    ) -> Result<(String, ApiKeyRecord), AuthError> {
        let display_name = display_name.trim();
        if display_name.is_empty() || display_name.chars().count() > MAX_DISPLAY_NAME_CHARS {
            return Err(AuthError::ValidationError(format!(
                "API key name must be 1-{MAX_DISPLAY_NAME_CHARS} characters"
            )));
        }

        if self.store.count_api_keys(user_id).await? >= self.cap {
            return Err(AuthError::ValidationError(format!(
                "Maximum of {} API keys allowed",
                self.cap
            )));
        }

        let raw = format!("{API_KEY_PREFIX}{}", random_hex(API_KEY_BYTES));
        let record = ApiKeyRecord {
            id: Uuid::now_v7(),
            user_id,
            display_name: display_name.to_string(),
            created_at: self.clock.now(),
            last_used_at: None,
        };
        self.store
            .insert_api_key(&record, &lookup_digest(&raw))
            .await?;
        info!(%user_id, key_id = %record.id, "created API key");

        Ok((raw, record))
    }

    /// Resolve a raw key to its record.
    ///
    /// On success `last_used_at` is updated in a detached task. That write is
    /// best-effort: failures are logged and never affect the caller.
    pub async fn lookup(&self, raw: &str) -> Result<ApiKeyRecord, AuthError> {
        if !is_api_key(raw) {
            return Err(AuthError::InvalidApiKey);
        }

        let record = self
            .store
            .find_api_key_by_hash(&lookup_digest(raw))
            .await?
            .ok_or(AuthError::InvalidApiKey)?;

        let store = Arc::clone(&self.store);
        let key_id = record.id;
        let now = self.clock.now();
        tokio::spawn(async move {
            match tokio::time::timeout(LAST_USED_UPDATE_TIMEOUT, store.touch_api_key(key_id, now))
                .await
            {
                Ok(Ok(())) => debug!(%key_id, "updated API key last_used_at"),
                Ok(Err(e)) => warn!(%key_id, error = %e, "failed to update API key last_used_at"),
                Err(_) => warn!(%key_id, "API key last_used_at update timed out"),
            }
        });

        Ok(record)
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<ApiKeyRecord>, AuthError> {
        self.store.list_api_keys(user_id).await
    }

    /// Delete a key owned by `user_id`. Someone else's key is `NotFound`.
    pub async fn delete(&self, user_id: Uuid, key_id: Uuid) -> Result<(), AuthError> {
        if !self.store.delete_api_key(user_id, key_id).await? {
            return Err(AuthError::NotFound("API key not found".into()));
        }
        info!(%user_id, %key_id, "deleted API key");
        Ok(())
    }
}
