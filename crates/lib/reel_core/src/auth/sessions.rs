//! Refresh session store: one revocable server-side record per refresh token.
//!
//! Rotation makes every refresh token single-use. A replayed token fails as
//! soon as either party has rotated it, which surfaces theft as a failed
//! refresh for the legitimate client instead of a silent takeover.

use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::AuthError;
use super::hasher::{lookup_digest, random_hex};
use crate::clock::Clock;
use crate::models::auth::{RefreshSessionRecord, SessionClaims};
use crate::store::Store;

/// Random bytes per session id (128 bits).
const SESSION_ID_BYTES: usize = 16;

/// A freshly created session. `token_id` goes into the refresh token's `jti`
/// and is never persisted.
#[derive(Debug, Clone)]
pub struct OpenedSession {
    pub token_id: String,
    pub record: RefreshSessionRecord,
}

#[derive(Clone)]
pub struct RefreshSessions {
    ttl: Duration,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl RefreshSessions {
    pub fn new(ttl: Duration, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { ttl, store, clock }
    }

    /// Persist a new session. The record exists before any token names it.
    pub async fn create(&self, user_id: Uuid) -> Result<OpenedSession, AuthError> {
        let token_id = random_hex(SESSION_ID_BYTES);
        let record = RefreshSessionRecord {
            token_hash: lookup_digest(&token_id),
            user_id,
            expires_at: self.clock.now() + self.ttl,
            revoked: false,
            revoked_at: None,
        };
        self.store.insert_refresh_session(&record).await?;
        Ok(OpenedSession { token_id, record })
    }

    /// Require a live (present, unrevoked, unexpired) session for the pair.
    pub async fn validate(
        &self,
        user_id: Uuid,
        token_id: &str,
    ) -> Result<RefreshSessionRecord, AuthError> {
        self.store
            .find_refresh_session(user_id, &lookup_digest(token_id))
            .await?
            .filter(|s| s.is_active(self.clock.now()))
            .ok_or(AuthError::InvalidSession)
    }

    /// Revoke a session. Revoking twice is a no-op.
    pub async fn revoke(&self, token_id: &str) -> Result<(), AuthError> {
        self.store
            .revoke_refresh_session(&lookup_digest(token_id), self.clock.now())
            .await?;
        Ok(())
    }

    /// Revoke every live session of a user.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let revoked = self
            .store
            .revoke_user_refresh_sessions(user_id, self.clock.now())
            .await?;
        info!(%user_id, revoked, "revoked all refresh sessions");
        Ok(revoked)
    }

    /// Exchange the session named by verified refresh claims for a new one.
    ///
    /// The old session is revoked with a conditional write; only the caller
    /// that performs that transition receives a new session.
    pub async fn rotate(&self, claims: &SessionClaims) -> Result<OpenedSession, AuthError> {
        let token_id = claims
            .token_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(AuthError::InvalidSession)?;

        if let Err(e) = self.validate(claims.user_id, token_id).await {
            if matches!(e, AuthError::InvalidSession) {
                warn!(user_id = %claims.user_id, "refresh rejected: session revoked, expired or unknown");
            }
            return Err(e);
        }

        let revoked = self
            .store
            .revoke_refresh_session(&lookup_digest(token_id), self.clock.now())
            .await?;
        if !revoked {
            warn!(user_id = %claims.user_id, "refresh rejected: session rotated concurrently");
            return Err(AuthError::InvalidSession);
        }

        self.create(claims.user_id).await
    }
}
