//! Single-use, hashed, time-boxed tokens.
//!
//! One component serves password reset, email confirmation and organization
//! invites. Each token moves `issued -> consumed | expired`; both end states
//! are terminal. Only the SHA-256 digest of the raw secret is persisted, and
//! at most one token per subject (and scope) is outstanding at a time.

use std::future::Future;
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::AuthError;
use super::hasher::{lookup_digest, random_hex};
use crate::clock::Clock;
use crate::models::auth::{SingleUseRecord, TokenFlow};
use crate::store::Store;

/// Random bytes per secret (256 bits).
const SECRET_BYTES: usize = 32;

/// A freshly issued token. `secret` goes into a link exactly once.
#[derive(Debug)]
pub struct IssuedToken {
    pub secret: String,
    pub record: SingleUseRecord,
}

/// Issues and consumes the tokens of one flow.
#[derive(Clone)]
pub struct SingleUseTokens {
    flow: TokenFlow,
    ttl: Duration,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl SingleUseTokens {
    pub fn new(flow: TokenFlow, ttl: Duration, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            flow,
            ttl,
            store,
            clock,
        }
    }

    /// Issue a token for a user, invalidating any outstanding one.
    pub async fn issue_for_user(&self, user_id: Uuid) -> Result<IssuedToken, AuthError> {
        self.issue(&user_id.to_string(), None, serde_json::Value::Null)
            .await
    }

    /// Issue a token for `subject` within `scope_id`.
    ///
    /// Outstanding tokens for the same flow, subject and scope are marked used
    /// before the new record is inserted.
    pub async fn issue(
        &self,
        subject: &str,
        scope_id: Option<Uuid>,
        payload: serde_json::Value,
    ) -> Result<IssuedToken, AuthError> {
        let now = self.clock.now();
        let secret = random_hex(SECRET_BYTES);

        let invalidated = self
            .store
            .invalidate_outstanding_tokens(self.flow, subject, scope_id, now)
            .await?;
        if invalidated > 0 {
            debug!(flow = %self.flow, invalidated, "invalidated outstanding tokens");
        }

        let record = SingleUseRecord {
            id: Uuid::now_v7(),
            flow: self.flow,
            subject: subject.to_string(),
            scope_id,
            token_hash: lookup_digest(&secret),
            payload,
            created_at: now,
            expires_at: now + self.ttl,
            used_at: None,
        };
        self.store.insert_single_use_token(&record).await?;
        info!(flow = %self.flow, token_id = %record.id, "issued single-use token");

        Ok(IssuedToken { secret, record })
    }

    /// Look up a still-usable token without consuming it.
    pub async fn peek(&self, secret: &str) -> Result<SingleUseRecord, AuthError> {
        self.store
            .find_active_single_use_token(self.flow, &lookup_digest(secret), self.clock.now())
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)
    }

    /// Consume a token. Succeeds at most once per token.
    pub async fn consume(&self, secret: &str) -> Result<SingleUseRecord, AuthError> {
        let record = self
            .store
            .consume_single_use_token(self.flow, &lookup_digest(secret), self.clock.now())
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        info!(flow = %self.flow, token_id = %record.id, "consumed single-use token");
        Ok(record)
    }

    /// Consume a token, then run the action it authorizes.
    ///
    /// The token stays consumed when `action` fails; the same link cannot be
    /// replayed to retry.
    pub async fn consume_with<T, F, Fut>(&self, secret: &str, action: F) -> Result<T, AuthError>
    where
        F: FnOnce(SingleUseRecord) -> Fut,
        Fut: Future<Output = Result<T, AuthError>>,
    {
        let record = self.consume(secret).await?;
        action(record).await
    }

    /// Outstanding tokens within an organization, newest first.
    pub async fn list_outstanding(&self, scope_id: Uuid) -> Result<Vec<SingleUseRecord>, AuthError> {
        self.store
            .list_active_single_use_tokens(self.flow, scope_id, self.clock.now())
            .await
    }

    /// Invalidate one outstanding token within an organization.
    pub async fn revoke(&self, scope_id: Uuid, id: Uuid) -> Result<(), AuthError> {
        let revoked = self
            .store
            .invalidate_single_use_token(self.flow, scope_id, id, self.clock.now())
            .await?;
        if !revoked {
            return Err(AuthError::NotFound("Token not found".into()));
        }
        info!(flow = %self.flow, token_id = %id, "revoked single-use token");
        Ok(())
    }
}
