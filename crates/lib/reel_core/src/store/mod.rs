//! Persistence seams for identity records.
//!
//! Every time-dependent query takes `now` from the caller so the same clock
//! drives minting, storage and expiry checks.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::AuthError;
use crate::models::auth::{
    ApiKeyRecord, RefreshSessionRecord, Role, SingleUseRecord, TokenFlow, User, UserWithPassword,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Outcome of a guarded membership write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Applied,
    NotMember,
    /// Refused: the organization would be left without an owner.
    LastOwner,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user with an unverified email. Fails with `Conflict` if the email is taken.
    async fn create_user(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError>;

    async fn find_user_by_email(&self, email: &str)
    -> Result<Option<UserWithPassword>, AuthError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError>;

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str)
    -> Result<(), AuthError>;

    /// Mark the email verified. Keeps the first verification time.
    async fn mark_email_verified(&self, user_id: Uuid, now: DateTime<Utc>)
    -> Result<(), AuthError>;
}

#[async_trait]
pub trait RefreshSessionStore: Send + Sync {
    async fn insert_refresh_session(&self, record: &RefreshSessionRecord)
    -> Result<(), AuthError>;

    async fn find_refresh_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<RefreshSessionRecord>, AuthError>;

    /// Revoke one session. Returns `true` only for the call that flipped `revoked`.
    async fn revoke_refresh_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError>;

    /// Revoke every live session of a user, returning how many were revoked.
    async fn revoke_user_refresh_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError>;
}

#[async_trait]
pub trait SingleUseTokenStore: Send + Sync {
    /// Mark every outstanding token of `flow` for `subject` (within `scope_id`) as used.
    async fn invalidate_outstanding_tokens(
        &self,
        flow: TokenFlow,
        subject: &str,
        scope_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError>;

    async fn insert_single_use_token(&self, record: &SingleUseRecord) -> Result<(), AuthError>;

    /// Find an unused, unexpired token without consuming it.
    async fn find_active_single_use_token(
        &self,
        flow: TokenFlow,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SingleUseRecord>, AuthError>;

    /// Atomically flip `used_at` from null to `now` on an unexpired token.
    ///
    /// Returns the consumed record, or `None` if no caller may consume it.
    /// Two concurrent callers can never both receive `Some`.
    async fn consume_single_use_token(
        &self,
        flow: TokenFlow,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SingleUseRecord>, AuthError>;

    async fn list_active_single_use_tokens(
        &self,
        flow: TokenFlow,
        scope_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<SingleUseRecord>, AuthError>;

    /// Mark one outstanding token as used. Returns `false` if none matched.
    async fn invalidate_single_use_token(
        &self,
        flow: TokenFlow,
        scope_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError>;
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn count_api_keys(&self, user_id: Uuid) -> Result<usize, AuthError>;

    async fn insert_api_key(&self, record: &ApiKeyRecord, key_hash: &str)
    -> Result<(), AuthError>;

    async fn find_api_key_by_hash(&self, key_hash: &str)
    -> Result<Option<ApiKeyRecord>, AuthError>;

    async fn touch_api_key(&self, key_id: Uuid, now: DateTime<Utc>) -> Result<(), AuthError>;

    async fn list_api_keys(&self, user_id: Uuid) -> Result<Vec<ApiKeyRecord>, AuthError>;

    /// Delete a key owned by `user_id`. Returns `false` if no such key.
    async fn delete_api_key(&self, user_id: Uuid, key_id: Uuid) -> Result<bool, AuthError>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn find_member_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Role>, AuthError>;

    /// Add a member. Returns `false` if the user already belongs to the organization.
    async fn add_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<bool, AuthError>;

    /// Change a member's role, refusing to demote the last owner.
    async fn update_member_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<MembershipChange, AuthError>;

    /// Remove a member, refusing to remove the last owner.
    async fn remove_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<MembershipChange, AuthError>;
}

/// Everything the identity subsystem persists.
pub trait Store:
    UserStore + RefreshSessionStore + SingleUseTokenStore + ApiKeyStore + MembershipStore + 'static
{
}

impl<T> Store for T where
    T: UserStore + RefreshSessionStore + SingleUseTokenStore + ApiKeyStore + MembershipStore + 'static
{
}
