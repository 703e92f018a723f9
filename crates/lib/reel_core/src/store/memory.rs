//! In-process store for tests and local development.
//!
//! All state sits behind one mutex, so every method is a single critical
//! section and the conditional writes are trivially atomic.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    ApiKeyStore, MembershipChange, MembershipStore, RefreshSessionStore, SingleUseTokenStore,
    UserStore,
};
use crate::auth::AuthError;
use crate::models::auth::{
    ApiKeyRecord, RefreshSessionRecord, Role, SingleUseRecord, TokenFlow, User, UserWithPassword,
};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, UserWithPassword>,
    sessions: HashMap<String, RefreshSessionRecord>,
    tokens: Vec<SingleUseRecord>,
    api_keys: Vec<(ApiKeyRecord, String)>,
    members: HashMap<(Uuid, Uuid), Role>,
}

impl State {
    fn owner_count(&self, organization_id: Uuid) -> usize {
        self.members
            .iter()
            .filter(|((org, _), role)| *org == organization_id && **role == Role::Owner)
            .count()
    }
}

/// `Store` implementation backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        let mut state = self.state();
        if state.users.values().any(|u| u.user.email == email) {
            return Err(AuthError::Conflict("Email already registered".into()));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
            email_verified_at: None,
            created_at: now,
        };
        state.users.insert(
            user.id,
            UserWithPassword {
                user: user.clone(),
                password_hash: password_hash.to_string(),
            },
        );
        Ok(user)
    }

    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserWithPassword>, AuthError> {
        Ok(self
            .state()
            .users
            .values()
            .find(|u| u.user.email == email)
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        Ok(self.state().users.get(&user_id).map(|u| u.user.clone()))
    }

    async fn set_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), AuthError> {
        let mut state = self.state();
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AuthError::NotFound("User not found".into()))?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn mark_email_verified(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut state = self.state();
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AuthError::NotFound("User not found".into()))?;
        user.user.email_verified_at.get_or_insert(now);
        Ok(())
    }
}

#[async_trait]
impl RefreshSessionStore for MemoryStore {
    async fn insert_refresh_session(
        &self,
        record: &RefreshSessionRecord,
    ) -> Result<(), AuthError> {
        let mut state = self.state();
        if state.sessions.contains_key(&record.token_hash) {
            return Err(AuthError::Internal("duplicate refresh session id".into()));
        }
        state
            .sessions
            .insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_refresh_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<RefreshSessionRecord>, AuthError> {
        Ok(self
            .state()
            .sessions
            .get(token_hash)
            .filter(|s| s.user_id == user_id)
            .cloned())
    }

    async fn revoke_refresh_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let mut state = self.state();
        match state.sessions.get_mut(token_hash) {
            Some(session) if !session.revoked => {
                session.revoked = true;
                session.revoked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_user_refresh_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let mut state = self.state();
        let mut revoked = 0;
        for session in state
            .sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && !s.revoked)
        {
            session.revoked = true;
            session.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }
}

#[async_trait]
impl SingleUseTokenStore for MemoryStore {
    async fn invalidate_outstanding_tokens(
        &self,
        flow: TokenFlow,
        subject: &str,
        scope_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let mut state = self.state();
        let mut invalidated = 0;
        for token in state.tokens.iter_mut().filter(|t| {
            t.flow == flow && t.subject == subject && t.scope_id == scope_id && t.used_at.is_none()
        }) {
            token.used_at = Some(now);
            invalidated += 1;
        }
        Ok(invalidated)
    }

    async fn insert_single_use_token(&self, record: &SingleUseRecord) -> Result<(), AuthError> {
        let mut state = self.state();
        if state.tokens.iter().any(|t| t.token_hash == record.token_hash) {
            return Err(AuthError::Internal("duplicate single-use token hash".into()));
        }
        state.tokens.push(record.clone());
        Ok(())
    }

    async fn find_active_single_use_token(
        &self,
        flow: TokenFlow,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SingleUseRecord>, AuthError> {
        Ok(self
            .state()
            .tokens
            .iter()
            .find(|t| t.flow == flow && t.token_hash == token_hash && t.is_active(now))
            .cloned())
    }

    async fn consume_single_use_token(
        &self,
        flow: TokenFlow,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SingleUseRecord>, AuthError> {
        let mut state = self.state();
        let Some(token) = state
            .tokens
            .iter_mut()
            .find(|t| t.flow == flow && t.token_hash == token_hash && t.is_active(now))
        else {
            return Ok(None);
        };
        token.used_at = Some(now);
        Ok(Some(token.clone()))
    }

    async fn list_active_single_use_tokens(
        &self,
        flow: TokenFlow,
        scope_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<SingleUseRecord>, AuthError> {
        let mut tokens: Vec<_> = self
            .state()
            .tokens
            .iter()
            .filter(|t| t.flow == flow && t.scope_id == Some(scope_id) && t.is_active(now))
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tokens)
    }

    async fn invalidate_single_use_token(
        &self,
        flow: TokenFlow,
        scope_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let mut state = self.state();
        match state.tokens.iter_mut().find(|t| {
            t.id == id && t.flow == flow && t.scope_id == Some(scope_id) && t.used_at.is_none()
        }) {
            Some(token) => {
                token.used_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn count_api_keys(&self, user_id: Uuid) -> Result<usize, AuthError> {
        Ok(self
            .state()
            .api_keys
            .iter()
            .filter(|(k, _)| k.user_id == user_id)
            .count())
    }

    async fn insert_api_key(
        &self,
        record: &ApiKeyRecord,
        key_hash: &str,
    ) -> Result<(), AuthError> {
        let mut state = self.state();
        if state.api_keys.iter().any(|(_, h)| h == key_hash) {
            return Err(AuthError::Internal("duplicate API key hash".into()));
        }
        state.api_keys.push((record.clone(), key_hash.to_string()));
        Ok(())
    }

    async fn find_api_key_by_hash(
        &self,
        key_hash: &str,
    ) -> Result<Option<ApiKeyRecord>, AuthError> {
        Ok(self
            .state()
            .api_keys
            .iter()
            .find(|(_, h)| h == key_hash)
            .map(|(k, _)| k.clone()))
    }

    async fn touch_api_key(&self, key_id: Uuid, now: DateTime<Utc>) -> Result<(), AuthError> {
        if let Some((key, _)) = self
            .state()
            .api_keys
            .iter_mut()
            .find(|(k, _)| k.id == key_id)
        {
            key.last_used_at = Some(now);
        }
        Ok(())
    }

    async fn list_api_keys(&self, user_id: Uuid) -> Result<Vec<ApiKeyRecord>, AuthError> {
        let mut keys: Vec<_> = self
            .state()
            .api_keys
            .iter()
            .filter(|(k, _)| k.user_id == user_id)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn delete_api_key(&self, user_id: Uuid, key_id: Uuid) -> Result<bool, AuthError> {
        let mut state = self.state();
        let before = state.api_keys.len();
        state
            .api_keys
            .retain(|(k, _)| !(k.id == key_id && k.user_id == user_id));
        Ok(state.api_keys.len() < before)
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn find_member_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Role>, AuthError> {
        Ok(self
            .state()
            .members
            .get(&(organization_id, user_id))
            .copied())
    }

    async fn add_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<bool, AuthError> {
        let mut state = self.state();
        let key = (organization_id, user_id);
        if state.members.contains_key(&key) {
            return Ok(false);
        }
        state.members.insert(key, role);
        Ok(true)
    }

    async fn update_member_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<MembershipChange, AuthError> {
        let mut state = self.state();
        let Some(current) = state.members.get(&(organization_id, user_id)).copied() else {
            return Ok(MembershipChange::NotMember);
        };
        if current == Role::Owner && role != Role::Owner && state.owner_count(organization_id) <= 1
        {
            return Ok(MembershipChange::LastOwner);
        }
        state.members.insert((organization_id, user_id), role);
        Ok(MembershipChange::Applied)
    }

    async fn remove_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<MembershipChange, AuthError> {
        let mut state = self.state();
        let Some(current) = state.members.get(&(organization_id, user_id)).copied() else {
            return Ok(MembershipChange::NotMember);
        };
        if current == Role::Owner && state.owner_count(organization_id) <= 1 {
            return Ok(MembershipChange::LastOwner);
        }
        state.members.remove(&(organization_id, user_id));
        Ok(MembershipChange::Applied)
    }
}
