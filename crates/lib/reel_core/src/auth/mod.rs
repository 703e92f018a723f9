//! Authentication and authorization logic.
//!
//! Provides secret hashing, session tokens, refresh sessions, single-use
//! tokens, API keys and organization role rules, shared by `reel_api`.

pub mod api_keys;
pub mod hasher;
pub mod jwt;
pub mod roles;
pub mod sessions;
pub mod settings;
pub mod single_use;

use std::sync::Arc;

use thiserror::Error;

use crate::clock::Clock;
use crate::models::auth::TokenFlow;
use crate::store::Store;

use self::api_keys::ApiKeyRegistry;
use self::hasher::SecretHasher;
use self::jwt::{TokenError, TokenService};
use self::roles::OrgMembers;
use self::sessions::RefreshSessions;
use self::settings::AuthSettings;
use self::single_use::SingleUseTokens;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    CredentialError,

    #[error("Email address not verified")]
    EmailNotVerified,

    #[error("{0}")]
    Token(#[from] TokenError),

    #[error("Invalid or expired session")]
    InvalidSession,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Every auth component, wired to one store and one clock.
#[derive(Clone)]
pub struct AuthContext {
    pub hasher: SecretHasher,
    pub tokens: TokenService,
    pub sessions: RefreshSessions,
    pub password_resets: SingleUseTokens,
    pub email_confirmations: SingleUseTokens,
    pub invites: SingleUseTokens,
    pub api_keys: ApiKeyRegistry,
    pub members: OrgMembers,
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
}

impl AuthContext {
    pub fn new(settings: &AuthSettings, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            hasher: SecretHasher::new(settings.bcrypt_cost),
            tokens: TokenService::new(
                settings.jwt_secret.as_bytes(),
                settings.access_ttl,
                settings.refresh_ttl,
                clock.clone(),
            ),
            sessions: RefreshSessions::new(settings.refresh_ttl, store.clone(), clock.clone()),
            password_resets: SingleUseTokens::new(
                TokenFlow::PasswordReset,
                settings.password_reset_ttl,
                store.clone(),
                clock.clone(),
            ),
            email_confirmations: SingleUseTokens::new(
                TokenFlow::EmailConfirmation,
                settings.email_confirmation_ttl,
                store.clone(),
                clock.clone(),
            ),
            invites: SingleUseTokens::new(
                TokenFlow::OrganizationInvite,
                settings.invite_ttl,
                store.clone(),
                clock.clone(),
            ),
            api_keys: ApiKeyRegistry::new(settings.api_key_cap, store.clone(), clock.clone()),
            members: OrgMembers::new(store.clone()),
            store,
            clock,
        }
    }
}
