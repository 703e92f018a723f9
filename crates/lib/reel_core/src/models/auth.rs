//! Authentication domain models.
//!
//! These are internal domain models, distinct from the HTTP request/response
//! shapes in `reel_api` (which use camelCase on the wire).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_email_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }
}

/// User with password hash (for internal auth flows).
#[derive(Debug, Clone)]
pub struct UserWithPassword {
    pub user: User,
    pub password_hash: String,
}

/// Which use a signed session token is minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Access => f.write_str("access"),
            TokenType::Refresh => f.write_str("refresh"),
        }
    }
}

/// Verified contents of a session token.
///
/// Only ever constructed after signature, algorithm and expiry checks pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: Uuid,
    /// Correlates a refresh token with its `RefreshSessionRecord`. Absent on access tokens.
    pub token_id: Option<String>,
    pub token_type: TokenType,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Server-side record backing one issued refresh token.
///
/// Only the digest of the token's `jti` is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSessionRecord {
    pub token_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshSessionRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

/// The single-use token flows sharing one storage shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenFlow {
    PasswordReset,
    EmailConfirmation,
    OrganizationInvite,
}

impl TokenFlow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenFlow::PasswordReset => "password_reset",
            TokenFlow::EmailConfirmation => "email_confirmation",
            TokenFlow::OrganizationInvite => "organization_invite",
        }
    }
}

impl fmt::Display for TokenFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenFlow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password_reset" => Ok(TokenFlow::PasswordReset),
            "email_confirmation" => Ok(TokenFlow::EmailConfirmation),
            "organization_invite" => Ok(TokenFlow::OrganizationInvite),
            other => Err(format!("unknown token flow '{other}'")),
        }
    }
}

/// A stored single-use token. Only the digest of the raw secret is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleUseRecord {
    pub id: Uuid,
    pub flow: TokenFlow,
    /// User id for password reset / email confirmation, target email for invites.
    pub subject: String,
    /// Owning organization for invites.
    pub scope_id: Option<Uuid>,
    pub token_hash: String,
    /// Flow-specific fields (invite role, inviter).
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl SingleUseRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}

/// API key record stored in the database. The key hash is never exposed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Organization role, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Membership of a user in an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Owner, Role::Admin, Role::Member] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn token_flow_parses_stored_names() {
        assert_eq!(
            "organization_invite".parse::<TokenFlow>(),
            Ok(TokenFlow::OrganizationInvite)
        );
        assert!("invite".parse::<TokenFlow>().is_err());
    }

    #[test]
    fn single_use_record_inactive_once_used_or_expired() {
        let now = Utc::now();
        let mut record = SingleUseRecord {
            id: Uuid::now_v7(),
            flow: TokenFlow::PasswordReset,
            subject: "u".into(),
            scope_id: None,
            token_hash: "h".into(),
            payload: serde_json::Value::Null,
            created_at: now,
            expires_at: now + chrono::Duration::hours(1),
            used_at: None,
        };
        assert!(record.is_active(now));
        assert!(!record.is_active(now + chrono::Duration::hours(2)));
        record.used_at = Some(now);
        assert!(!record.is_active(now));
    }
}
