//! PostgreSQL-backed store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::{
    ApiKeyStore, MembershipChange, MembershipStore, RefreshSessionStore, SingleUseTokenStore,
    UserStore,
};
use crate::auth::AuthError;
use crate::models::auth::{
    ApiKeyRecord, RefreshSessionRecord, Role, SingleUseRecord, TokenFlow, User, UserWithPassword,
};

/// User row: (id, email, name, password_hash, email_verified_at, created_at).
type UserRow = (
    Uuid,
    String,
    String,
    String,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

/// Refresh session row: (token_hash, user_id, expires_at, revoked, revoked_at).
type SessionRow = (String, Uuid, DateTime<Utc>, bool, Option<DateTime<Utc>>);

/// Single-use token row from database query.
type TokenRow = (
    Uuid,                     // id
    String,                   // flow
    String,                   // subject
    Option<Uuid>,             // scope_id
    String,                   // token_hash
    Json<serde_json::Value>,  // payload
    DateTime<Utc>,            // created_at
    DateTime<Utc>,            // expires_at
    Option<DateTime<Utc>>,    // used_at
);

/// API key row: (id, user_id, display_name, created_at, last_used_at).
type ApiKeyRow = (Uuid, Uuid, String, DateTime<Utc>, Option<DateTime<Utc>>);

const TOKEN_COLUMNS: &str =
    "id, flow, subject, scope_id, token_hash, payload, created_at, expires_at, used_at";

fn user_from_row(row: UserRow) -> UserWithPassword {
    let (id, email, name, password_hash, email_verified_at, created_at) = row;
    UserWithPassword {
        user: User {
            id,
            email,
            name,
            email_verified_at,
            created_at,
        },
        password_hash,
    }
}

fn session_from_row(row: SessionRow) -> RefreshSessionRecord {
    let (token_hash, user_id, expires_at, revoked, revoked_at) = row;
    RefreshSessionRecord {
        token_hash,
        user_id,
        expires_at,
        revoked,
        revoked_at,
    }
}

fn token_from_row(row: TokenRow) -> Result<SingleUseRecord, AuthError> {
    let (id, flow, subject, scope_id, token_hash, payload, created_at, expires_at, used_at) = row;
    Ok(SingleUseRecord {
        id,
        flow: flow.parse().map_err(AuthError::Internal)?,
        subject,
        scope_id,
        token_hash,
        payload: payload.0,
        created_at,
        expires_at,
        used_at,
    })
}

fn api_key_from_row(row: ApiKeyRow) -> ApiKeyRecord {
    let (id, user_id, display_name, created_at, last_used_at) = row;
    ApiKeyRecord {
        id,
        user_id,
        display_name,
        created_at,
        last_used_at,
    }
}

fn parse_role(role: &str) -> Result<Role, AuthError> {
    role.parse().map_err(AuthError::Internal)
}

/// `Store` implementation over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (email, name, password_hash, created_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (email) DO NOTHING \
             RETURNING id, email, name, password_hash, email_verified_at, created_at",
        )
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| user_from_row(r).user)
            .ok_or_else(|| AuthError::Conflict("Email already registered".into()))
    }

    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserWithPassword>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, password_hash, email_verified_at, created_at \
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, password_hash, email_verified_at, created_at \
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| user_from_row(r).user))
    }

    async fn set_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), AuthError> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound("User not found".into()));
        }
        Ok(())
    }

    async fn mark_email_verified(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let result = sqlx::query(
            "UPDATE users SET email_verified_at = COALESCE(email_verified_at, $2) WHERE id = $1",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound("User not found".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshSessionStore for PgStore {
    async fn insert_refresh_session(
        &self,
        record: &RefreshSessionRecord,
    ) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO refresh_sessions (token_hash, user_id, expires_at, revoked, revoked_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&record.token_hash)
        .bind(record.user_id)
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(record.revoked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_refresh_session(
        &self,
        user_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<RefreshSessionRecord>, AuthError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT token_hash, user_id, expires_at, revoked, revoked_at \
             FROM refresh_sessions WHERE token_hash = $1 AND user_id = $2",
        )
        .bind(token_hash)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(session_from_row))
    }

    async fn revoke_refresh_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE refresh_sessions SET revoked = TRUE, revoked_at = $2 \
             WHERE token_hash = $1 AND NOT revoked",
        )
        .bind(token_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_user_refresh_sessions(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let result = sqlx::query(
            "UPDATE refresh_sessions SET revoked = TRUE, revoked_at = $2 \
             WHERE user_id = $1 AND NOT revoked",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SingleUseTokenStore for PgStore {
    async fn invalidate_outstanding_tokens(
        &self,
        flow: TokenFlow,
        subject: &str,
        scope_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let result = sqlx::query(
            "UPDATE single_use_tokens SET used_at = $4 \
             WHERE flow = $1 AND subject = $2 AND scope_id IS NOT DISTINCT FROM $3 \
               AND used_at IS NULL",
        )
        .bind(flow.as_str())
        .bind(subject)
        .bind(scope_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_single_use_token(&self, record: &SingleUseRecord) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO single_use_tokens \
             (id, flow, subject, scope_id, token_hash, payload, created_at, expires_at, used_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.id)
        .bind(record.flow.as_str())
        .bind(&record.subject)
        .bind(record.scope_id)
        .bind(&record.token_hash)
        .bind(Json(&record.payload))
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.used_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_active_single_use_token(
        &self,
        flow: TokenFlow,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SingleUseRecord>, AuthError> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM single_use_tokens \
             WHERE flow = $1 AND token_hash = $2 AND used_at IS NULL AND expires_at > $3"
        ))
        .bind(flow.as_str())
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(token_from_row).transpose()
    }

    async fn consume_single_use_token(
        &self,
        flow: TokenFlow,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SingleUseRecord>, AuthError> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "UPDATE single_use_tokens SET used_at = $3 \
             WHERE flow = $1 AND token_hash = $2 AND used_at IS NULL AND expires_at > $3 \
             RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(flow.as_str())
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(token_from_row).transpose()
    }

    async fn list_active_single_use_tokens(
        &self,
        flow: TokenFlow,
        scope_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<SingleUseRecord>, AuthError> {
        let rows = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM single_use_tokens \
             WHERE flow = $1 AND scope_id = $2 AND used_at IS NULL AND expires_at > $3 \
             ORDER BY created_at DESC"
        ))
        .bind(flow.as_str())
        .bind(scope_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(token_from_row).collect()
    }

    async fn invalidate_single_use_token(
        &self,
        flow: TokenFlow,
        scope_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE single_use_tokens SET used_at = $4 \
             WHERE id = $1 AND flow = $2 AND scope_id = $3 AND used_at IS NULL",
        )
        .bind(id)
        .bind(flow.as_str())
        .bind(scope_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ApiKeyStore for PgStore {
    async fn count_api_keys(&self, user_id: Uuid) -> Result<usize, AuthError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM api_keys WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    async fn insert_api_key(
        &self,
        record: &ApiKeyRecord,
        key_hash: &str,
    ) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO api_keys (id, user_id, key_hash, display_name, created_at, last_used_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(key_hash)
        .bind(&record.display_name)
        .bind(record.created_at)
        .bind(record.last_used_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_api_key_by_hash(
        &self,
        key_hash: &str,
    ) -> Result<Option<ApiKeyRecord>, AuthError> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            "SELECT id, user_id, display_name, created_at, last_used_at \
             FROM api_keys WHERE key_hash = $1",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(api_key_from_row))
    }

    async fn touch_api_key(&self, key_id: Uuid, now: DateTime<Utc>) -> Result<(), AuthError> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(key_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_api_keys(&self, user_id: Uuid) -> Result<Vec<ApiKeyRecord>, AuthError> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(
            "SELECT id, user_id, display_name, created_at, last_used_at \
             FROM api_keys WHERE user_id = $1 \
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(api_key_from_row).collect())
    }

    async fn delete_api_key(&self, user_id: Uuid, key_id: Uuid) -> Result<bool, AuthError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1 AND user_id = $2")
            .bind(key_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl MembershipStore for PgStore {
    async fn find_member_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Role>, AuthError> {
        let role = sqlx::query_scalar::<_, String>(
            "SELECT role FROM organization_members WHERE organization_id = $1 AND user_id = $2",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        role.as_deref().map(parse_role).transpose()
    }

    async fn add_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "INSERT INTO organization_members (organization_id, user_id, role) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (organization_id, user_id) DO NOTHING",
        )
        .bind(organization_id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_member_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<MembershipChange, AuthError> {
        let mut tx = self.pool.begin().await?;
        let owners = lock_owners(&mut tx, organization_id).await?;
        let Some(current) = lock_member_role(&mut tx, organization_id, user_id).await? else {
            return Ok(MembershipChange::NotMember);
        };
        if current == Role::Owner && role != Role::Owner && owners <= 1 {
            return Ok(MembershipChange::LastOwner);
        }
        sqlx::query(
            "UPDATE organization_members SET role = $3 \
             WHERE organization_id = $1 AND user_id = $2",
        )
        .bind(organization_id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(MembershipChange::Applied)
    }

    async fn remove_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<MembershipChange, AuthError> {
        let mut tx = self.pool.begin().await?;
        let owners = lock_owners(&mut tx, organization_id).await?;
        let Some(current) = lock_member_role(&mut tx, organization_id, user_id).await? else {
            return Ok(MembershipChange::NotMember);
        };
        if current == Role::Owner && owners <= 1 {
            return Ok(MembershipChange::LastOwner);
        }
        sqlx::query("DELETE FROM organization_members WHERE organization_id = $1 AND user_id = $2")
            .bind(organization_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(MembershipChange::Applied)
    }
}

/// Lock the organization's owner rows and return how many there are.
///
/// Concurrent owner removals serialize on these locks, so the owner count
/// read here cannot go stale before the transaction commits. Rows are locked
/// in `user_id` order, the same order for every caller.
async fn lock_owners(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    organization_id: Uuid,
) -> Result<usize, AuthError> {
    let owners = sqlx::query_scalar::<_, Uuid>(
        "SELECT user_id FROM organization_members \
         WHERE organization_id = $1 AND role = 'owner' \
         ORDER BY user_id \
         FOR UPDATE",
    )
    .bind(organization_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(owners.len())
}

async fn lock_member_role(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    organization_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Role>, AuthError> {
    let role = sqlx::query_scalar::<_, String>(
        "SELECT role FROM organization_members \
         WHERE organization_id = $1 AND user_id = $2 \
         FOR UPDATE",
    )
    .bind(organization_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;
    role.as_deref().map(parse_role).transpose()
}
