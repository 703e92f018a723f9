//! Authentication middleware: bearer extraction and credential verification.
//!
//! A bearer credential is either an access token or an API key; the key
//! prefix decides which path verifies it. Every failure is a 401 and only the
//! message says which check failed.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use reel_core::auth::AuthError;
use reel_core::auth::api_keys::is_api_key;
use tracing::debug;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppError;

/// How the caller proved who they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Session,
    ApiKey { key_id: Uuid },
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Session => "session",
            AuthMethod::ApiKey { .. } => "api_key",
        }
    }
}

/// Identity injected into request extensions by [`require_auth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub method: AuthMethod,
}

/// Axum middleware: extracts `Authorization: Bearer <credential>`, verifies
/// it, and injects `AuthenticatedUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    let credential = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))?;

    let user = authenticate(&state, credential).await?;
    debug!(user_id = %user.user_id, method = user.method.as_str(), "authenticated request");

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn authenticate(state: &AppState, credential: &str) -> Result<AuthenticatedUser, AppError> {
    if is_api_key(credential) {
        let record = state.auth.api_keys.lookup(credential).await?;
        return Ok(AuthenticatedUser {
            user_id: record.user_id,
            method: AuthMethod::ApiKey { key_id: record.id },
        });
    }

    let claims = state
        .auth
        .tokens
        .verify_access(credential)
        .map_err(AuthError::from)?;
    Ok(AuthenticatedUser {
        user_id: claims.user_id,
        method: AuthMethod::Session,
    })
}
