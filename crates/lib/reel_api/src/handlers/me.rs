//! Current identity.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::{AuthMethod, AuthenticatedUser};
use crate::middleware::org::OrgScope;
use crate::models::{MeResponse, OrganizationScope, UserResponse};
use crate::services::auth;

/// `GET /me` — who the credential belongs to, how it was proved, and the
/// organization scope if one was requested.
pub async fn me_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    axum::Extension(scope): axum::Extension<OrgScope>,
) -> AppResult<Json<MeResponse>> {
    let profile = auth::current_user(&state, user.user_id).await?;
    let api_key_id = match user.method {
        AuthMethod::ApiKey { key_id } => Some(key_id),
        AuthMethod::Session => None,
    };
    Ok(Json(MeResponse {
        user: UserResponse::from(profile),
        auth_method: user.method.as_str().to_string(),
        api_key_id,
        organization: scope.context().map(|ctx| OrganizationScope {
            id: ctx.organization_id,
            role: ctx.role,
        }),
    }))
}
