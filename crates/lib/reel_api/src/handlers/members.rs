//! Organization membership request handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::middleware::org::{OrgScope, actor_for};
use crate::models::{MembershipResponse, UpdateMemberRequest};

/// `PATCH /organizations/{id}/members/{user_id}` — change a member's role. Owner only.
pub async fn update_member_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    axum::Extension(scope): axum::Extension<OrgScope>,
    Path((organization_id, target_user_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateMemberRequest>,
) -> AppResult<Json<MembershipResponse>> {
    let actor = actor_for(&state, &user, scope, organization_id).await?;
    state
        .auth
        .members
        .change_role(actor, target_user_id, body.role)
        .await?;
    Ok(Json(MembershipResponse {
        organization_id,
        user_id: target_user_id,
        role: body.role,
    }))
}

/// `DELETE /organizations/{id}/members/{user_id}` — remove a member. Owner or admin.
pub async fn remove_member_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    axum::Extension(scope): axum::Extension<OrgScope>,
    Path((organization_id, target_user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let actor = actor_for(&state, &user, scope, organization_id).await?;
    state.auth.members.remove(actor, target_user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
