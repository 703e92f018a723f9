//! Organization invite request handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::middleware::org::{OrgScope, actor_for};
use crate::models::{
    AcceptInviteRequest, CreateInviteRequest, InviteInfo, InviteListResponse, MembershipResponse,
};
use crate::services::invites;

/// `POST /organizations/{id}/invites` — invite an email address. Owner or admin.
pub async fn create_invite_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    axum::Extension(scope): axum::Extension<OrgScope>,
    Path(organization_id): Path<Uuid>,
    Json(body): Json<CreateInviteRequest>,
) -> AppResult<(StatusCode, Json<InviteInfo>)> {
    let actor = actor_for(&state, &user, scope, organization_id).await?;
    let invite = invites::create(&state, actor, &body.email, body.role).await?;
    Ok((StatusCode::CREATED, Json(invite)))
}

/// `GET /organizations/{id}/invites` — outstanding invites. Owner or admin.
pub async fn list_invites_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    axum::Extension(scope): axum::Extension<OrgScope>,
    Path(organization_id): Path<Uuid>,
) -> AppResult<Json<InviteListResponse>> {
    let actor = actor_for(&state, &user, scope, organization_id).await?;
    let invites = invites::list(&state, actor).await?;
    Ok(Json(InviteListResponse { invites }))
}

/// `DELETE /organizations/{id}/invites/{invite_id}` — withdraw an invite. Owner or admin.
pub async fn revoke_invite_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    axum::Extension(scope): axum::Extension<OrgScope>,
    Path((organization_id, invite_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let actor = actor_for(&state, &user, scope, organization_id).await?;
    invites::revoke(&state, actor, invite_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /organizations/{id}/invites/accept` — join with an emailed invite token.
pub async fn accept_invite_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(organization_id): Path<Uuid>,
    Json(body): Json<AcceptInviteRequest>,
) -> AppResult<Json<MembershipResponse>> {
    let membership = invites::accept(&state, user.user_id, organization_id, &body.token).await?;
    Ok(Json(MembershipResponse {
        organization_id: membership.organization_id,
        user_id: membership.user_id,
        role: membership.role,
    }))
}
