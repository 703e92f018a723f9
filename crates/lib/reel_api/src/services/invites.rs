//! Organization invitations.
//!
//! An invite is a single-use token whose subject is the invitee's email and
//! whose scope is the organization. Accepting needs both the secret and a
//! signed-in account with the same email address.

use reel_core::auth::AuthError;
use reel_core::auth::roles::{Actor, require_role};
use reel_core::mail::MailKind;
use reel_core::models::auth::{Membership, Role, SingleUseRecord};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::InviteInfo;
use crate::routes::links;
use crate::services::auth::normalize_email;
use crate::services::mail::{deliver, single_use_link};

/// Flow-specific fields stored alongside an invite token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvitePayload {
    role: Role,
    invited_by: Uuid,
}

const INVITE_MANAGERS: &[Role] = &[Role::Owner, Role::Admin];

/// Invite `email` into the actor's organization.
pub async fn create(
    state: &AppState,
    actor: Actor,
    email: &str,
    role: Option<Role>,
) -> AppResult<InviteInfo> {
    require_role(actor.role, INVITE_MANAGERS)?;
    let role = role.unwrap_or(Role::Member);
    if role == Role::Owner {
        return Err(AppError::Validation(
            "Invites may only grant the admin or member role".into(),
        ));
    }
    let email = normalize_email(email)?;

    if let Some(found) = state.auth.store.find_user_by_email(&email).await?
        && state
            .auth
            .members
            .role_of(actor.organization_id, found.user.id)
            .await?
            .is_some()
    {
        return Err(AppError::Conflict(
            "That user is already a member of this organization".into(),
        ));
    }

    let payload = serde_json::to_value(InvitePayload {
        role,
        invited_by: actor.user_id,
    })
    .map_err(|e| AppError::Internal(e.to_string()))?;
    let issued = state
        .auth
        .invites
        .issue(&email, Some(actor.organization_id), payload)
        .await?;

    let link = single_use_link(
        &state.config.app_base_url,
        &links::accept_invite(actor.organization_id),
        &issued.secret,
    )?;
    deliver(
        state.mailer.as_ref(),
        MailKind::OrganizationInvite,
        &email,
        &email,
        link,
    )
    .await;
    info!(
        organization_id = %actor.organization_id,
        invite_id = %issued.record.id,
        %role,
        "created organization invite"
    );

    invite_info(issued.record)
}

/// Outstanding invites of the actor's organization.
pub async fn list(state: &AppState, actor: Actor) -> AppResult<Vec<InviteInfo>> {
    require_role(actor.role, INVITE_MANAGERS)?;
    state
        .auth
        .invites
        .list_outstanding(actor.organization_id)
        .await?
        .into_iter()
        .map(invite_info)
        .collect()
}

/// Withdraw an outstanding invite.
pub async fn revoke(state: &AppState, actor: Actor, invite_id: Uuid) -> AppResult<()> {
    require_role(actor.role, INVITE_MANAGERS)?;
    state
        .auth
        .invites
        .revoke(actor.organization_id, invite_id)
        .await
        .map_err(|e| match e {
            AuthError::NotFound(_) => AppError::NotFound("Invite not found".into()),
            other => other.into(),
        })
}

/// Join `organization_id` with an invite secret.
///
/// The token is checked before it is consumed so a wrong account cannot burn
/// someone else's invite. Once consumed, the invite stays consumed even if
/// adding the membership fails.
pub async fn accept(
    state: &AppState,
    user_id: Uuid,
    organization_id: Uuid,
    token: &str,
) -> AppResult<Membership> {
    let invite = state.auth.invites.peek(token).await?;
    if invite.scope_id != Some(organization_id) {
        return Err(AuthError::InvalidOrExpiredToken.into());
    }

    let user = state
        .auth
        .store
        .find_user_by_id(user_id)
        .await?
        .ok_or(AuthError::InvalidSession)?;
    if !user.email.eq_ignore_ascii_case(&invite.subject) {
        warn!(%user_id, %organization_id, "invite presented by a different account");
        return Err(AppError::Forbidden(
            "This invite was sent to a different email address".into(),
        ));
    }

    let consumed = state.auth.invites.consume(token).await?;
    let payload = decode_payload(&consumed)?;
    state
        .auth
        .members
        .add(organization_id, user_id, payload.role)
        .await?;
    info!(%user_id, %organization_id, role = %payload.role, "accepted organization invite");

    Ok(Membership {
        organization_id,
        user_id,
        role: payload.role,
    })
}

fn decode_payload(record: &SingleUseRecord) -> Result<InvitePayload, AppError> {
    serde_json::from_value(record.payload.clone())
        .map_err(|e| AppError::Internal(format!("invite {} has a bad payload: {e}", record.id)))
}

fn invite_info(record: SingleUseRecord) -> AppResult<InviteInfo> {
    let payload = decode_payload(&record)?;
    Ok(InviteInfo {
        id: record.id,
        email: record.subject,
        role: payload.role,
        invited_by: payload.invited_by,
        created_at: record.created_at,
        expires_at: record.expires_at,
    })
}
