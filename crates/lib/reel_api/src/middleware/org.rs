//! Organization scope middleware.
//!
//! Reads `X-Organization-Id`. When present, the caller's membership role in
//! that organization is resolved and attached; a non-member is rejected
//! before the handler runs. Without the header the request proceeds in
//! personal scope.

use axum::{
    extract::{Request, State},
    http::HeaderName,
    middleware::Next,
    response::Response,
};
use reel_core::auth::roles::Actor;
use reel_core::models::auth::Role;
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;

pub const ORGANIZATION_HEADER: HeaderName = HeaderName::from_static("x-organization-id");

/// Organization and role the request runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrgContext {
    pub organization_id: Uuid,
    pub role: Role,
}

/// Request scope attached by [`resolve_org_scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgScope {
    Personal,
    Organization(OrgContext),
}

impl OrgScope {
    pub fn context(&self) -> Option<OrgContext> {
        match self {
            OrgScope::Personal => None,
            OrgScope::Organization(ctx) => Some(*ctx),
        }
    }
}

/// Axum middleware; must run after `require_auth`.
pub async fn resolve_org_scope(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .copied()
        .ok_or_else(|| AppError::Internal("organization scope resolved before authentication".into()))?;

    let scope = match request.headers().get(&ORGANIZATION_HEADER) {
        None => OrgScope::Personal,
        Some(value) => {
            let organization_id = value
                .to_str()
                .ok()
                .and_then(|v| Uuid::parse_str(v.trim()).ok())
                .ok_or_else(|| AppError::Validation("Invalid organization id header".into()))?;
            let role = member_role(&state, organization_id, user.user_id).await?;
            OrgScope::Organization(OrgContext {
                organization_id,
                role,
            })
        }
    };

    request.extensions_mut().insert(scope);
    Ok(next.run(request).await)
}

/// Resolve the caller as an actor in the organization named by the path.
///
/// A header scope naming a different organization is rejected rather than
/// silently overridden.
pub async fn actor_for(
    state: &AppState,
    user: &AuthenticatedUser,
    scope: OrgScope,
    organization_id: Uuid,
) -> AppResult<Actor> {
    let role = match scope.context() {
        Some(ctx) if ctx.organization_id == organization_id => ctx.role,
        Some(_) => {
            return Err(AppError::Validation(
                "Organization header does not match the requested organization".into(),
            ));
        }
        None => member_role(state, organization_id, user.user_id).await?,
    };
    Ok(Actor {
        organization_id,
        user_id: user.user_id,
        role,
    })
}

async fn member_role(state: &AppState, organization_id: Uuid, user_id: Uuid) -> AppResult<Role> {
    state
        .auth
        .members
        .role_of(organization_id, user_id)
        .await?
        .ok_or_else(|| AppError::Forbidden("Not a member of this organization".into()))
}
