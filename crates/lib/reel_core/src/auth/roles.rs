//! Organization role gate and membership rules.
//!
//! `require_role` is a pure check over the caller's resolved role. The
//! membership operations layer the business invariants on top: only owners
//! re-role, nobody re-roles or removes themselves, admins cannot remove
//! owners, and an organization never loses its last owner.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::Role;
use crate::store::{MembershipChange, Store};

/// Allow the call only if `role` is one of `allowed`.
pub fn require_role(role: Role, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(AuthError::Forbidden(format!(
            "Role '{role}' may not perform this action"
        )))
    }
}

/// The acting member: who they are, where, and with which role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Clone)]
pub struct OrgMembers {
    store: Arc<dyn Store>,
}

impl OrgMembers {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn role_of(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Role>, AuthError> {
        self.store.find_member_role(organization_id, user_id).await
    }

    /// Add a member. Already belonging is a conflict.
    pub async fn add(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<(), AuthError> {
        if !self.store.add_member(organization_id, user_id, role).await? {
            return Err(AuthError::Conflict(
                "Already a member of this organization".into(),
            ));
        }
        info!(%organization_id, %user_id, %role, "added organization member");
        Ok(())
    }

    /// Change another member's role. Owner only.
    pub async fn change_role(
        &self,
        actor: Actor,
        target_user_id: Uuid,
        role: Role,
    ) -> Result<(), AuthError> {
        require_role(actor.role, &[Role::Owner])?;
        if actor.user_id == target_user_id {
            return Err(AuthError::ValidationError(
                "You cannot change your own role".into(),
            ));
        }
        let change = self
            .store
            .update_member_role(actor.organization_id, target_user_id, role)
            .await?;
        settle(change)?;
        info!(
            organization_id = %actor.organization_id,
            user_id = %target_user_id,
            %role,
            "changed member role"
        );
        Ok(())
    }

    /// Remove another member. Owners and admins; only owners remove owners.
    pub async fn remove(&self, actor: Actor, target_user_id: Uuid) -> Result<(), AuthError> {
        require_role(actor.role, &[Role::Owner, Role::Admin])?;
        if actor.user_id == target_user_id {
            return Err(AuthError::ValidationError(
                "You cannot remove yourself".into(),
            ));
        }
        let target_role = self
            .store
            .find_member_role(actor.organization_id, target_user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Member not found".into()))?;
        if target_role == Role::Owner {
            require_role(actor.role, &[Role::Owner])?;
        }
        let change = self
            .store
            .remove_member(actor.organization_id, target_user_id)
            .await?;
        settle(change)?;
        info!(
            organization_id = %actor.organization_id,
            user_id = %target_user_id,
            "removed organization member"
        );
        Ok(())
    }
}

fn settle(change: MembershipChange) -> Result<(), AuthError> {
    match change {
        MembershipChange::Applied => Ok(()),
        MembershipChange::NotMember => Err(AuthError::NotFound("Member not found".into())),
        MembershipChange::LastOwner => Err(AuthError::ValidationError(
            "An organization must keep at least one owner".into(),
        )),
    }
}
