//! Route path constants.

pub const POST_REGISTER: &str = "/register";
pub const POST_LOGIN: &str = "/login";
pub const POST_REFRESH: &str = "/refresh";
pub const POST_LOGOUT: &str = "/logout";
pub const POST_FORGOT_PASSWORD: &str = "/forgot-password";
pub const POST_RESET_PASSWORD: &str = "/reset-password";
pub const POST_CONFIRM_EMAIL: &str = "/confirm-email";
pub const POST_RESEND_CONFIRMATION: &str = "/resend-confirmation";

pub const GET_ME: &str = "/me";

pub const API_KEYS: &str = "/settings/api-keys";
pub const API_KEYS_ID: &str = "/settings/api-keys/{id}";

pub const ORG_INVITES: &str = "/organizations/{id}/invites";
pub const ORG_INVITES_ACCEPT: &str = "/organizations/{id}/invites/accept";
pub const ORG_INVITES_ID: &str = "/organizations/{id}/invites/{invite_id}";
pub const ORG_MEMBERS_ID: &str = "/organizations/{id}/members/{user_id}";

/// Web app pages that consume emailed single-use links.
pub mod links {
    use uuid::Uuid;

    pub const RESET_PASSWORD: &str = "reset-password";
    pub const CONFIRM_EMAIL: &str = "confirm-email";

    /// Invite page; mirrors the accept endpoint so the link alone names the organization.
    pub fn accept_invite(organization_id: Uuid) -> String {
        format!("organizations/{organization_id}/invites/accept")
    }
}
