//! Cryptographic and lifetime settings, fixed at startup.

use chrono::Duration;

use super::api_keys::DEFAULT_API_KEY_CAP;
use super::hasher::DEFAULT_BCRYPT_COST;
use super::jwt::{ACCESS_TOKEN_TTL, REFRESH_TOKEN_TTL};

/// Password reset links are valid for 1 hour.
pub const PASSWORD_RESET_TTL: Duration = Duration::hours(1);

/// Email confirmation links are valid for 24 hours.
pub const EMAIL_CONFIRMATION_TTL: Duration = Duration::hours(24);

/// Organization invitations are valid for 7 days.
pub const INVITE_TTL: Duration = Duration::days(7);

/// Settings passed to every auth component at construction time.
#[derive(Clone, Debug)]
pub struct AuthSettings {
    /// HMAC secret used to sign session tokens.
    pub jwt_secret: String,
    pub bcrypt_cost: u32,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub password_reset_ttl: Duration,
    pub email_confirmation_ttl: Duration,
    pub invite_ttl: Duration,
    /// Maximum number of API keys per user.
    pub api_key_cap: usize,
}

impl AuthSettings {
    /// Settings with the standard lifetimes and the given signing secret.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            access_ttl: ACCESS_TOKEN_TTL,
            refresh_ttl: REFRESH_TOKEN_TTL,
            password_reset_ttl: PASSWORD_RESET_TTL,
            email_confirmation_ttl: EMAIL_CONFIRMATION_TTL,
            invite_ttl: INVITE_TTL,
            api_key_cap: DEFAULT_API_KEY_CAP,
        }
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }
}
