//! Account flows: registration, login, refresh, logout, password reset and
//! email confirmation, delegating to `reel_core::auth`.
//!
//! Forgot-password and resend-confirmation answer identically whether or not
//! the account exists; login reports one error for unknown email and wrong
//! password.

use reel_core::auth::AuthError;
use reel_core::auth::hasher::MAX_PASSWORD_BYTES;
use reel_core::mail::MailKind;
use reel_core::models::auth::{SingleUseRecord, User};
use tracing::{debug, info};
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{TokenResponse, UserResponse};
use crate::routes::links;
use crate::services::mail::{deliver, single_use_link};

const MIN_PASSWORD_CHARS: usize = 8;
const MAX_NAME_CHARS: usize = 100;
const MAX_EMAIL_CHARS: usize = 254;

/// Message returned by enumeration-safe endpoints.
pub const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account exists for that address, a password reset link has been sent";
pub const RESEND_CONFIRMATION_MESSAGE: &str =
    "If that address needs confirming, a confirmation link has been sent";

/// A freshly minted token pair. `refresh_token` goes into the cookie only.
pub struct IssuedSession {
    pub response: TokenResponse,
    pub refresh_token: String,
}

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

/// Trim and lowercase an email address, rejecting obviously malformed input.
pub fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    let valid = email.chars().count() <= MAX_EMAIL_CHARS
        && !email.chars().any(char::is_whitespace)
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            });
    if !valid {
        return Err(AppError::Validation("Invalid email address".into()));
    }
    Ok(email)
}

/// Passwords are 8-72 characters and at most 72 bytes (the bcrypt input limit).
pub fn validate_password(password: &str) -> AppResult<()> {
    let chars = password.chars().count();
    if chars < MIN_PASSWORD_CHARS || password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::Validation(format!(
            "Password must be {MIN_PASSWORD_CHARS}-{MAX_PASSWORD_BYTES} characters"
        )));
    }
    Ok(())
}

fn validate_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "Name must be 1-{MAX_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

// ---------------------------------------------------------------------------
// Flows
// ---------------------------------------------------------------------------

/// Create an unverified account and email a confirmation link.
pub async fn register(
    state: &AppState,
    email: &str,
    password: &str,
    name: &str,
) -> AppResult<User> {
    let email = normalize_email(email)?;
    validate_password(password)?;
    let name = validate_name(name)?;

    let hash = state.auth.hasher.hash_password(password)?;
    let user = state
        .auth
        .store
        .create_user(&email, &name, &hash, state.auth.clock.now())
        .await?;
    info!(user_id = %user.id, "registered user");

    send_confirmation(state, &user).await?;
    Ok(user)
}

/// Check credentials and open a session. Unverified accounts are refused
/// only after the password checks out.
pub async fn login(state: &AppState, email: &str, password: &str) -> AppResult<IssuedSession> {
    let email = normalize_email(email).map_err(|_| AuthError::CredentialError)?;
    let Some(found) = state.auth.store.find_user_by_email(&email).await? else {
        state.auth.hasher.verify_missing_account(password);
        return Err(AuthError::CredentialError.into());
    };

    if !state
        .auth
        .hasher
        .verify_password(password, &found.password_hash)?
    {
        debug!(user_id = %found.user.id, "login rejected: wrong password");
        return Err(AuthError::CredentialError.into());
    }
    if !found.user.is_email_verified() {
        return Err(AuthError::EmailNotVerified.into());
    }

    let session = open_session(state, found.user).await?;
    info!(user_id = %session.response.user.id, "user logged in");
    Ok(session)
}

/// Rotate the session named by a refresh token.
///
/// A token that was already rotated fails here, so a replayed refresh token
/// never yields a second pair.
pub async fn refresh(state: &AppState, refresh_token: &str) -> AppResult<IssuedSession> {
    let claims = state
        .auth
        .tokens
        .verify_refresh(refresh_token)
        .map_err(AuthError::from)?;

    let user = state
        .auth
        .store
        .find_user_by_id(claims.user_id)
        .await?
        .ok_or(AuthError::InvalidSession)?;

    let session = state.auth.sessions.rotate(&claims).await?;
    debug!(user_id = %user.id, "rotated refresh session");
    issue_pair(state, user, &session.token_id)
}

/// Revoke the session named by the cookie, if it names one.
///
/// Logout never fails on a bad or stale token; the cookie is cleared either way.
pub async fn logout(state: &AppState, refresh_token: Option<&str>) -> AppResult<()> {
    let Some(token) = refresh_token.filter(|t| !t.is_empty()) else {
        return Ok(());
    };
    match state.auth.tokens.verify_refresh(token) {
        Ok(claims) => {
            if let Some(token_id) = claims.token_id.as_deref() {
                state.auth.sessions.revoke(token_id).await?;
                info!(user_id = %claims.user_id, "user logged out");
            }
        }
        Err(e) => debug!(error = %e, "logout with unusable refresh token"),
    }
    Ok(())
}

/// Email a reset link if the account exists. Always succeeds outwardly.
pub async fn forgot_password(state: &AppState, email: &str) -> AppResult<()> {
    let Ok(email) = normalize_email(email) else {
        return Ok(());
    };
    let Some(found) = state.auth.store.find_user_by_email(&email).await? else {
        debug!("password reset requested for unknown address");
        return Ok(());
    };

    let user = found.user;
    let issued = state.auth.password_resets.issue_for_user(user.id).await?;
    let link = single_use_link(
        &state.config.app_base_url,
        links::RESET_PASSWORD,
        &issued.secret,
    )?;
    deliver(
        state.mailer.as_ref(),
        MailKind::PasswordReset,
        &user.email,
        &user.name,
        link,
    )
    .await;
    Ok(())
}

/// Set a new password with a reset token and revoke every refresh session.
pub async fn reset_password(state: &AppState, token: &str, password: &str) -> AppResult<()> {
    validate_password(password)?;
    let hash = state.auth.hasher.hash_password(password)?;

    let auth = &state.auth;
    let user_id = auth
        .password_resets
        .consume_with(token, |record| async move {
            let user_id = subject_user_id(&record)?;
            auth.store.set_password_hash(user_id, &hash).await?;
            auth.sessions.revoke_all(user_id).await?;
            Ok::<_, AuthError>(user_id)
        })
        .await?;
    info!(%user_id, "password reset");
    Ok(())
}

/// Mark the email verified with a confirmation token.
pub async fn confirm_email(state: &AppState, token: &str) -> AppResult<()> {
    let auth = &state.auth;
    let user_id = auth
        .email_confirmations
        .consume_with(token, |record| async move {
            let user_id = subject_user_id(&record)?;
            auth.store
                .mark_email_verified(user_id, auth.clock.now())
                .await?;
            Ok::<_, AuthError>(user_id)
        })
        .await?;
    info!(%user_id, "email confirmed");
    Ok(())
}

/// Re-send a confirmation link to an unverified account. Always succeeds outwardly.
pub async fn resend_confirmation(state: &AppState, email: &str) -> AppResult<()> {
    let Ok(email) = normalize_email(email) else {
        return Ok(());
    };
    match state.auth.store.find_user_by_email(&email).await? {
        Some(found) if !found.user.is_email_verified() => {
            send_confirmation(state, &found.user).await?;
        }
        _ => debug!("confirmation resend skipped"),
    }
    Ok(())
}

/// Look up the authenticated user's profile.
pub async fn current_user(state: &AppState, user_id: Uuid) -> AppResult<User> {
    state
        .auth
        .store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn send_confirmation(state: &AppState, user: &User) -> AppResult<()> {
    let issued = state.auth.email_confirmations.issue_for_user(user.id).await?;
    let link = single_use_link(
        &state.config.app_base_url,
        links::CONFIRM_EMAIL,
        &issued.secret,
    )?;
    deliver(
        state.mailer.as_ref(),
        MailKind::EmailConfirmation,
        &user.email,
        &user.name,
        link,
    )
    .await;
    Ok(())
}

async fn open_session(state: &AppState, user: User) -> AppResult<IssuedSession> {
    let session = state.auth.sessions.create(user.id).await?;
    issue_pair(state, user, &session.token_id)
}

fn issue_pair(state: &AppState, user: User, token_id: &str) -> AppResult<IssuedSession> {
    let tokens = &state.auth.tokens;
    let access_token = tokens.mint_access_token(user.id)?;
    let refresh_token = tokens.mint_refresh_token(user.id, token_id)?;
    Ok(IssuedSession {
        response: TokenResponse {
            access_token,
            token_type: "Bearer".into(),
            expires_in: tokens.access_ttl().num_seconds(),
            user: UserResponse::from(user),
        },
        refresh_token,
    })
}

fn subject_user_id(record: &SingleUseRecord) -> Result<Uuid, AuthError> {
    Uuid::parse_str(&record.subject)
        .map_err(|_| AuthError::Internal(format!("token {} has a non-user subject", record.id)))
}
