//! Account and session request handlers.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{AppendHeaders, IntoResponse};
use axum_extra::extract::cookie::CookieJar;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{
    ConfirmEmailRequest, ForgotPasswordRequest, LoginRequest, MessageResponse, RegisterRequest,
    RegisterResponse, ResendConfirmationRequest, ResetPasswordRequest, TokenResponse,
    UserResponse,
};
use crate::services::auth::{self, IssuedSession};
use crate::services::cookies::{self, REFRESH_COOKIE};

/// `POST /register` — create an account and email a confirmation link.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let user = auth::register(&state, &body.email, &body.password, &body.name).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: UserResponse::from(user),
            message: "Check your email to confirm your address".into(),
        }),
    ))
}

/// `POST /login` — authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<SessionResponse> {
    let session = auth::login(&state, &body.email, &body.password).await?;
    session_response(&state, session)
}

/// `POST /refresh` — rotate the session in the refresh cookie.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<SessionResponse> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing refresh token".into()))?;
    let session = auth::refresh(&state, &token).await?;
    session_response(&state, session)
}

/// `POST /logout` — revoke the cookie's session and clear the cookie.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    let token = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string());
    auth::logout(&state, token.as_deref()).await?;
    Ok((
        cookies::clear_refresh(state.config.secure_cookies)?,
        Json(MessageResponse::new("Logged out")),
    ))
}

/// `POST /forgot-password` — email a reset link. Same answer for unknown addresses.
pub async fn forgot_password_handler(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    auth::forgot_password(&state, &body.email).await?;
    Ok(Json(MessageResponse::new(auth::FORGOT_PASSWORD_MESSAGE)))
}

/// `POST /reset-password` — set a new password with an emailed token.
pub async fn reset_password_handler(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    auth::reset_password(&state, &body.token, &body.password).await?;
    Ok(Json(MessageResponse::new("Password updated")))
}

/// `POST /confirm-email` — verify the address with an emailed token.
pub async fn confirm_email_handler(
    State(state): State<AppState>,
    Json(body): Json<ConfirmEmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    auth::confirm_email(&state, &body.token).await?;
    Ok(Json(MessageResponse::new("Email confirmed")))
}

/// `POST /resend-confirmation` — re-send the confirmation link. Same answer for every address.
pub async fn resend_confirmation_handler(
    State(state): State<AppState>,
    Json(body): Json<ResendConfirmationRequest>,
) -> AppResult<Json<MessageResponse>> {
    auth::resend_confirmation(&state, &body.email).await?;
    Ok(Json(MessageResponse::new(auth::RESEND_CONFIRMATION_MESSAGE)))
}

type SessionResponse = (
    AppendHeaders<[(HeaderName, HeaderValue); 1]>,
    Json<TokenResponse>,
);

fn session_response(state: &AppState, session: IssuedSession) -> AppResult<SessionResponse> {
    let cookie = cookies::set_refresh(
        &session.refresh_token,
        state.auth.tokens.refresh_ttl(),
        state.config.secure_cookies,
    )?;
    Ok((cookie, Json(session.response)))
}
