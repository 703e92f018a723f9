//! API key management request handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::models::{ApiKeyInfo, ApiKeyListResponse, CreateApiKeyRequest, CreateApiKeyResponse};
use crate::middleware::auth::AuthenticatedUser;

/// `POST /settings/api-keys` — create an API key. The raw key is returned only here.
pub async fn create_api_key_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Json(body): Json<CreateApiKeyRequest>,
) -> AppResult<(StatusCode, Json<CreateApiKeyResponse>)> {
    let (key, record) = state
        .auth
        .api_keys
        .generate(user.user_id, &body.name)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse {
            id: record.id,
            name: record.display_name,
            key,
            created_at: record.created_at,
        }),
    ))
}

/// `GET /settings/api-keys` — list the caller's API keys.
pub async fn list_api_keys_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<ApiKeyListResponse>> {
    let keys = state
        .auth
        .api_keys
        .list(user.user_id)
        .await?
        .into_iter()
        .map(ApiKeyInfo::from)
        .collect();
    Ok(Json(ApiKeyListResponse { keys }))
}

/// `DELETE /settings/api-keys/{id}` — delete one of the caller's API keys.
pub async fn delete_api_key_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(key_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.auth.api_keys.delete(user.user_id, key_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
