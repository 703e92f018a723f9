//! # reel_api
//!
//! HTTP API library for Reel identity: accounts, sessions, API keys and
//! organization invites.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};
use reel_core::auth::AuthContext;
use reel_core::clock::Clock;
use reel_core::mail::Mailer;
use reel_core::store::Store;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{api_keys, auth, invites, me, members};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: ApiConfig,
    /// Auth components, sharing one store and one clock.
    pub auth: AuthContext,
    /// Outbound email collaborator.
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let auth = AuthContext::new(&config.auth_settings(), store, clock);
        Self {
            config,
            auth,
            mailer,
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `reel_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    reel_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_REGISTER, post(auth::register_handler))
        .route(routes::POST_LOGIN, post(auth::login_handler))
        .route(routes::POST_REFRESH, post(auth::refresh_handler))
        .route(routes::POST_LOGOUT, post(auth::logout_handler))
        .route(routes::POST_FORGOT_PASSWORD, post(auth::forgot_password_handler))
        .route(routes::POST_RESET_PASSWORD, post(auth::reset_password_handler))
        .route(routes::POST_CONFIRM_EMAIL, post(auth::confirm_email_handler))
        .route(
            routes::POST_RESEND_CONFIRMATION,
            post(auth::resend_confirmation_handler),
        );

    // Protected routes: `require_auth` runs first, then the organization scope.
    let protected = Router::new()
        .route(routes::GET_ME, get(me::me_handler))
        .route(
            routes::API_KEYS,
            post(api_keys::create_api_key_handler).get(api_keys::list_api_keys_handler),
        )
        .route(routes::API_KEYS_ID, delete(api_keys::delete_api_key_handler))
        .route(
            routes::ORG_INVITES,
            post(invites::create_invite_handler).get(invites::list_invites_handler),
        )
        .route(
            routes::ORG_INVITES_ACCEPT,
            post(invites::accept_invite_handler),
        )
        .route(routes::ORG_INVITES_ID, delete(invites::revoke_invite_handler))
        .route(
            routes::ORG_MEMBERS_ID,
            patch(members::update_member_handler).delete(members::remove_member_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::org::resolve_org_scope,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
