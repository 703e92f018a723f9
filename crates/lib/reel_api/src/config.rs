//! API server configuration.

use reel_core::auth::hasher::DEFAULT_BCRYPT_COST;
use reel_core::auth::jwt::resolve_jwt_secret;
use reel_core::auth::settings::AuthSettings;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Public base URL of the web app; emailed links point here.
    pub app_base_url: String,
    /// Mark the refresh cookie `Secure`. Disable only for non-TLS local dev.
    pub secure_cookies: bool,
    /// bcrypt cost factor for password hashes.
    pub bcrypt_cost: u32,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable           | Default                                     |
    /// |--------------------|---------------------------------------------|
    /// | `BIND_ADDR`        | `127.0.0.1:3100`                            |
    /// | `DATABASE_URL`     | `postgres://localhost:5432/reel`            |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file     |
    /// | `APP_BASE_URL`     | `http://localhost:3000`                     |
    /// | `COOKIE_SECURE`    | `true`                                      |
    /// | `BCRYPT_COST`      | `10`                                        |
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/reel".into()),
            jwt_secret: resolve_jwt_secret(),
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            secure_cookies: std::env::var("COOKIE_SECURE")
                .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
            bcrypt_cost: std::env::var("BCRYPT_COST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_BCRYPT_COST),
        }
    }

    /// Auth component settings derived from this configuration.
    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings::new(self.jwt_secret.clone()).with_bcrypt_cost(self.bcrypt_cost)
    }
}
