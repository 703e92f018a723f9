//! Session token minting and verification (HS256 JWT).
//!
//! Access tokens are stateless and short-lived. Refresh tokens carry a `jti`
//! naming a server-side `RefreshSessionRecord`, which is what makes them
//! revocable.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::AuthError;
use super::hasher::random_hex;
use crate::clock::Clock;
use crate::models::auth::{SessionClaims, TokenType};

/// Access token lifetime: 15 minutes.
pub const ACCESS_TOKEN_TTL: Duration = Duration::minutes(15);

/// Refresh token lifetime: 7 days.
pub const REFRESH_TOKEN_TTL: Duration = Duration::days(7);

/// The only signing algorithm accepted.
const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Why a presented session token was not trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Unsupported signing algorithm")]
    UnsupportedAlgorithm,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Expected {expected} token")]
    WrongType { expected: TokenType },

    #[error("Refresh token has no session id")]
    MissingTokenId,
}

/// Claims as they appear inside the JWT.
#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jti: Option<String>,
    typ: TokenType,
    iat: i64,
    exp: i64,
}

/// Signs and verifies session tokens with a server secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(
        secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        // Expiry is checked against the injected clock in `verify`.
        validation.validate_exp = false;
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            access_ttl,
            refresh_ttl,
            clock,
        }
    }

    /// Lifetime of access tokens minted by this service.
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mint a stateless access token.
    pub fn mint_access_token(&self, user_id: Uuid) -> Result<String, AuthError> {
        self.mint(user_id, None, TokenType::Access, self.access_ttl)
    }

    /// Mint a refresh token bound to the session `token_id`.
    pub fn mint_refresh_token(&self, user_id: Uuid, token_id: &str) -> Result<String, AuthError> {
        self.mint(
            user_id,
            Some(token_id.to_string()),
            TokenType::Refresh,
            self.refresh_ttl,
        )
    }

    fn mint(
        &self,
        user_id: Uuid,
        token_id: Option<String>,
        token_type: TokenType,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = self.clock.now();
        let claims = WireClaims {
            sub: user_id.to_string(),
            jti: token_id,
            typ: token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(
            &Header::new(SIGNING_ALGORITHM),
            &claims,
            &self.encoding_key,
        )
        .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Check signature, algorithm and expiry, returning the trusted claims.
    ///
    /// Callers still have to check the token type; see [`Self::verify_access`]
    /// and [`Self::verify_refresh`].
    pub fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let data = decode::<WireClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                    TokenError::UnsupportedAlgorithm
                }
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            },
        )?;
        let wire = data.claims;

        let expires_at = timestamp(wire.exp)?;
        if expires_at <= self.clock.now() {
            return Err(TokenError::Expired);
        }

        Ok(SessionClaims {
            user_id: Uuid::parse_str(&wire.sub).map_err(|_| TokenError::Malformed)?,
            token_id: wire.jti,
            token_type: wire.typ,
            issued_at: timestamp(wire.iat)?,
            expires_at,
        })
    }

    /// Verify a token presented for per-request authentication.
    pub fn verify_access(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let claims = self.verify(token)?;
        if claims.token_type != TokenType::Access {
            return Err(TokenError::WrongType {
                expected: TokenType::Access,
            });
        }
        Ok(claims)
    }

    /// Verify a token presented for a refresh exchange or logout.
    pub fn verify_refresh(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let claims = self.verify(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(TokenError::WrongType {
                expected: TokenType::Refresh,
            });
        }
        match claims.token_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(claims),
            _ => Err(TokenError::MissingTokenId),
        }
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, TokenError> {
    DateTime::from_timestamp(secs, 0).ok_or(TokenError::Malformed)
}

/// Resolve the JWT secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    // Generate and persist
    let secret_path = jwt_secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret = random_hex(32);
    if let Some(parent) = secret_path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!(path = %parent.display(), error = %e, "cannot create JWT secret directory");
    }
    match std::fs::write(&secret_path, &secret) {
        Ok(()) => info!(path = %secret_path.display(), "generated new JWT secret"),
        Err(e) => warn!(
            path = %secret_path.display(),
            error = %e,
            "generated JWT secret could not be persisted; sessions will not survive a restart"
        ),
    }
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reel")
        .join("jwt-secret")
}
