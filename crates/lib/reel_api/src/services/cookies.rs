//! Refresh cookie construction.
//!
//! The refresh token travels only in an `HttpOnly`, `SameSite=Strict` cookie
//! scoped to `/`. Older clients still hold a copy at [`LEGACY_REFRESH_PATH`],
//! so clearing always expires both.

use axum::http::header::SET_COOKIE;
use axum::http::{HeaderName, HeaderValue};
use axum::response::AppendHeaders;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::error::{AppError, AppResult};

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "reel_refresh";

/// Current cookie path.
pub const REFRESH_PATH: &str = "/";

/// Path used by earlier deployments.
pub const LEGACY_REFRESH_PATH: &str = "/api/auth";

/// Build the refresh cookie.
pub fn refresh_cookie(token: &str, max_age: chrono::Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path(REFRESH_PATH)
        .max_age(Duration::seconds(max_age.num_seconds()))
        .build()
}

/// Build an expired refresh cookie for `path`.
pub fn clear_refresh_cookie(path: &'static str, secure: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, String::new()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path(path)
        .max_age(Duration::ZERO)
        .build()
}

/// `Set-Cookie` header issuing a refresh token.
pub fn set_refresh(
    token: &str,
    max_age: chrono::Duration,
    secure: bool,
) -> AppResult<AppendHeaders<[(HeaderName, HeaderValue); 1]>> {
    Ok(AppendHeaders([(
        SET_COOKIE,
        header_value(refresh_cookie(token, max_age, secure))?,
    )]))
}

/// `Set-Cookie` headers expiring the refresh cookie at the current and legacy paths.
pub fn clear_refresh(secure: bool) -> AppResult<AppendHeaders<[(HeaderName, HeaderValue); 2]>> {
    Ok(AppendHeaders([
        (
            SET_COOKIE,
            header_value(clear_refresh_cookie(REFRESH_PATH, secure))?,
        ),
        (
            SET_COOKIE,
            header_value(clear_refresh_cookie(LEGACY_REFRESH_PATH, secure))?,
        ),
    ]))
}

fn header_value(cookie: Cookie<'static>) -> AppResult<HeaderValue> {
    HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| AppError::Internal(format!("invalid cookie header: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_cookie_attributes() {
        let c = refresh_cookie("tok", chrono::Duration::days(7), true);
        assert_eq!(c.name(), REFRESH_COOKIE);
        assert_eq!(c.value(), "tok");
        assert_eq!(c.http_only(), Some(true));
        assert_eq!(c.secure(), Some(true));
        assert_eq!(c.same_site(), Some(SameSite::Strict));
        assert_eq!(c.path(), Some("/"));
        assert_eq!(c.max_age(), Some(Duration::days(7)));
    }

    #[test]
    fn secure_flag_is_configurable() {
        let c = refresh_cookie("tok", chrono::Duration::days(7), false);
        assert_eq!(c.secure(), Some(false));
    }

    #[test]
    fn clearing_targets_both_paths() {
        let current = clear_refresh_cookie(REFRESH_PATH, true);
        let legacy = clear_refresh_cookie(LEGACY_REFRESH_PATH, true);
        assert_eq!(current.path(), Some("/"));
        assert_eq!(legacy.path(), Some("/api/auth"));
        assert_eq!(current.max_age(), Some(Duration::ZERO));
        assert_eq!(legacy.value(), "");
    }
}
