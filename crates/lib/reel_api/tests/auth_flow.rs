//! Integration tests — account lifecycle, sessions and emailed tokens.

mod common;

use axum::body::Body;
use axum::http::header::AUTHORIZATION;
use axum::http::{Method, Request, StatusCode};
use chrono::Duration;
use common::{PASSWORD, TestApp};
use reel_core::mail::MailKind;
use serde_json::json;

#[tokio::test]
async fn register_confirm_then_login() {
    let app = TestApp::new();

    let resp = app.register("Ada@Example.com ", "Ada").await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.body["user"]["email"], "ada@example.com");
    assert_eq!(resp.body["user"]["emailVerified"], false);

    let resp = app.login("ada@example.com", PASSWORD).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.error(), "email_not_verified");

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(
        sent[0]
            .link
            .starts_with("https://app.reel.test/confirm-email?token=")
    );

    assert_eq!(app.confirm("ada@example.com").await.status, StatusCode::OK);

    let resp = app.login("ADA@example.com", PASSWORD).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["tokenType"], "Bearer");
    assert_eq!(resp.body["expiresIn"], 900);
    assert_eq!(resp.body["user"]["emailVerified"], true);
    assert!(resp.body.get("refreshToken").is_none());

    let cookie = resp
        .set_cookies()
        .into_iter()
        .find(|c| c.starts_with("reel_refresh="))
        .unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Secure"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Path=/"));

    let token = resp.body["accessToken"].as_str().unwrap();
    let me = app.call(Method::GET, "/me", Some(token), None).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["authMethod"], "session");
    assert_eq!(me.body["user"]["email"], "ada@example.com");
    assert!(me.body.get("organization").is_none());
}

#[tokio::test]
async fn confirmation_token_works_once() {
    let app = TestApp::new();
    app.register("bo@example.com", "Bo").await;
    let token = app
        .mailer
        .last_token(MailKind::EmailConfirmation, "bo@example.com");

    let body = Some(json!({ "token": token }));
    let first = app
        .call(Method::POST, "/confirm-email", None, body.clone())
        .await;
    assert_eq!(first.status, StatusCode::OK);

    let second = app.call(Method::POST, "/confirm-email", None, body).await;
    assert_eq!(second.status, StatusCode::BAD_REQUEST);
    assert_eq!(second.error(), "invalid_or_expired");
}

#[tokio::test]
async fn confirmation_token_expires() {
    let app = TestApp::new();
    app.register("cy@example.com", "Cy").await;
    app.clock.advance(Duration::hours(24) + Duration::seconds(1));

    let resp = app.confirm("cy@example.com").await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error(), "invalid_or_expired");
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let app = TestApp::new();
    assert_eq!(
        app.register("dup@example.com", "One").await.status,
        StatusCode::CREATED
    );
    let resp = app.register("DUP@example.com", "Two").await;
    assert_eq!(resp.status, StatusCode::CONFLICT);
    assert_eq!(resp.error(), "conflict");
}

#[tokio::test]
async fn register_validates_input() {
    let app = TestApp::new();
    let cases = [
        json!({ "email": "not-an-email", "password": PASSWORD, "name": "X" }),
        json!({ "email": "x@example.com", "password": "short", "name": "X" }),
        json!({ "email": "x@example.com", "password": "p".repeat(73), "name": "X" }),
        json!({ "email": "x@example.com", "password": PASSWORD, "name": "  " }),
    ];
    for body in cases {
        let resp = app.call(Method::POST, "/register", None, Some(body)).await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.error(), "validation_error");
    }
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn login_failures_look_the_same() {
    let app = TestApp::new();
    app.signup("eve@example.com").await;

    let wrong_password = app.login("eve@example.com", "wrong password").await;
    let unknown_email = app.login("nobody@example.com", PASSWORD).await;
    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.body, unknown_email.body);
}

#[tokio::test]
async fn refresh_rotates_and_rejects_replay() {
    let app = TestApp::new();
    let session = app.signup("fay@example.com").await;

    let rotated = app
        .post_with_cookie("/refresh", Some(&session.refresh_cookie))
        .await;
    assert_eq!(rotated.status, StatusCode::OK);
    assert!(rotated.body["accessToken"].is_string());
    let new_cookie = rotated.refresh_cookie().unwrap();
    assert_ne!(new_cookie, session.refresh_cookie);

    let replay = app
        .post_with_cookie("/refresh", Some(&session.refresh_cookie))
        .await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert_eq!(replay.error(), "unauthorized");

    let again = app.post_with_cookie("/refresh", Some(&new_cookie)).await;
    assert_eq!(again.status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_requires_a_refresh_token() {
    let app = TestApp::new();
    let session = app.signup("gus@example.com").await;

    let missing = app.post_with_cookie("/refresh", None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

    let access_as_refresh = format!("reel_refresh={}", session.access_token);
    let resp = app
        .post_with_cookie("/refresh", Some(&access_as_refresh))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.body["message"], "Expected refresh token");
}

#[tokio::test]
async fn refresh_session_expires() {
    let app = TestApp::new();
    let session = app.signup("hal@example.com").await;
    app.clock.advance(Duration::days(7) + Duration::seconds(1));

    let resp = app
        .post_with_cookie("/refresh", Some(&session.refresh_cookie))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bearer_failures_are_all_unauthorized() {
    let app = TestApp::new();
    let session = app.signup("ivy@example.com").await;
    let refresh_token = session
        .refresh_cookie
        .strip_prefix("reel_refresh=")
        .unwrap()
        .to_string();

    let missing = app.call(Method::GET, "/me", None, None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.body["message"], "Missing authorization header");

    let basic = app
        .send(
            Request::builder()
                .uri("/me")
                .header(AUTHORIZATION, "Basic abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(basic.status, StatusCode::UNAUTHORIZED);
    assert_eq!(basic.body["message"], "Invalid authorization scheme");

    let garbage = app.call(Method::GET, "/me", Some("not.a.jwt"), None).await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);

    let wrong_type = app
        .call(Method::GET, "/me", Some(&refresh_token), None)
        .await;
    assert_eq!(wrong_type.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_type.body["message"], "Expected access token");

    app.clock.advance(Duration::minutes(15));
    let expired = app
        .call(Method::GET, "/me", Some(&session.access_token), None)
        .await;
    assert_eq!(expired.status, StatusCode::UNAUTHORIZED);
    assert_eq!(expired.body["message"], "Token expired");
}

#[tokio::test]
async fn logout_revokes_and_clears_both_paths() {
    let app = TestApp::new();
    let session = app.signup("jo@example.com").await;

    let resp = app
        .post_with_cookie("/logout", Some(&session.refresh_cookie))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let cleared = resp.set_cookies();
    assert_eq!(cleared.len(), 2);
    assert!(cleared.iter().all(|c| c.starts_with("reel_refresh=;")));
    assert!(cleared.iter().any(|c| c.contains("Path=/;") || c.ends_with("Path=/")));
    assert!(cleared.iter().any(|c| c.contains("Path=/api/auth")));
    assert!(cleared.iter().all(|c| c.contains("Max-Age=0")));

    let resp = app
        .post_with_cookie("/refresh", Some(&session.refresh_cookie))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_without_cookie_still_clears() {
    let app = TestApp::new();
    let resp = app.post_with_cookie("/logout", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.set_cookies().len(), 2);

    let resp = app
        .post_with_cookie("/logout", Some("reel_refresh=garbage"))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn forgot_password_does_not_reveal_accounts() {
    let app = TestApp::new();
    app.signup("kim@example.com").await;

    let known = app
        .call(
            Method::POST,
            "/forgot-password",
            None,
            Some(json!({ "email": "kim@example.com" })),
        )
        .await;
    let unknown = app
        .call(
            Method::POST,
            "/forgot-password",
            None,
            Some(json!({ "email": "ghost@example.com" })),
        )
        .await;
    assert_eq!(known.status, StatusCode::OK);
    assert_eq!(unknown.status, StatusCode::OK);
    assert_eq!(known.body, unknown.body);

    assert_eq!(app.mailer.count(MailKind::PasswordReset, "kim@example.com"), 1);
    assert_eq!(
        app.mailer.count(MailKind::PasswordReset, "ghost@example.com"),
        0
    );
}

#[tokio::test]
async fn reset_password_revokes_every_session() {
    let app = TestApp::new();
    let first = app.signup("lu@example.com").await;
    let second_login = app.login("lu@example.com", PASSWORD).await;
    let second_cookie = second_login.refresh_cookie().unwrap();

    app.call(
        Method::POST,
        "/forgot-password",
        None,
        Some(json!({ "email": "lu@example.com" })),
    )
    .await;
    let token = app
        .mailer
        .last_token(MailKind::PasswordReset, "lu@example.com");

    let resp = app
        .call(
            Method::POST,
            "/reset-password",
            None,
            Some(json!({ "token": token, "password": "a brand new secret" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    for cookie in [&first.refresh_cookie, &second_cookie] {
        let resp = app.post_with_cookie("/refresh", Some(cookie)).await;
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    }

    assert_eq!(
        app.login("lu@example.com", PASSWORD).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.login("lu@example.com", "a brand new secret").await.status,
        StatusCode::OK
    );

    let reuse = app
        .call(
            Method::POST,
            "/reset-password",
            None,
            Some(json!({ "token": token, "password": "yet another secret" })),
        )
        .await;
    assert_eq!(reuse.status, StatusCode::BAD_REQUEST);
    assert_eq!(reuse.error(), "invalid_or_expired");
}

#[tokio::test]
async fn new_reset_link_invalidates_the_previous_one() {
    let app = TestApp::new();
    app.signup("mo@example.com").await;
    let forgot = || {
        app.call(
            Method::POST,
            "/forgot-password",
            None,
            Some(json!({ "email": "mo@example.com" })),
        )
    };

    forgot().await;
    let stale = app
        .mailer
        .last_token(MailKind::PasswordReset, "mo@example.com");
    forgot().await;
    let fresh = app
        .mailer
        .last_token(MailKind::PasswordReset, "mo@example.com");

    let resp = app
        .call(
            Method::POST,
            "/reset-password",
            None,
            Some(json!({ "token": stale, "password": "replacement pass" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app
        .call(
            Method::POST,
            "/reset-password",
            None,
            Some(json!({ "token": fresh, "password": "replacement pass" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn reset_with_weak_password_keeps_token_usable() {
    let app = TestApp::new();
    app.signup("ned@example.com").await;
    app.call(
        Method::POST,
        "/forgot-password",
        None,
        Some(json!({ "email": "ned@example.com" })),
    )
    .await;
    let token = app
        .mailer
        .last_token(MailKind::PasswordReset, "ned@example.com");

    let weak = app
        .call(
            Method::POST,
            "/reset-password",
            None,
            Some(json!({ "token": token, "password": "short" })),
        )
        .await;
    assert_eq!(weak.status, StatusCode::BAD_REQUEST);
    assert_eq!(weak.error(), "validation_error");

    let ok = app
        .call(
            Method::POST,
            "/reset-password",
            None,
            Some(json!({ "token": token, "password": "long enough now" })),
        )
        .await;
    assert_eq!(ok.status, StatusCode::OK);
}

#[tokio::test]
async fn resend_confirmation_only_mails_unverified_accounts() {
    let app = TestApp::new();
    app.register("ola@example.com", "Ola").await;
    app.signup("pia@example.com").await;

    let mut bodies = Vec::new();
    for email in ["ola@example.com", "pia@example.com", "ghost@example.com"] {
        let resp = app
            .call(
                Method::POST,
                "/resend-confirmation",
                None,
                Some(json!({ "email": email })),
            )
            .await;
        assert_eq!(resp.status, StatusCode::OK);
        bodies.push(resp.body);
    }
    assert!(bodies.windows(2).all(|w| w[0] == w[1]));

    assert_eq!(
        app.mailer
            .count(MailKind::EmailConfirmation, "ola@example.com"),
        2
    );
    assert_eq!(
        app.mailer
            .count(MailKind::EmailConfirmation, "pia@example.com"),
        1
    );
    assert_eq!(
        app.mailer
            .count(MailKind::EmailConfirmation, "ghost@example.com"),
        0
    );

    // Only the newest confirmation link works.
    assert_eq!(app.confirm("ola@example.com").await.status, StatusCode::OK);
}
