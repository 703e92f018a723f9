//! Shared harness: an in-memory app, a manual clock and a mailer that keeps
//! every message so tests can follow emailed links.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use reel_api::config::ApiConfig;
use reel_api::{AppState, router};
use reel_core::clock::ManualClock;
use reel_core::mail::{MailError, MailKind, MailMessage, Mailer};
use reel_core::store::MemoryStore;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "correct horse battery";

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, kind: MailKind, to: &str) -> usize {
        self.sent()
            .iter()
            .filter(|m| m.kind == kind && m.to == to)
            .count()
    }

    /// Raw token from the newest `kind` message sent to `to`.
    pub fn last_token(&self, kind: MailKind, to: &str) -> String {
        let message = self
            .sent()
            .into_iter()
            .rev()
            .find(|m| m.kind == kind && m.to == to)
            .unwrap_or_else(|| panic!("no {} mail for {to}", kind.as_str()));
        let link = url::Url::parse(&message.link).unwrap();
        link.query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    /// `name=value` of a non-empty refresh cookie set by this response.
    pub fn refresh_cookie(&self) -> Option<String> {
        self.set_cookies().into_iter().find_map(|c| {
            let pair = c.split(';').next()?.trim().to_string();
            let value = pair.strip_prefix("reel_refresh=")?;
            (!value.is_empty()).then_some(pair)
        })
    }

    pub fn error(&self) -> &str {
        self.body["error"].as_str().unwrap_or_default()
    }
}

/// A signed-in user.
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub access_token: String,
    pub refresh_cookie: String,
}

pub struct TestApp {
    pub router: Router,
    pub mailer: Arc<RecordingMailer>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub fn new() -> Self {
        let config = ApiConfig {
            bind_addr: "127.0.0.1:0".into(),
            pg_connection_url: String::new(),
            jwt_secret: "integration-test-secret".into(),
            app_base_url: "https://app.reel.test".into(),
            secure_cookies: true,
            bcrypt_cost: 4,
        };
        let mailer = Arc::new(RecordingMailer::default());
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(config, store.clone(), mailer.clone(), clock.clone());
        Self {
            router: router(state),
            mailer,
            clock,
            store,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let resp = self.router.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub fn request(method: Method, uri: &str, body: Option<Value>) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(_) => builder.header(CONTENT_TYPE, "application/json"),
            None => builder,
        }
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Self::request(method, uri, body.clone());
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(to_body(body)).unwrap()).await
    }

    pub async fn call_in_org(
        &self,
        method: Method,
        uri: &str,
        bearer: &str,
        organization_id: &str,
        body: Option<Value>,
    ) -> TestResponse {
        let builder = Self::request(method, uri, body.clone())
            .header(AUTHORIZATION, format!("Bearer {bearer}"))
            .header("x-organization-id", organization_id);
        self.send(builder.body(to_body(body)).unwrap()).await
    }

    pub async fn post_with_cookie(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(Method::POST).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn register(&self, email: &str, name: &str) -> TestResponse {
        self.call(
            Method::POST,
            "/register",
            None,
            Some(json!({ "email": email, "password": PASSWORD, "name": name })),
        )
        .await
    }

    pub async fn confirm(&self, email: &str) -> TestResponse {
        let token = self.mailer.last_token(MailKind::EmailConfirmation, email);
        self.call(
            Method::POST,
            "/confirm-email",
            None,
            Some(json!({ "token": token })),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.call(
            Method::POST,
            "/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    /// Register, confirm and log in.
    pub async fn signup(&self, email: &str) -> Session {
        assert_eq!(self.register(email, "Test User").await.status, StatusCode::CREATED);
        assert_eq!(self.confirm(email).await.status, StatusCode::OK);
        let resp = self.login(email, PASSWORD).await;
        assert_eq!(resp.status, StatusCode::OK, "login failed: {}", resp.body);
        Session {
            user_id: resp.body["user"]["id"].as_str().unwrap().parse().unwrap(),
            email: email.to_string(),
            access_token: resp.body["accessToken"].as_str().unwrap().to_string(),
            refresh_cookie: resp.refresh_cookie().unwrap(),
        }
    }
}

fn to_body(body: Option<Value>) -> Body {
    match body {
        Some(v) => Body::from(v.to_string()),
        None => Body::empty(),
    }
}
