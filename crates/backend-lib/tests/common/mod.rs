//! Test utilities for the HTTP integration tests
//!
//! Builds an `AppState` over `MemoryStorage` with a pinned clock, an in-memory
//! mail outbox and a cheap password hash cost.
#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use talent_auth::{
    auth::hash_password,
    config::Settings,
    mailer::MemoryMailer,
    models::{Account, NewAccount},
    router::create_router,
    storage::{MemoryStorage, Storage},
    time::TimeProvider,
    AppState,
};
use tower::ServiceExt;

pub const PASSWORD: &str = "Initial1Pass";

pub struct TestApp {
    pub app: Router,
    pub state: Arc<AppState<MemoryStorage>>,
    pub clock: TimeProvider,
    pub mailer: MemoryMailer,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// First `name=value` pair of the `Set-Cookie` header
    pub fn cookie(&self) -> Option<String> {
        self.headers
            .get("set-cookie")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }
}

pub fn test_settings() -> Settings {
    Settings {
        password_hash_cost: 4,
        ..Settings::default()
    }
}

pub fn setup() -> TestApp {
    setup_with(test_settings())
}

pub fn setup_with(settings: Settings) -> TestApp {
    let clock = TimeProvider::fixed(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
    let mailer = MemoryMailer::new();
    let state = AppState::with_parts(
        MemoryStorage::new(),
        settings,
        clock.clone(),
        Arc::new(mailer.clone()),
    )
    .unwrap();
    let state = Arc::new(state);
    TestApp {
        app: create_router(state.clone()),
        state,
        clock,
        mailer,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        self.request_from(None, method, path, body, headers).await
    }

    /// Like `request`, arriving over a connection from `peer`
    pub async fn request_from(
        &self,
        peer: Option<&str>,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("/api/auth{path}"));
        if let Some(peer) = peer {
            let addr: SocketAddr = format!("{peer}:50000").parse().unwrap();
            builder = builder.extension(ConnectInfo(addr));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request(Method::POST, path, Some(body), &[]).await
    }

    pub async fn post_with_token(&self, path: &str, body: Value, token: &str) -> TestResponse {
        let auth = format!("Bearer {token}");
        self.request(Method::POST, path, Some(body), &[("authorization", auth.as_str())])
            .await
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> TestResponse {
        let auth = format!("Bearer {token}");
        self.request(Method::GET, path, None, &[("authorization", auth.as_str())])
            .await
    }

    /// Insert an account directly, bypassing registration
    pub async fn account(&self, email: &str, password: &str, is_staff: bool) -> Account {
        self.state
            .storage
            .create_account(NewAccount {
                email: email.to_string(),
                username: None,
                name: "Test User".to_string(),
                password_hash: hash_password(password, 4).unwrap(),
                is_staff,
                date_joined: self.clock.now(),
            })
            .await
            .unwrap()
    }

    /// Log in and return (access, refresh, cookie)
    pub async fn login(&self, email: &str, password: &str) -> (String, String, String) {
        let res = self
            .post(
                "/login",
                serde_json::json!({"email": email, "password": password}),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
        let cookie = res.cookie().unwrap();
        (
            res.body["token"].as_str().unwrap().to_string(),
            res.body["refresh"].as_str().unwrap().to_string(),
            cookie,
        )
    }

    /// `uid` and `token` from the last reset mail
    pub fn last_reset_link(&self) -> (String, String) {
        let mail = self.mailer.sent().pop().unwrap();
        let query = mail
            .body
            .lines()
            .find_map(|line| line.split_once("/reset-password?"))
            .map(|(_, query)| query.trim().to_string())
            .unwrap();
        let mut uid = String::new();
        let mut token = String::new();
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("uid", v)) => uid = v.to_string(),
                Some(("token", v)) => token = v.to_string(),
                _ => {}
            }
        }
        (uid, token)
    }
}
