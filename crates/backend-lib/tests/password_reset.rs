mod common;

use axum::http::StatusCode;
use chrono::Duration;
use common::{setup, PASSWORD};
use serde_json::json;
use talent_auth::models::SecurityEvent;
use talent_auth::storage::Storage;

const NEW_PASSWORD: &str = "Changed1Pass";

#[tokio::test]
async fn forgot_password_mails_a_link() {
    let t = setup();
    let account = t.account("u@example.com", PASSWORD, false).await;

    let res = t
        .post("/forgot-password", json!({"email": "U@example.com"}))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["message"], "Password reset email sent");

    let mail = t.mailer.sent().pop().unwrap();
    assert_eq!(mail.to, "u@example.com");
    assert!(mail.body.contains("http://localhost:3000/reset-password?uid="));

    let (uid, token) = t.last_reset_link();
    assert_eq!(uid, "MQ");
    assert_eq!(token.split('-').count(), 3);

    let logs = t.state.storage.security_logs(Some(account.id)).await.unwrap();
    assert_eq!(logs[0].event_type, SecurityEvent::PasswordResetRequested);
}

#[tokio::test]
async fn forgot_password_input_errors() {
    let t = setup();
    let res = t.post("/forgot-password", json!({})).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body, json!({"email": ["Email is required"]}));

    let res = t.post("/forgot-password", json!({"email": "nope"})).await;
    assert_eq!(res.body, json!({"email": ["Invalid email format"]}));

    let res = t
        .post("/forgot-password", json!({"email": "ghost@example.com"}))
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["error"], "User with this email does not exist");

    let mut account = t.account("off@example.com", PASSWORD, false).await;
    account.is_active = false;
    t.state.storage.save_account(&account).await.unwrap();
    let res = t
        .post("/forgot-password", json!({"email": "off@example.com"}))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(t.mailer.sent().is_empty());
}

#[tokio::test]
async fn reset_is_single_use_and_revokes_credentials() {
    let t = setup();
    t.account("u@example.com", PASSWORD, false).await;
    let (access, _, cookie) = t.login("u@example.com", PASSWORD).await;

    t.post("/forgot-password", json!({"email": "u@example.com"})).await;
    let (uid, token) = t.last_reset_link();
    let body = json!({"uid": uid, "token": token, "new_password": NEW_PASSWORD});

    let res = t.post("/reset-password", body.clone()).await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body["message"], "Password reset successfully");

    let res = t.post("/reset-password", body).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "Invalid or expired token");

    let res = t.get_with_token("/notifications", &access).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["code"], "password_changed");
    let res = t
        .request(
            axum::http::Method::GET,
            "/notifications",
            None,
            &[("cookie", cookie.as_str())],
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = t
        .post("/login", json!({"email": "u@example.com", "password": PASSWORD}))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    let (access, _, _) = t.login("u@example.com", NEW_PASSWORD).await;
    let res = t.get_with_token("/notifications", &access).await;
    let titles: Vec<_> = res.body.as_array().unwrap().iter().map(|n| n["title"].clone()).collect();
    assert!(titles.contains(&json!("Password Reset")));
}

#[tokio::test]
async fn newer_request_retires_older_token() {
    let t = setup();
    t.account("u@example.com", PASSWORD, false).await;

    t.post("/forgot-password", json!({"email": "u@example.com"})).await;
    let (uid, first) = t.last_reset_link();
    t.clock.advance(Duration::seconds(5));
    let res = t.post("/forgot-password", json!({"email": "u@example.com"})).await;
    assert_eq!(res.status, StatusCode::OK);
    let (_, second) = t.last_reset_link();
    assert_ne!(first, second);

    let res = t
        .post(
            "/reset-password",
            json!({"uid": uid, "token": first, "new_password": NEW_PASSWORD}),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "Invalid or expired token");

    let res = t
        .post(
            "/reset-password",
            json!({"uid": uid, "token": second, "new_password": NEW_PASSWORD}),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn token_expires_after_a_day() {
    let t = setup();
    t.account("u@example.com", PASSWORD, false).await;
    t.post("/forgot-password", json!({"email": "u@example.com"})).await;
    let (uid, token) = t.last_reset_link();

    t.clock.advance(Duration::hours(24));
    let res = t
        .post(
            "/reset-password",
            json!({"uid": uid, "token": token, "new_password": NEW_PASSWORD}),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "Invalid or expired token");
}

#[tokio::test]
async fn reset_failures_are_uniform() {
    let t = setup();
    t.account("u@example.com", PASSWORD, false).await;
    t.account("other@example.com", PASSWORD, false).await;
    t.post("/forgot-password", json!({"email": "u@example.com"})).await;
    let (uid, token) = t.last_reset_link();

    let cases = [
        json!({"uid": "!!", "token": token, "new_password": NEW_PASSWORD}),
        json!({"uid": "OTk5", "token": token, "new_password": NEW_PASSWORD}),
        // another account's uid
        json!({"uid": "Mg", "token": token, "new_password": NEW_PASSWORD}),
        json!({"uid": uid, "token": "abc-def-0123", "new_password": NEW_PASSWORD}),
    ];
    for body in cases {
        let res = t.post("/reset-password", body.clone()).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(res.body["error"], "Invalid or expired token", "{body}");
    }

    let res = t.post("/reset-password", json!({"uid": uid})).await;
    assert_eq!(res.body["error"], "UID, token, and new password are required");

    // weak or unchanged passwords leave the token usable
    let res = t
        .post(
            "/reset-password",
            json!({"uid": uid, "token": token, "new_password": PASSWORD}),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.body["new_password"].is_array());
    let res = t
        .post(
            "/reset-password",
            json!({"uid": uid, "token": token, "new_password": "weak"}),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = t
        .post(
            "/reset-password",
            json!({"uid": uid, "token": token, "new_password": NEW_PASSWORD}),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn failed_delivery_is_a_server_error() {
    let t = setup();
    t.account("u@example.com", PASSWORD, false).await;
    t.mailer.set_failing(true);

    let res = t.post("/forgot-password", json!({"email": "u@example.com"})).await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);

    t.mailer.set_failing(false);
    let res = t.post("/forgot-password", json!({"email": "u@example.com"})).await;
    assert_eq!(res.status, StatusCode::OK);
}
