mod common;

use axum::http::StatusCode;
use common::{setup, PASSWORD};
use serde_json::json;

const NEW_PASSWORD: &str = "Changed1Pass";

#[tokio::test]
async fn change_password_invalidates_old_credentials() {
    let t = setup();
    t.account("u@example.com", PASSWORD, false).await;
    let (access, refresh, _) = t.login("u@example.com", PASSWORD).await;

    let res = t
        .post_with_token(
            "/change-password",
            json!({"old_password": PASSWORD, "new_password": NEW_PASSWORD}),
            &access,
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(
        res.body["message"],
        "Password changed successfully. Please login again."
    );

    let res = t.get_with_token("/notifications", &access).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["code"], "password_changed");
    assert_eq!(
        res.body["error"],
        "Your password has been changed. Please log in again."
    );

    let res = t.post("/token/refresh", json!({"refresh": refresh})).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["code"], "password_changed");

    let (access, _, _) = t.login("u@example.com", NEW_PASSWORD).await;
    let res = t.get_with_token("/notifications", &access).await;
    assert_eq!(res.status, StatusCode::OK);
    let titles: Vec<_> = res.body.as_array().unwrap().iter().map(|n| n["title"].clone()).collect();
    assert!(titles.contains(&json!("Password Changed")));
}

#[tokio::test]
async fn change_password_rejections() {
    let t = setup();
    t.account("u@example.com", PASSWORD, false).await;
    let (access, _, _) = t.login("u@example.com", PASSWORD).await;

    let res = t
        .post_with_token(
            "/change-password",
            json!({"old_password": "Wrong1Pass", "new_password": NEW_PASSWORD}),
            &access,
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "Invalid old password");

    let res = t
        .post_with_token(
            "/change-password",
            json!({"old_password": PASSWORD, "new_password": PASSWORD}),
            &access,
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        res.body["new_password"],
        json!(["New password must be different from the current password."])
    );

    let res = t
        .post_with_token(
            "/change-password",
            json!({"old_password": PASSWORD, "new_password": "alllowercase"}),
            &access,
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.body["new_password"].is_array());

    let res = t
        .post(
            "/change-password",
            json!({"old_password": PASSWORD, "new_password": NEW_PASSWORD}),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    // nothing changed, the credential still works
    let res = t.get_with_token("/notifications", &access).await;
    assert_eq!(res.status, StatusCode::OK);
}
