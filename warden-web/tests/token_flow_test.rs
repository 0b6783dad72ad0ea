//! Bearer token issuance, use and revocation over real HTTP

mod helpers;

use chrono::Utc;
use helpers::{spawn_app, PASSWORD};
use reqwest::StatusCode;
use serde_json::{json, Value};
use warden_auth::Permission;
use warden_core::{ApiToken, TokenLookup};

#[tokio::test]
async fn issued_token_authenticates_until_revoked() {
    let app = spawn_app().await;
    let user = app.create_user("katherine").await;
    app.grant(user, &[Permission::OfficersEditor]).await;
    app.post_login("katherine", PASSWORD).await;

    let issued: Value = app
        .post_token(&json!({ "name": "ci", "description": "pipeline" }))
        .await
        .json()
        .await
        .unwrap();
    let token = issued["token"].as_str().unwrap();
    let token_id = issued["token_id"].as_str().unwrap();

    let bearer = app.new_client();
    let response = bearer
        .get(app.url("/auth/me"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me: Value = response.json().await.unwrap();
    assert_eq!(me["user_id"], user.get());

    let listed: Vec<ApiToken> = app
        .api_client
        .get(app.url("/tokens"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].description, "pipeline");

    assert_eq!(app.delete_token(token_id).await.status(), StatusCode::NO_CONTENT);
    let response = bearer
        .get(app.url("/auth/me"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_cookie_delivery() {
    let app = spawn_app().await;
    app.create_user("hedy").await;

    let browser = app.new_client();
    browser
        .post(app.url("/auth/login"))
        .json(&json!({ "login": "hedy", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    let response = browser
        .post(app.url("/tokens"))
        .json(&json!({ "name": "browser", "set_cookie": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let delivered = response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.starts_with("warden_token=") && value.contains("HttpOnly"));
    assert!(delivered);

    // Logout clears both cookies.
    let response = browser.post(app.url("/auth/logout")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        browser.get(app.url("/auth/me")).send().await.unwrap().status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn disabling_the_owner_rejects_its_tokens() {
    let app = spawn_app().await;
    let user = app.create_user("dorothy").await;
    app.post_login("dorothy", PASSWORD).await;

    let issued: Value = app
        .post_token(&json!({ "name": "script" }))
        .await
        .json()
        .await
        .unwrap();
    let token = issued["token"].as_str().unwrap();

    app.state.directory.set_enabled(user, false).await.unwrap();
    let response = app
        .new_client()
        .get(app.url("/auth/me"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The row itself is untouched.
    let row = app
        .state
        .tokens
        .get_token(&TokenLookup::ById(issued["token_id"].as_str().unwrap().to_string()))
        .await
        .unwrap();
    assert!(row.is_some());
}

#[tokio::test]
async fn lifetime_limits_enforced() {
    let app = spawn_app().await;
    app.create_user("radia").await;
    app.post_login("radia", PASSWORD).await;

    let too_long = app
        .post_token(&json!({ "name": "forever", "expires_in_hours": 24 * 366 }))
        .await;
    assert_eq!(too_long.status(), StatusCode::BAD_REQUEST);

    let negative = app
        .post_token(&json!({ "name": "past", "expires_in_hours": -1 }))
        .await;
    assert_eq!(negative.status(), StatusCode::BAD_REQUEST);

    let ok: Value = app
        .post_token(&json!({ "name": "week", "expires_in_hours": 24 * 7 }))
        .await
        .json()
        .await
        .unwrap();
    let expires_at: chrono::DateTime<Utc> = serde_json::from_value(ok["expires_at"].clone()).unwrap();
    assert!(expires_at > Utc::now() + chrono::Duration::days(6));
}

#[tokio::test]
async fn sweep_endpoint_needs_token_admin() {
    let app = spawn_app().await;
    let admin = app.create_user("sweeper").await;
    app.post_login("sweeper", PASSWORD).await;

    let denied = app
        .api_client
        .post(app.url("/admin/tokens/sweep"))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    app.grant(admin, &[Permission::AuthTokenAdmin]).await;
    let allowed: Value = app
        .api_client
        .post(app.url("/admin/tokens/sweep"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(allowed["removed"], 0);
}
