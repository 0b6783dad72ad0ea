//! Integration test helpers
//!
//! Spawns the real server on an ephemeral port and talks to it over HTTP.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::{Arc, LazyLock};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use warden_auth::Permission;
use warden_core::{UserId, WardenConfig, WardenResult};
use warden_web::auth::reset::Mailer;
use warden_web::{AppState, WardenServerBuilder};

pub const PASSWORD: &str = "correct horse battery";

// Initialize tracing once for all tests
static TRACING: LazyLock<()> = LazyLock::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
});

/// Mailer that keeps messages for the test to read
#[derive(Default)]
pub struct Outbox {
    messages: Mutex<Vec<(String, String)>>,
}

#[async_trait::async_trait]
impl Mailer for Outbox {
    async fn send(&self, to: &str, _subject: &str, body: &str) -> WardenResult<()> {
        self.messages
            .lock()
            .await
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

impl Outbox {
    /// The reset code in the latest message sent to `to`
    pub async fn reset_code_for(&self, to: &str) -> Option<String> {
        let messages = self.messages.lock().await;
        messages
            .iter()
            .rev()
            .find(|(recipient, _)| recipient == to)
            .and_then(|(_, body)| body.split_whitespace().nth(5))
            .map(|code| code.trim_end_matches('.').to_string())
    }

    pub async fn count(&self) -> usize {
        self.messages.lock().await.len()
    }
}

/// Test application instance
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub api_client: reqwest::Client,
    pub state: AppState,
    pub outbox: Arc<Outbox>,
}

impl TestApp {
    /// A second client with its own cookie jar
    pub fn new_client(&self) -> reqwest::Client {
        client()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.address, path)
    }

    pub async fn get_health(&self) -> reqwest::Response {
        self.api_client
            .get(self.url("/health"))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_signup(&self, username: &str) -> reqwest::Response {
        self.api_client
            .post(self.url("/auth/signup"))
            .json(&json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": PASSWORD,
            }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_login(&self, login: &str, password: &str) -> reqwest::Response {
        self.api_client
            .post(self.url("/auth/login"))
            .json(&json!({ "login": login, "password": password }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_logout(&self) -> reqwest::Response {
        self.api_client
            .post(self.url("/auth/logout"))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_me(&self) -> reqwest::Response {
        self.api_client
            .get(self.url("/auth/me"))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_token<Body>(&self, body: &Body) -> reqwest::Response
    where
        Body: serde::Serialize,
    {
        self.api_client
            .post(self.url("/tokens"))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn delete_token(&self, token_id: &str) -> reqwest::Response {
        self.api_client
            .delete(self.url(&format!("/tokens/{}", token_id)))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_password_reset(&self, email: &str) -> reqwest::Response {
        self.api_client
            .post(self.url("/auth/password-reset"))
            .json(&json!({ "email": email }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_password_reset_confirm(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> reqwest::Response {
        self.api_client
            .post(self.url("/auth/password-reset/confirm"))
            .json(&json!({ "email": email, "code": code, "new_password": new_password }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Give `user` a fresh role holding `permissions`
    pub async fn grant(&self, user: UserId, permissions: &[Permission]) {
        let directory = &self.state.directory;
        let role = directory
            .create_role(&format!("role-{}-{}", user, permissions.len()))
            .await
            .unwrap();
        for permission in permissions {
            directory.grant_permission(role.id, *permission).await.unwrap();
        }
        directory.add_role_member(role.id, user).await.unwrap();
    }

    /// Sign up `username` and return its id
    pub async fn create_user(&self, username: &str) -> UserId {
        let response = self.post_signup(username).await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.unwrap();
        UserId(body["id"].as_i64().unwrap())
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .cookie_store(true)
        .build()
        .unwrap()
}

/// Spawn the server with the default test configuration
pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

/// Spawn the server after letting the caller adjust the configuration
pub async fn spawn_app_with(adjust: impl FnOnce(&mut WardenConfig)) -> TestApp {
    LazyLock::force(&TRACING);

    let mut config = WardenConfig::default();
    config.server.dev_mode = true;
    // Plain HTTP in tests; Secure cookies would never be sent back.
    config.auth.secure_cookies = false;
    adjust(&mut config);

    let outbox = Arc::new(Outbox::default());
    let server = WardenServerBuilder::from_config(config)
        .mailer(outbox.clone())
        .build()
        .await
        .unwrap();
    let state = server.state().clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(server.serve_on(listener, std::future::pending()));

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        port,
        api_client: client(),
        state,
        outbox,
    }
}
