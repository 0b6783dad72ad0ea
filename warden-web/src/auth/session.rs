//! Server-side browser sessions
//!
//! The cookie only carries an opaque id; the principal lives here.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use warden_auth::{secrets::generate_session_id, SessionPrincipal};

/// Cookie carrying the session id
pub const SESSION_COOKIE: &str = "warden_session";
/// Cookie carrying a bearer token for browser API calls
pub const BEARER_COOKIE: &str = "warden_token";

#[derive(Debug, Clone)]
struct SessionRecord {
    principal: SessionPrincipal,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Store a principal under a fresh id, expiring `ttl` from now.
    pub async fn create(&self, principal: SessionPrincipal) -> String {
        let id = generate_session_id();
        let record = SessionRecord {
            principal,
            expires_at: Utc::now() + self.ttl,
        };
        self.sessions.write().await.insert(id.clone(), record);
        id
    }

    /// Read-only lookup; expired sessions read as absent.
    pub async fn get(&self, id: &str, now: DateTime<Utc>) -> Option<SessionPrincipal> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .filter(|record| now < record.expires_at)
            .map(|record| record.principal.clone())
    }

    /// Replace the principal of a live session, keeping its expiry.
    pub async fn update(&self, id: &str, principal: SessionPrincipal) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(record) if Utc::now() < record.expires_at => {
                record.principal = principal;
                true
            }
            _ => false,
        }
    }

    pub async fn destroy(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| now < record.expires_at);
        let purged = before - sessions.len();
        if purged > 0 {
            debug!("Purged {} expired sessions", purged);
        }
        purged
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// HttpOnly, path-wide cookie for `name`
pub fn auth_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Session id presented by the client, if any
pub fn session_id(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE).map(|c| c.value().to_string())
}

/// Expire both auth cookies on the client
pub fn clear_auth_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
        .remove(Cookie::build(BEARER_COOKIE).path("/"))
}
