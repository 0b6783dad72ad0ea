//! Password reset codes and their delivery

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use warden_auth::secrets::generate_reset_code;
use warden_core::WardenResult;

/// Outgoing mail
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> WardenResult<()>;
}

/// Records deliveries in the log instead of sending them.
///
/// The body is not logged since it carries the reset code.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait::async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> WardenResult<()> {
        info!(to, subject, body_len = body.len(), "Mail queued for delivery");
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct PendingCode {
    code: String,
    expires_at: DateTime<Utc>,
}

/// Single-use reset codes keyed by email address
#[derive(Debug, Clone)]
pub struct ResetCodeCache {
    codes: Arc<RwLock<HashMap<String, PendingCode>>>,
    ttl: Duration,
}

impl ResetCodeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            codes: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a new code for `email`, replacing any earlier one.
    pub async fn issue(&self, email: &str) -> String {
        let code = generate_reset_code();
        let pending = PendingCode {
            code: code.clone(),
            expires_at: Utc::now() + self.ttl,
        };
        self.codes
            .write()
            .await
            .insert(email.to_lowercase(), pending);
        code
    }

    /// True at most once per issued code, and only before it expires.
    pub async fn consume(&self, email: &str, code: &str, now: DateTime<Utc>) -> bool {
        let key = email.to_lowercase();
        let mut codes = self.codes.write().await;
        let Some(pending) = codes.get(&key) else {
            return false;
        };
        let expired = now >= pending.expires_at;
        let matches = pending.code == code;
        if expired || matches {
            codes.remove(&key);
        }
        !expired && matches
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut codes = self.codes.write().await;
        let before = codes.len();
        codes.retain(|_, pending| now < pending.expires_at);
        let purged = before - codes.len();
        if purged > 0 {
            debug!("Purged {} expired reset codes", purged);
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_single_use() {
        let cache = ResetCodeCache::new(Duration::minutes(10));
        let code = cache.issue("a@example.com").await;

        assert!(!cache.consume("a@example.com", "wrong", Utc::now()).await);
        assert!(cache.consume("A@Example.com", &code, Utc::now()).await);
        assert!(!cache.consume("a@example.com", &code, Utc::now()).await);
    }

    #[tokio::test]
    async fn test_reissue_replaces_code() {
        let cache = ResetCodeCache::new(Duration::minutes(10));
        let first = cache.issue("a@example.com").await;
        let second = cache.issue("a@example.com").await;

        if first != second {
            assert!(!cache.consume("a@example.com", &first, Utc::now()).await);
        }
        assert!(cache.consume("a@example.com", &second, Utc::now()).await);
    }

    #[tokio::test]
    async fn test_expired_code_rejected_and_purged() {
        let cache = ResetCodeCache::new(Duration::minutes(10));
        let code = cache.issue("a@example.com").await;
        let later = Utc::now() + Duration::minutes(11);

        assert!(!cache.consume("a@example.com", &code, later).await);

        cache.issue("b@example.com").await;
        assert_eq!(cache.purge_expired(Utc::now()).await, 0);
        assert_eq!(cache.purge_expired(later).await, 1);
    }

    #[tokio::test]
    async fn test_log_mailer_accepts() {
        LogMailer
            .send("a@example.com", "Password reset", "code: 1234")
            .await
            .unwrap();
    }
}
