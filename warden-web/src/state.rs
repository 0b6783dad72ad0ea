//! Application state shared by every handler and middleware

use crate::auth::{
    database::{SqliteDirectory, UserDirectory},
    jwt::{BearerValidator, TokenIssuer},
    reset::{LogMailer, Mailer, ResetCodeCache},
    resolver::{BearerResolver, CredentialResolver, SessionResolver},
    session::SessionStore,
    tokens::{MemoryTokenStore, SqliteTokenStore, TokenStore},
    users::UserService,
};
use crate::database;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use warden_auth::{secrets::generate_signing_secret, ImplicationEngine};
use warden_core::{TokenStoreKind, WardenConfig, WardenResult};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<WardenConfig>,
    pub directory: Arc<dyn UserDirectory>,
    pub tokens: Arc<dyn TokenStore>,
    pub sessions: SessionStore,
    pub issuer: Arc<TokenIssuer>,
    pub validator: BearerValidator,
    /// Built once at startup; read-only afterwards
    pub engine: Arc<ImplicationEngine>,
    pub resolver: Arc<CredentialResolver>,
    pub users: UserService,
}

/// Counts from one maintenance pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub tokens_removed: u64,
    pub sessions_removed: usize,
    pub reset_codes_removed: usize,
}

impl AppState {
    pub async fn new(config: WardenConfig) -> WardenResult<Self> {
        Self::with_mailer(config, Arc::new(LogMailer)).await
    }

    /// Build the state with a specific mail transport
    pub async fn with_mailer(
        mut config: WardenConfig,
        mailer: Arc<dyn Mailer>,
    ) -> WardenResult<Self> {
        config.validate()?;

        if config.auth.signing_secret.is_empty() {
            warn!("No signing secret configured; using a random one. Tokens will not survive a restart");
            config.auth.signing_secret = generate_signing_secret();
        }
        if config.auth.dev_login_bypass {
            warn!("Development login bypass is enabled; login-only routes accept anonymous requests");
        }

        let pool = database::connect(&config.database).await?;
        let directory: Arc<dyn UserDirectory> =
            Arc::new(SqliteDirectory::new(pool.clone()).await?);
        let tokens: Arc<dyn TokenStore> = match config.auth.token_store {
            TokenStoreKind::Sqlite => Arc::new(SqliteTokenStore::new(pool).await?),
            TokenStoreKind::Memory => {
                info!("Using in-memory token store");
                Arc::new(MemoryTokenStore::new())
            }
        };

        let auth = &config.auth;
        let sessions = SessionStore::new(Duration::minutes(auth.session_ttl_minutes));
        let issuer = Arc::new(TokenIssuer::from_config(auth));
        let validator = BearerValidator::new(issuer.clone(), tokens.clone(), directory.clone());
        let resolver = Arc::new(CredentialResolver::new(
            Arc::new(SessionResolver::new(sessions.clone(), directory.clone())),
            Arc::new(BearerResolver::new(validator.clone())),
        ));
        let users = UserService::new(
            directory.clone(),
            ResetCodeCache::new(Duration::minutes(auth.reset_code_ttl_minutes)),
            mailer,
        );

        if let Some(admin) = &config.bootstrap {
            users.ensure_bootstrap_admin(admin).await?;
        }

        let engine = Arc::new(ImplicationEngine::new());
        info!("Application state initialized");

        Ok(Self {
            config: Arc::new(config),
            directory,
            tokens,
            sessions,
            issuer,
            validator,
            engine,
            resolver,
            users,
        })
    }

    pub fn dev_login_bypass(&self) -> bool {
        self.config.server.dev_mode && self.config.auth.dev_login_bypass
    }

    pub fn secure_cookies(&self) -> bool {
        self.config.auth.secure_cookies
    }

    /// Drop expired token rows, sessions and reset codes.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> WardenResult<SweepReport> {
        let tokens_removed = self.tokens.delete_old_tokens(now).await?;
        let sessions_removed = self.sessions.purge_expired(now).await;
        let reset_codes_removed = self.users.reset_codes().purge_expired(now).await;

        let report = SweepReport {
            tokens_removed,
            sessions_removed,
            reset_codes_removed,
        };
        info!(?report, "Maintenance sweep finished");
        Ok(report)
    }
}
