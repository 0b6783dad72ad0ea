//! Configuration management
//!
//! Layered as: built-in defaults, optional TOML file, `WARDEN__*` environment
//! variables. The result is validated once and then shared read-only.

use crate::config_error;
use crate::error::{WardenError, WardenResult};
use crate::logging::LoggingConfig;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Minimum signing secret length outside development mode
pub const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub bootstrap: Option<BootstrapAdmin>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Enables the development conveniences (generated secret, login bypass)
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            dev_mode: false,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite://warden.db` or `sqlite::memory:`
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

/// Which backend holds API token rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStoreKind {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Symmetric key for bearer token signatures
    pub signing_secret: String,
    /// Lifetime used when a token request does not name one
    pub token_ttl_hours: i64,
    pub max_token_ttl_days: i64,
    pub session_ttl_minutes: i64,
    pub reset_code_ttl_minutes: i64,
    /// Interval of the expired token/session/reset-code sweep
    pub sweep_interval_secs: u64,
    /// Mark cookies `Secure`
    pub secure_cookies: bool,
    /// Let `RequiresLogin` pass unauthenticated requests (dev mode only)
    pub dev_login_bypass: bool,
    pub token_store: TokenStoreKind,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_secret: String::new(),
            token_ttl_hours: 24,
            max_token_ttl_days: 365,
            session_ttl_minutes: 8 * 60,
            reset_code_ttl_minutes: 15,
            sweep_interval_secs: 3600,
            secure_cookies: true,
            dev_login_bypass: false,
            token_store: TokenStoreKind::Sqlite,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("signing_secret", &"<redacted>")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("max_token_ttl_days", &self.max_token_ttl_days)
            .field("session_ttl_minutes", &self.session_ttl_minutes)
            .field("reset_code_ttl_minutes", &self.reset_code_ttl_minutes)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("secure_cookies", &self.secure_cookies)
            .field("dev_login_bypass", &self.dev_login_bypass)
            .field("token_store", &self.token_store)
            .finish()
    }
}

/// Account created at startup when it does not exist yet
#[derive(Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl WardenConfig {
    /// Load defaults, then the optional file, then `WARDEN__SECTION__KEY` variables.
    pub fn load(path: Option<&Path>) -> WardenResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("WARDEN")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| config_error!("failed to read configuration", "config", e))?;

        settings
            .try_deserialize::<WardenConfig>()
            .map_err(|e| config_error!("invalid configuration", "config", e))
    }

    /// Parse a TOML document directly, without environment overrides.
    pub fn from_toml_str(content: &str) -> WardenResult<Self> {
        config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()
            .and_then(|settings| settings.try_deserialize::<WardenConfig>())
            .map_err(|e| config_error!("invalid configuration", "config", e))
    }

    pub fn validate(&self) -> WardenResult<()> {
        let auth = &self.auth;

        if !self.server.dev_mode && auth.signing_secret.len() < MIN_SECRET_BYTES {
            return Err(invalid(
                format!(
                    "auth.signing_secret must be at least {} bytes outside development mode",
                    MIN_SECRET_BYTES
                ),
                "auth.signing_secret",
            ));
        }

        if auth.dev_login_bypass && !self.server.dev_mode {
            return Err(invalid(
                "auth.dev_login_bypass requires server.dev_mode",
                "auth.dev_login_bypass",
            ));
        }

        let positive = [
            ("auth.token_ttl_hours", auth.token_ttl_hours),
            ("auth.max_token_ttl_days", auth.max_token_ttl_days),
            ("auth.session_ttl_minutes", auth.session_ttl_minutes),
            ("auth.reset_code_ttl_minutes", auth.reset_code_ttl_minutes),
        ];
        for (field, value) in positive {
            if value <= 0 {
                return Err(invalid(format!("{} must be positive", field), field));
            }
        }

        if auth.sweep_interval_secs == 0 {
            return Err(invalid(
                "auth.sweep_interval_secs must be positive",
                "auth.sweep_interval_secs",
            ));
        }

        let in_range = |field: &str, value: Option<Duration>| {
            value.ok_or_else(|| invalid(format!("{} is out of range", field), field))
        };
        let token_ttl = in_range("auth.token_ttl_hours", Duration::try_hours(auth.token_ttl_hours))?;
        let max_token_ttl = in_range(
            "auth.max_token_ttl_days",
            Duration::try_days(auth.max_token_ttl_days),
        )?;
        in_range(
            "auth.session_ttl_minutes",
            Duration::try_minutes(auth.session_ttl_minutes),
        )?;
        in_range(
            "auth.reset_code_ttl_minutes",
            Duration::try_minutes(auth.reset_code_ttl_minutes),
        )?;

        if token_ttl > max_token_ttl {
            return Err(invalid(
                "auth.token_ttl_hours exceeds auth.max_token_ttl_days",
                "auth.token_ttl_hours",
            ));
        }

        if self.database.max_connections == 0 {
            return Err(invalid(
                "database.max_connections must be positive",
                "database.max_connections",
            ));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>, field: &str) -> WardenError {
    WardenError::validation(message, field, "config")
}
