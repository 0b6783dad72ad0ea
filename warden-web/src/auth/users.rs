//! User management and authentication

use super::database::UserDirectory;
use super::reset::{Mailer, ResetCodeCache};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};
use warden_auth::{hash_password, secrets::generate_salt, verify_password, Permission};
use warden_core::{
    BootstrapAdmin, NewUser, User, UserId, UserLookup, WardenError, WardenResult,
};

const COMPONENT: &str = "users";

/// Role given to the bootstrap account
pub const ADMIN_ROLE: &str = "Administrators";

const MIN_PASSWORD_CHARS: usize = 8;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").expect("valid username pattern"));
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"));

/// User registration request
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// User login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email address
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetConfirmRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

/// Public user information
#[derive(Debug, Serialize, Clone)]
pub struct UserInfo {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            created_at: user.created_at,
        }
    }
}

/// Account lifecycle: signup, credential checks and password resets
#[derive(Clone)]
pub struct UserService {
    directory: Arc<dyn UserDirectory>,
    reset_codes: ResetCodeCache,
    mailer: Arc<dyn Mailer>,
}

impl UserService {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        reset_codes: ResetCodeCache,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            directory,
            reset_codes,
            mailer,
        }
    }

    pub fn reset_codes(&self) -> &ResetCodeCache {
        &self.reset_codes
    }

    pub async fn register(&self, request: RegisterRequest) -> WardenResult<User> {
        let username = request.username.trim();
        let email = request.email.trim().to_lowercase();

        if !USERNAME_RE.is_match(username) {
            return Err(WardenError::validation(
                "username must be 3-32 letters, digits, '.', '_' or '-'",
                "username",
                COMPONENT,
            ));
        }
        if !EMAIL_RE.is_match(&email) {
            return Err(WardenError::validation(
                "email address is not valid",
                "email",
                COMPONENT,
            ));
        }
        validate_password(&request.password)?;

        let salt = generate_salt();
        let password_hash = hash_blocking(salt.clone(), request.password).await?;

        let user = self
            .directory
            .create_user(NewUser {
                username: username.to_string(),
                email,
                external_username: None,
                password_hash,
                salt,
            })
            .await?;

        info!("User registered: {}", user.username);
        Ok(user)
    }

    /// Verify credentials. Every failure is the same authentication error.
    pub async fn login(&self, request: LoginRequest) -> WardenResult<User> {
        let lookup = UserLookup::UsernameOrEmail(request.login.trim().to_string());
        let user = self.directory.find_user(&lookup).await?;

        let Some(user) = user else {
            // Spend the same work as a real check.
            hash_blocking(generate_salt(), request.password).await?;
            return Err(WardenError::authentication("unknown account", COMPONENT));
        };

        let verified = {
            let (salt, hash) = (user.salt.clone(), user.password_hash.clone());
            tokio::task::spawn_blocking(move || verify_password(&salt, &request.password, &hash))
                .await
                .map_err(|e| WardenError::internal(format!("hash task failed: {}", e), COMPONENT))?
        };

        if !verified {
            return Err(WardenError::authentication("wrong password", COMPONENT));
        }
        if !user.is_active() {
            return Err(WardenError::authentication("inactive account", COMPONENT));
        }

        info!(user_id = %user.id, "User logged in");
        Ok(user)
    }

    /// Send a reset code if the address belongs to an active account.
    ///
    /// Returns the same result whether or not it does.
    pub async fn request_reset(&self, request: ResetRequest) -> WardenResult<()> {
        let email = request.email.trim().to_lowercase();
        let user = self
            .directory
            .find_user(&UserLookup::Email(email.clone()))
            .await?;

        match user {
            Some(user) if user.is_active() => {
                let code = self.reset_codes.issue(&email).await;
                let body = format!(
                    "Your password reset code is {}. It expires in {} minutes.",
                    code,
                    self.reset_codes.ttl().num_minutes()
                );
                if let Err(err) = self.mailer.send(&email, "Password reset", &body).await {
                    warn!(user_id = %user.id, "Reset mail not delivered: {}", err);
                }
            }
            _ => info!("Password reset requested for an unknown or inactive address"),
        }
        Ok(())
    }

    pub async fn confirm_reset(&self, request: ResetConfirmRequest) -> WardenResult<()> {
        validate_password(&request.new_password)?;

        let email = request.email.trim().to_lowercase();
        let invalid =
            || WardenError::validation("invalid or expired reset code", "code", COMPONENT);

        if !self
            .reset_codes
            .consume(&email, request.code.trim(), Utc::now())
            .await
        {
            return Err(invalid());
        }

        let user = self
            .directory
            .find_user(&UserLookup::Email(email))
            .await?
            .filter(User::is_active)
            .ok_or_else(invalid)?;

        let salt = generate_salt();
        let password_hash = hash_blocking(salt.clone(), request.new_password).await?;
        self.directory
            .update_password(user.id, &password_hash, &salt)
            .await?;

        info!(user_id = %user.id, "Password reset completed");
        Ok(())
    }

    /// Create the configured administrator on first start.
    pub async fn ensure_bootstrap_admin(&self, admin: &BootstrapAdmin) -> WardenResult<()> {
        let existing = self
            .directory
            .find_user(&UserLookup::Username(admin.username.clone()))
            .await?;
        if existing.is_some() {
            return Ok(());
        }

        let user = self
            .register(RegisterRequest {
                username: admin.username.clone(),
                email: admin.email.clone(),
                password: admin.password.clone(),
            })
            .await?;

        let role = match self.directory.find_role(ADMIN_ROLE).await? {
            Some(role) => role,
            None => self.directory.create_role(ADMIN_ROLE).await?,
        };
        self.directory
            .grant_permission(role.id, Permission::SuperUser)
            .await?;
        self.directory.add_role_member(role.id, user.id).await?;

        info!("Bootstrap administrator '{}' created", user.username);
        Ok(())
    }
}

fn validate_password(password: &str) -> WardenResult<()> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(WardenError::validation(
            format!("password must be at least {} characters", MIN_PASSWORD_CHARS),
            "password",
            COMPONENT,
        ));
    }
    Ok(())
}

async fn hash_blocking(salt: String, password: String) -> WardenResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&salt, &password))
        .await
        .map_err(|e| WardenError::internal(format!("hash task failed: {}", e), COMPONENT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::database::SqliteDirectory;
    use tokio::sync::Mutex;
    use warden_core::DatabaseConfig;

    /// Keeps sent mail for inspection
    #[derive(Default)]
    struct OutboxMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl Mailer for OutboxMailer {
        async fn send(&self, to: &str, _subject: &str, body: &str) -> WardenResult<()> {
            self.sent.lock().await.push((to.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        service: UserService,
        directory: Arc<SqliteDirectory>,
        outbox: Arc<OutboxMailer>,
    }

    async fn fixture() -> Fixture {
        let pool = crate::database::connect(&DatabaseConfig::default())
            .await
            .unwrap();
        let directory = Arc::new(SqliteDirectory::new(pool).await.unwrap());
        let outbox = Arc::new(OutboxMailer::default());
        let service = UserService::new(
            directory.clone(),
            ResetCodeCache::new(chrono::Duration::minutes(15)),
            outbox.clone(),
        );
        Fixture {
            service,
            directory,
            outbox,
        }
    }

    fn register(name: &str) -> RegisterRequest {
        RegisterRequest {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            password: "correct horse".to_string(),
        }
    }

    fn login(login: &str, password: &str) -> LoginRequest {
        LoginRequest {
            login: login.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login_by_username_or_email() {
        let f = fixture().await;
        let user = f.service.register(register("margaret")).await.unwrap();
        assert_eq!(user.password_hash.len(), 128);
        assert_ne!(user.salt, "");

        let by_name = f.service.login(login("margaret", "correct horse")).await.unwrap();
        let by_email = f
            .service
            .login(login("margaret@example.com", "correct horse"))
            .await
            .unwrap();
        assert_eq!(by_name.id, user.id);
        assert_eq!(by_email.id, user.id);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let f = fixture().await;
        let user = f.service.register(register("edsger")).await.unwrap();

        let wrong_password = f.service.login(login("edsger", "incorrect")).await.unwrap_err();
        let unknown = f.service.login(login("nobody", "whatever1")).await.unwrap_err();
        f.directory.set_enabled(user.id, false).await.unwrap();
        let disabled = f.service.login(login("edsger", "correct horse")).await.unwrap_err();

        for err in [wrong_password, unknown, disabled] {
            assert!(matches!(err, WardenError::Authentication { .. }));
            assert_eq!(err.public_message(), "unauthorized");
        }
    }

    #[tokio::test]
    async fn test_register_validation() {
        let f = fixture().await;

        let mut bad_name = register("ok");
        bad_name.username = "a b".to_string();
        let mut bad_email = register("tony");
        bad_email.email = "tony-at-example".to_string();
        let mut short = register("hoare");
        short.password = "short".to_string();

        for request in [bad_name, bad_email, short] {
            let err = f.service.register(request).await.unwrap_err();
            assert!(matches!(err, WardenError::Validation { .. }));
        }

        f.service.register(register("john")).await.unwrap();
        let err = f.service.register(register("john")).await.unwrap_err();
        assert!(matches!(err, WardenError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let f = fixture().await;
        f.service.register(register("frances")).await.unwrap();

        f.service
            .request_reset(ResetRequest {
                email: "Frances@Example.com".to_string(),
            })
            .await
            .unwrap();

        let (to, body) = f.outbox.sent.lock().await.pop().unwrap();
        assert_eq!(to, "frances@example.com");
        let code = body
            .split_whitespace()
            .nth(5)
            .unwrap()
            .trim_end_matches('.')
            .to_string();

        let confirm = |code: &str| ResetConfirmRequest {
            email: "frances@example.com".to_string(),
            code: code.to_string(),
            new_password: "a brand new secret".to_string(),
        };

        f.service.confirm_reset(confirm(&code)).await.unwrap();
        assert!(f.service.login(login("frances", "correct horse")).await.is_err());
        assert!(f
            .service
            .login(login("frances", "a brand new secret"))
            .await
            .is_ok());

        // Single use
        let err = f.service.confirm_reset(confirm(&code)).await.unwrap_err();
        assert!(matches!(err, WardenError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_reset_for_unknown_address_is_silent() {
        let f = fixture().await;
        f.service
            .request_reset(ResetRequest {
                email: "ghost@example.com".to_string(),
            })
            .await
            .unwrap();
        assert!(f.outbox.sent.lock().await.is_empty());

        let err = f
            .service
            .confirm_reset(ResetConfirmRequest {
                email: "ghost@example.com".to_string(),
                code: "ABCDEFGH".to_string(),
                new_password: "whatever123".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_is_idempotent() {
        let f = fixture().await;
        let admin = BootstrapAdmin {
            username: "root".to_string(),
            email: "root@example.com".to_string(),
            password: "bootstrap-password".to_string(),
        };

        f.service.ensure_bootstrap_admin(&admin).await.unwrap();
        f.service.ensure_bootstrap_admin(&admin).await.unwrap();

        let root = f.service.login(login("root", "bootstrap-password")).await.unwrap();
        assert_eq!(
            f.directory.permission_names(root.id).await.unwrap(),
            vec!["SuperUser".to_string()]
        );
    }
}
