//! Database-backed user directory
//!
//! Users, roles, permission grants and role memberships. Permission names in
//! the `permissions` table are the catalog's dotted names.

use crate::database::{read_error, verify_statements, write_error};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use warden_auth::Permission;
use warden_core::{
    from_unix_seconds, NewUser, Role, User, UserId, UserLookup, WardenError, WardenResult,
};

const COMPONENT: &str = "user_directory";

/// Read and write access to accounts and their role-derived permissions
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, lookup: &UserLookup) -> WardenResult<Option<User>>;

    /// Exists, enabled and not soft-deleted
    async fn is_user_active(&self, id: UserId) -> WardenResult<bool>;

    /// Union of permission names over every role the user holds
    async fn permission_names(&self, id: UserId) -> WardenResult<Vec<String>>;

    async fn create_user(&self, user: NewUser) -> WardenResult<User>;

    async fn update_password(&self, id: UserId, password_hash: &str, salt: &str)
        -> WardenResult<()>;

    async fn set_enabled(&self, id: UserId, enabled: bool) -> WardenResult<()>;

    /// Marks the account deleted; the row is kept.
    async fn soft_delete(&self, id: UserId, deleted_by: UserId) -> WardenResult<()>;

    async fn create_role(&self, name: &str) -> WardenResult<Role>;

    async fn find_role(&self, name: &str) -> WardenResult<Option<Role>>;

    async fn grant_permission(&self, role_id: i64, permission: Permission) -> WardenResult<()>;

    async fn revoke_permission(&self, role_id: i64, permission: Permission) -> WardenResult<()>;

    async fn add_role_member(&self, role_id: i64, user_id: UserId) -> WardenResult<()>;

    async fn remove_role_member(&self, role_id: i64, user_id: UserId) -> WardenResult<()>;
}

/// Database user record
#[derive(Debug, sqlx::FromRow)]
struct UserRecord {
    id: i64,
    username: String,
    email: String,
    external_username: Option<String>,
    password_hash: String,
    salt: String,
    enabled: bool,
    created_at: i64,
    deleted_at: Option<i64>,
    deleted_by: Option<i64>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        User {
            id: UserId(record.id),
            username: record.username,
            email: record.email,
            external_username: record.external_username,
            password_hash: record.password_hash,
            salt: record.salt,
            enabled: record.enabled,
            created_at: from_unix_seconds(record.created_at),
            deleted_at: record.deleted_at.map(from_unix_seconds),
            deleted_by: record.deleted_by.map(UserId),
        }
    }
}

macro_rules! select_user {
    ($filter:literal) => {
        concat!(
            "SELECT id, username, email, external_username, password_hash, salt, enabled, ",
            "created_at, deleted_at, deleted_by FROM users ",
            $filter
        )
    };
}

const USER_BY_ID: &str = select_user!("WHERE id = ?");
const USER_BY_USERNAME: &str = select_user!("WHERE username = ?");
const USER_BY_EMAIL: &str = select_user!("WHERE email = ?");
const USER_BY_EXTERNAL: &str = select_user!("WHERE external_username = ?");
// A username match wins over an email match.
const USER_BY_LOGIN: &str = select_user!(
    "WHERE username = ? OR email = ? ORDER BY CASE WHEN username = ? THEN 0 ELSE 1 END LIMIT 1"
);
const USER_ACTIVE: &str =
    "SELECT COUNT(*) FROM users WHERE id = ? AND enabled = 1 AND deleted_at IS NULL";
const USER_PERMISSIONS: &str = "SELECT DISTINCT p.name FROM role_members rm \
     JOIN role_permissions rp ON rp.role_id = rm.role_id \
     JOIN permissions p ON p.id = rp.permission_id \
     WHERE rm.user_id = ? ORDER BY p.name";
const INSERT_USER: &str = "INSERT INTO users (username, email, external_username, password_hash, salt, enabled, created_at) VALUES (?, ?, ?, ?, ?, 1, ?)";
const UPDATE_PASSWORD: &str =
    "UPDATE users SET password_hash = ?, salt = ? WHERE id = ? AND deleted_at IS NULL";
const UPDATE_ENABLED: &str = "UPDATE users SET enabled = ? WHERE id = ? AND deleted_at IS NULL";
const SOFT_DELETE: &str =
    "UPDATE users SET deleted_at = ?, deleted_by = ? WHERE id = ? AND deleted_at IS NULL";
const INSERT_ROLE: &str = "INSERT INTO roles (name) VALUES (?)";
const ROLE_BY_NAME: &str = "SELECT id, name FROM roles WHERE name = ?";
const SEED_PERMISSION: &str = "INSERT OR IGNORE INTO permissions (name) VALUES (?)";
const GRANT_PERMISSION: &str = "INSERT OR IGNORE INTO role_permissions (role_id, permission_id) SELECT ?, id FROM permissions WHERE name = ?";
const REVOKE_PERMISSION: &str = "DELETE FROM role_permissions WHERE role_id = ? AND permission_id = (SELECT id FROM permissions WHERE name = ?)";
const ADD_MEMBER: &str = "INSERT OR IGNORE INTO role_members (role_id, user_id) VALUES (?, ?)";
const REMOVE_MEMBER: &str = "DELETE FROM role_members WHERE role_id = ? AND user_id = ?";

/// Statements checked at startup
pub const STATEMENTS: &[&str] = &[
    USER_BY_ID,
    USER_BY_USERNAME,
    USER_BY_EMAIL,
    USER_BY_EXTERNAL,
    USER_BY_LOGIN,
    USER_ACTIVE,
    USER_PERMISSIONS,
    INSERT_USER,
    UPDATE_PASSWORD,
    UPDATE_ENABLED,
    SOFT_DELETE,
    INSERT_ROLE,
    ROLE_BY_NAME,
    SEED_PERMISSION,
    GRANT_PERMISSION,
    REVOKE_PERMISSION,
    ADD_MEMBER,
    REMOVE_MEMBER,
];

/// SQLite user directory
#[derive(Debug, Clone)]
pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    /// Verify statements and make sure every catalog permission has a row.
    pub async fn new(pool: SqlitePool) -> WardenResult<Self> {
        verify_statements(&pool, STATEMENTS).await?;
        let directory = Self { pool };
        directory.seed_permissions().await?;
        Ok(directory)
    }

    async fn seed_permissions(&self) -> WardenResult<()> {
        for permission in Permission::ALL {
            sqlx::query(SEED_PERMISSION)
                .bind(permission.name())
                .execute(&self.pool)
                .await
                .map_err(write_error("seed_permissions", "permission"))?;
        }
        debug!("Seeded {} permissions", Permission::ALL.len());
        Ok(())
    }

    fn require_row(affected: u64, resource: &str) -> WardenResult<()> {
        if affected == 0 {
            Err(WardenError::not_found(resource, COMPONENT))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl UserDirectory for SqliteDirectory {
    async fn find_user(&self, lookup: &UserLookup) -> WardenResult<Option<User>> {
        let query = match lookup {
            UserLookup::Id(id) => sqlx::query_as::<_, UserRecord>(USER_BY_ID).bind(id.get()),
            UserLookup::Username(name) => {
                sqlx::query_as::<_, UserRecord>(USER_BY_USERNAME).bind(name.clone())
            }
            UserLookup::Email(email) => {
                sqlx::query_as::<_, UserRecord>(USER_BY_EMAIL).bind(email.clone())
            }
            UserLookup::ExternalUsername(name) => {
                sqlx::query_as::<_, UserRecord>(USER_BY_EXTERNAL).bind(name.clone())
            }
            UserLookup::UsernameOrEmail(login) => sqlx::query_as::<_, UserRecord>(USER_BY_LOGIN)
                .bind(login.clone())
                .bind(login.clone())
                .bind(login.clone()),
        };

        let record = query
            .fetch_optional(&self.pool)
            .await
            .map_err(read_error("find_user"))?;

        Ok(record.map(User::from))
    }

    async fn is_user_active(&self, id: UserId) -> WardenResult<bool> {
        let count: i64 = sqlx::query_scalar(USER_ACTIVE)
            .bind(id.get())
            .fetch_one(&self.pool)
            .await
            .map_err(read_error("is_user_active"))?;
        Ok(count > 0)
    }

    async fn permission_names(&self, id: UserId) -> WardenResult<Vec<String>> {
        sqlx::query_scalar(USER_PERMISSIONS)
            .bind(id.get())
            .fetch_all(&self.pool)
            .await
            .map_err(read_error("permission_names"))
    }

    async fn create_user(&self, user: NewUser) -> WardenResult<User> {
        let result = sqlx::query(INSERT_USER)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.external_username)
            .bind(&user.password_hash)
            .bind(&user.salt)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(write_error("create_user", "username or email"))?;

        let id = UserId(result.last_insert_rowid());
        info!("Created user {} ({})", user.username, id);

        self.find_user(&UserLookup::Id(id))
            .await?
            .ok_or_else(|| WardenError::internal("created user row vanished", COMPONENT))
    }

    async fn update_password(
        &self,
        id: UserId,
        password_hash: &str,
        salt: &str,
    ) -> WardenResult<()> {
        let result = sqlx::query(UPDATE_PASSWORD)
            .bind(password_hash)
            .bind(salt)
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(write_error("update_password", "user"))?;
        Self::require_row(result.rows_affected(), "user")
    }

    async fn set_enabled(&self, id: UserId, enabled: bool) -> WardenResult<()> {
        let result = sqlx::query(UPDATE_ENABLED)
            .bind(enabled)
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(write_error("set_enabled", "user"))?;
        Self::require_row(result.rows_affected(), "user")
    }

    async fn soft_delete(&self, id: UserId, deleted_by: UserId) -> WardenResult<()> {
        let result = sqlx::query(SOFT_DELETE)
            .bind(Utc::now().timestamp())
            .bind(deleted_by.get())
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(write_error("soft_delete", "user"))?;
        Self::require_row(result.rows_affected(), "user")?;
        info!("User {} soft-deleted by {}", id, deleted_by);
        Ok(())
    }

    async fn create_role(&self, name: &str) -> WardenResult<Role> {
        let result = sqlx::query(INSERT_ROLE)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(write_error("create_role", "role"))?;
        Ok(Role {
            id: result.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    async fn find_role(&self, name: &str) -> WardenResult<Option<Role>> {
        let row: Option<(i64, String)> = sqlx::query_as(ROLE_BY_NAME)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_error("find_role"))?;
        Ok(row.map(|(id, name)| Role { id, name }))
    }

    async fn grant_permission(&self, role_id: i64, permission: Permission) -> WardenResult<()> {
        sqlx::query(GRANT_PERMISSION)
            .bind(role_id)
            .bind(permission.name())
            .execute(&self.pool)
            .await
            .map_err(write_error("grant_permission", "role"))?;
        debug!("Granted {} to role {}", permission, role_id);
        Ok(())
    }

    async fn revoke_permission(&self, role_id: i64, permission: Permission) -> WardenResult<()> {
        sqlx::query(REVOKE_PERMISSION)
            .bind(role_id)
            .bind(permission.name())
            .execute(&self.pool)
            .await
            .map_err(write_error("revoke_permission", "role"))?;
        debug!("Revoked {} from role {}", permission, role_id);
        Ok(())
    }

    async fn add_role_member(&self, role_id: i64, user_id: UserId) -> WardenResult<()> {
        sqlx::query(ADD_MEMBER)
            .bind(role_id)
            .bind(user_id.get())
            .execute(&self.pool)
            .await
            .map_err(write_error("add_role_member", "role or user"))?;
        Ok(())
    }

    async fn remove_role_member(&self, role_id: i64, user_id: UserId) -> WardenResult<()> {
        sqlx::query(REMOVE_MEMBER)
            .bind(role_id)
            .bind(user_id.get())
            .execute(&self.pool)
            .await
            .map_err(write_error("remove_role_member", "role or user"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::DatabaseConfig;

    async fn directory() -> SqliteDirectory {
        let pool = crate::database::connect(&DatabaseConfig::default())
            .await
            .unwrap();
        SqliteDirectory::new(pool).await.unwrap()
    }

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            external_username: None,
            password_hash: "hash".to_string(),
            salt: "salt".to_string(),
        }
    }

    #[tokio::test]
    async fn test_lookups() {
        let dir = directory().await;
        let mut new = new_user("grace");
        new.external_username = Some("grace@idp".to_string());
        let user = dir.create_user(new).await.unwrap();

        for lookup in [
            UserLookup::Id(user.id),
            UserLookup::Username("grace".to_string()),
            UserLookup::Email("grace@example.com".to_string()),
            UserLookup::ExternalUsername("grace@idp".to_string()),
            UserLookup::UsernameOrEmail("grace".to_string()),
            UserLookup::UsernameOrEmail("grace@example.com".to_string()),
        ] {
            let found = dir.find_user(&lookup).await.unwrap();
            assert_eq!(found.map(|u| u.id), Some(user.id), "{:?}", lookup);
        }

        assert!(dir
            .find_user(&UserLookup::Username("nobody".to_string()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let dir = directory().await;
        dir.create_user(new_user("alan")).await.unwrap();

        let err = dir.create_user(new_user("alan")).await.unwrap_err();
        assert!(matches!(err, WardenError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_activity_follows_enable_and_soft_delete() {
        let dir = directory().await;
        let admin = dir.create_user(new_user("admin")).await.unwrap();
        let user = dir.create_user(new_user("linus")).await.unwrap();
        assert!(dir.is_user_active(user.id).await.unwrap());

        dir.set_enabled(user.id, false).await.unwrap();
        assert!(!dir.is_user_active(user.id).await.unwrap());

        dir.set_enabled(user.id, true).await.unwrap();
        dir.soft_delete(user.id, admin.id).await.unwrap();
        assert!(!dir.is_user_active(user.id).await.unwrap());

        // Row kept, markers set
        let kept = dir.find_user(&UserLookup::Id(user.id)).await.unwrap().unwrap();
        assert!(kept.is_deleted());
        assert_eq!(kept.deleted_by, Some(admin.id));

        // Deleted accounts cannot be deleted twice or re-enabled
        assert!(dir.soft_delete(user.id, admin.id).await.is_err());
        assert!(dir.set_enabled(user.id, true).await.is_err());
        assert!(!dir.is_user_active(UserId(4242)).await.unwrap());
    }

    #[tokio::test]
    async fn test_permissions_are_union_of_roles() {
        let dir = directory().await;
        let user = dir.create_user(new_user("ken")).await.unwrap();
        let editors = dir.create_role("Editors").await.unwrap();
        let uploaders = dir.create_role("Uploaders").await.unwrap();

        dir.grant_permission(editors.id, Permission::CmsPageCreator).await.unwrap();
        dir.grant_permission(editors.id, Permission::CmsPostCreator).await.unwrap();
        dir.grant_permission(uploaders.id, Permission::CmsPageCreator).await.unwrap();
        dir.grant_permission(uploaders.id, Permission::CmsMediaUploader).await.unwrap();

        assert!(dir.permission_names(user.id).await.unwrap().is_empty());

        dir.add_role_member(editors.id, user.id).await.unwrap();
        dir.add_role_member(uploaders.id, user.id).await.unwrap();
        assert_eq!(
            dir.permission_names(user.id).await.unwrap(),
            vec!["CMS.Media.Uploader", "CMS.Page.Creator", "CMS.Post.Creator"]
        );

        dir.revoke_permission(editors.id, Permission::CmsPostCreator).await.unwrap();
        dir.remove_role_member(uploaders.id, user.id).await.unwrap();
        assert_eq!(
            dir.permission_names(user.id).await.unwrap(),
            vec!["CMS.Page.Creator"]
        );
    }

    #[tokio::test]
    async fn test_membership_requires_existing_rows() {
        let dir = directory().await;
        let role = dir.create_role("Ghosts").await.unwrap();
        let err = dir.add_role_member(role.id, UserId(999)).await.unwrap_err();
        assert!(matches!(err, WardenError::NotFound { .. }));

        assert_eq!(dir.find_role("Ghosts").await.unwrap(), Some(role));
        assert!(dir.find_role("Nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_password_update() {
        let dir = directory().await;
        let user = dir.create_user(new_user("barbara")).await.unwrap();
        dir.update_password(user.id, "newhash", "newsalt").await.unwrap();

        let updated = dir.find_user(&UserLookup::Id(user.id)).await.unwrap().unwrap();
        assert_eq!(updated.password_hash, "newhash");
        assert_eq!(updated.salt, "newsalt");

        assert!(dir.update_password(UserId(777), "h", "s").await.is_err());
    }
}
