//! SQLite connection pool and schema

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Executor, SqlitePool,
};
use std::str::FromStr;
use tracing::{debug, error, info};
use warden_core::{config_error, DatabaseConfig, WardenError, WardenResult};

const COMPONENT: &str = "database";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        external_username TEXT UNIQUE,
        password_hash TEXT NOT NULL,
        salt TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL,
        deleted_at INTEGER,
        deleted_by INTEGER REFERENCES users(id)
    );

    CREATE TABLE IF NOT EXISTS roles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS permissions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS role_permissions (
        role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        permission_id INTEGER NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
        PRIMARY KEY (role_id, permission_id)
    );

    CREATE TABLE IF NOT EXISTS role_members (
        role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        user_id INTEGER NOT NULL REFERENCES users(id),
        PRIMARY KEY (role_id, user_id)
    );

    CREATE TABLE IF NOT EXISTS api_tokens (
        token_id TEXT PRIMARY KEY NOT NULL,
        owner_user_id INTEGER NOT NULL REFERENCES users(id),
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        expires_at INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_role_members_user ON role_members(user_id);
    CREATE INDEX IF NOT EXISTS idx_api_tokens_owner ON api_tokens(owner_user_id);
    CREATE INDEX IF NOT EXISTS idx_api_tokens_expires ON api_tokens(expires_at);
"#;

/// Open the pool and create the schema.
///
/// In-memory databases live as long as their connection, so they get exactly
/// one connection that is never recycled.
pub async fn connect(config: &DatabaseConfig) -> WardenResult<SqlitePool> {
    info!("Connecting to database: {}", config.url);

    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| config_error!(format!("invalid database url '{}'", config.url), COMPONENT, e))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool_options = if config.is_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections)
    };

    let pool = pool_options.connect_with(options).await.map_err(|e| {
        error!("Database connection failed: {}", e);
        WardenError::read_failure("connect", COMPONENT, e)
    })?;

    create_schema(&pool).await?;

    info!("Database ready");
    Ok(pool)
}

async fn create_schema(pool: &SqlitePool) -> WardenResult<()> {
    sqlx::raw_sql(SCHEMA).execute(pool).await.map_err(|e| {
        error!("Failed to create schema: {}", e);
        WardenError::write_failure("create_schema", COMPONENT, e)
    })?;
    debug!("Schema created");
    Ok(())
}

/// Prepare every static statement once so a broken query fails startup
/// instead of a request.
pub async fn verify_statements(pool: &SqlitePool, statements: &[&str]) -> WardenResult<()> {
    for sql in statements {
        pool.prepare(*sql).await.map_err(|e| {
            error!("Statement failed to prepare: {}", sql.trim());
            config_error!(format!("invalid SQL statement: {}", sql.trim()), COMPONENT, e)
        })?;
    }
    debug!("Verified {} statements", statements.len());
    Ok(())
}

/// Map a failed read
pub(crate) fn read_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> WardenError {
    move |e| {
        error!(operation, "Database read failed: {}", e);
        WardenError::read_failure(operation, COMPONENT, e)
    }
}

/// Map a failed write, surfacing constraint violations as caller errors
pub(crate) fn write_error(
    operation: &'static str,
    resource: &'static str,
) -> impl FnOnce(sqlx::Error) -> WardenError {
    move |e| {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return WardenError::conflict(format!("{} already exists", resource), COMPONENT);
            }
            if db.is_foreign_key_violation() {
                return WardenError::not_found(format!("{} reference", resource), COMPONENT);
            }
        }
        error!(operation, "Database write failed: {}", e);
        WardenError::write_failure(operation, COMPONENT, e)
    }
}
