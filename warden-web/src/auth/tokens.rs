//! API token storage
//!
//! Rows back bearer credentials: a bearer token is only honoured while its row
//! exists. Ids are generated by the caller (see `warden_auth::secrets`), never
//! by the database.

use crate::database::{read_error, write_error};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use warden_core::{from_unix_seconds, ApiToken, TokenLookup, UserId, WardenError, WardenResult};

const COMPONENT: &str = "token_store";

/// Persistence for API token rows
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a new row. Fails with a conflict if the id is taken.
    async fn add_token(&self, token: &ApiToken) -> WardenResult<()>;

    async fn get_token(&self, lookup: &TokenLookup) -> WardenResult<Option<ApiToken>>;

    /// All tokens owned by `owner`, oldest first
    async fn get_tokens(&self, owner: UserId) -> WardenResult<Vec<ApiToken>>;

    /// Permanently remove a row
    async fn delete_token(&self, token: &ApiToken) -> WardenResult<()>;

    /// Remove every row with `expires_at <= now`; returns how many went.
    async fn delete_old_tokens(&self, now: DateTime<Utc>) -> WardenResult<u64>;
}

/// In-memory token storage
#[derive(Debug, Default, Clone)]
pub struct MemoryTokenStore {
    tokens: Arc<RwLock<HashMap<String, ApiToken>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TokenStore for MemoryTokenStore {
    async fn add_token(&self, token: &ApiToken) -> WardenResult<()> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&token.token_id) {
            return Err(WardenError::conflict("token id already exists", COMPONENT));
        }
        tokens.insert(token.token_id.clone(), token.clone());
        debug!("Stored token {} for user {}", token.name, token.owner);
        Ok(())
    }

    async fn get_token(&self, lookup: &TokenLookup) -> WardenResult<Option<ApiToken>> {
        let tokens = self.tokens.read().await;
        let found = match lookup {
            TokenLookup::ById(id) => tokens.get(id).cloned(),
            TokenLookup::ByOwnerAndName { owner, name } => tokens
                .values()
                .filter(|t| t.owner == *owner && &t.name == name)
                .max_by_key(|t| t.created_at)
                .cloned(),
        };
        Ok(found)
    }

    async fn get_tokens(&self, owner: UserId) -> WardenResult<Vec<ApiToken>> {
        let tokens = self.tokens.read().await;
        let mut owned: Vec<ApiToken> = tokens
            .values()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.token_id.cmp(&b.token_id))
        });
        Ok(owned)
    }

    async fn delete_token(&self, token: &ApiToken) -> WardenResult<()> {
        let mut tokens = self.tokens.write().await;
        match tokens.remove(&token.token_id) {
            Some(_) => Ok(()),
            None => Err(WardenError::not_found("token", COMPONENT)),
        }
    }

    async fn delete_old_tokens(&self, now: DateTime<Utc>) -> WardenResult<u64> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| !t.is_expired_at(now));
        Ok((before - tokens.len()) as u64)
    }
}

const INSERT_TOKEN: &str = "INSERT INTO api_tokens (token_id, owner_user_id, name, description, expires_at, created_at) VALUES (?, ?, ?, ?, ?, ?)";
const SELECT_BY_ID: &str = "SELECT token_id, owner_user_id, name, description, expires_at, created_at FROM api_tokens WHERE token_id = ?";
const SELECT_BY_OWNER_AND_NAME: &str = "SELECT token_id, owner_user_id, name, description, expires_at, created_at FROM api_tokens WHERE owner_user_id = ? AND name = ? ORDER BY created_at DESC LIMIT 1";
const SELECT_BY_OWNER: &str = "SELECT token_id, owner_user_id, name, description, expires_at, created_at FROM api_tokens WHERE owner_user_id = ? ORDER BY created_at, token_id";
const DELETE_TOKEN: &str = "DELETE FROM api_tokens WHERE token_id = ?";
const DELETE_OLD_TOKENS: &str = "DELETE FROM api_tokens WHERE expires_at <= ?";

/// Statements checked at startup
pub const STATEMENTS: &[&str] = &[
    INSERT_TOKEN,
    SELECT_BY_ID,
    SELECT_BY_OWNER_AND_NAME,
    SELECT_BY_OWNER,
    DELETE_TOKEN,
    DELETE_OLD_TOKENS,
];

/// SQLite-backed token storage
#[derive(Debug, Clone)]
pub struct SqliteTokenStore {
    pool: SqlitePool,
}

impl SqliteTokenStore {
    pub async fn new(pool: SqlitePool) -> WardenResult<Self> {
        crate::database::verify_statements(&pool, STATEMENTS).await?;
        Ok(Self { pool })
    }
}

fn token_from_row(row: &sqlx::sqlite::SqliteRow) -> ApiToken {
    ApiToken {
        token_id: row.get("token_id"),
        owner: UserId(row.get("owner_user_id")),
        name: row.get("name"),
        description: row.get("description"),
        expires_at: from_unix_seconds(row.get("expires_at")),
        created_at: from_unix_seconds(row.get("created_at")),
    }
}

#[async_trait::async_trait]
impl TokenStore for SqliteTokenStore {
    async fn add_token(&self, token: &ApiToken) -> WardenResult<()> {
        sqlx::query(INSERT_TOKEN)
            .bind(&token.token_id)
            .bind(token.owner.get())
            .bind(&token.name)
            .bind(&token.description)
            .bind(token.expires_at.timestamp())
            .bind(token.created_at.timestamp())
            .execute(&self.pool)
            .await
            .map_err(write_error("add_token", "token"))?;

        debug!("Stored token {} for user {}", token.name, token.owner);
        Ok(())
    }

    async fn get_token(&self, lookup: &TokenLookup) -> WardenResult<Option<ApiToken>> {
        let query = match lookup {
            TokenLookup::ById(id) => sqlx::query(SELECT_BY_ID).bind(id.clone()),
            TokenLookup::ByOwnerAndName { owner, name } => sqlx::query(SELECT_BY_OWNER_AND_NAME)
                .bind(owner.get())
                .bind(name.clone()),
        };

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(read_error("get_token"))?;

        Ok(row.as_ref().map(token_from_row))
    }

    async fn get_tokens(&self, owner: UserId) -> WardenResult<Vec<ApiToken>> {
        let rows = sqlx::query(SELECT_BY_OWNER)
            .bind(owner.get())
            .fetch_all(&self.pool)
            .await
            .map_err(read_error("get_tokens"))?;

        Ok(rows.iter().map(token_from_row).collect())
    }

    async fn delete_token(&self, token: &ApiToken) -> WardenResult<()> {
        let result = sqlx::query(DELETE_TOKEN)
            .bind(&token.token_id)
            .execute(&self.pool)
            .await
            .map_err(write_error("delete_token", "token"))?;

        if result.rows_affected() == 0 {
            return Err(WardenError::not_found("token", COMPONENT));
        }
        Ok(())
    }

    async fn delete_old_tokens(&self, now: DateTime<Utc>) -> WardenResult<u64> {
        let result = sqlx::query(DELETE_OLD_TOKENS)
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .map_err(write_error("delete_old_tokens", "token"))?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!("Removed {} expired API tokens", removed);
        }
        Ok(removed)
    }
}
