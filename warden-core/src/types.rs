//! Core data types shared across the workspace

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Database identifier of a user account.
///
/// Serialized as a bare integer so it can be embedded directly in bearer claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A persisted user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// Username at an external identity provider, if linked
    pub external_username: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub salt: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<UserId>,
}

impl User {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Enabled and not soft-deleted.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.is_deleted()
    }
}

/// Fields required to create a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub external_username: Option<String>,
    pub password_hash: String,
    pub salt: String,
}

/// A named group of permission grants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

/// Unique ways to look up a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    Id(UserId),
    Username(String),
    Email(String),
    ExternalUsername(String),
    /// Matches either the username or the email column
    UsernameOrEmail(String),
}

/// An API token row backing a bearer credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiToken {
    /// Random, caller-generated primary key
    pub token_id: String,
    pub owner: UserId,
    pub name: String,
    pub description: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ApiToken {
    /// Timestamps are truncated to whole seconds to match the bearer claim's `exp`.
    pub fn new(
        token_id: impl Into<String>,
        owner: UserId,
        name: impl Into<String>,
        description: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id: token_id.into(),
            owner,
            name: name.into(),
            description: description.into(),
            expires_at: truncate_to_seconds(expires_at),
            created_at: truncate_to_seconds(Utc::now()),
        }
    }

    /// Expiry is exclusive: a token expiring exactly at `now` is expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Ways to look up a single API token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLookup {
    ById(String),
    ByOwnerAndName { owner: UserId, name: String },
}

pub fn truncate_to_seconds(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.with_nanosecond(0).unwrap_or(instant)
}

/// Convert a stored unix timestamp back into a UTC instant.
pub fn from_unix_seconds(seconds: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(seconds, 0).unwrap_or_default()
}
