//! Bearer token issuance and validation
//!
//! Bearer tokens are HS512-signed claims that point at an API token row. The
//! signature and expiry are checked first; only a structurally valid, unexpired
//! token costs a store lookup. Deleting the row revokes the token immediately.

use super::database::UserDirectory;
use super::tokens::TokenStore;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_auth::{secrets::generate_token_id, Permission};
use warden_core::{ApiToken, AuthConfig, TokenLookup, UserId, WardenError, WardenResult};

const COMPONENT: &str = "bearer";

/// The only accepted signing algorithm
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS512;

/// Signing and verification keys derived from the configured secret
struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Claims carried by a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerClaims {
    #[serde(rename = "userID")]
    pub user_id: UserId,
    /// Permission names held at issuance; informational only
    pub permissions: Vec<String>,
    /// Primary key of the backing API token row
    #[serde(rename = "tokenID")]
    pub token_id: String,
    /// Expiry as a unix timestamp in seconds
    pub exp: i64,
}

/// Why a bearer token was refused. Only ever logged.
#[derive(Debug, thiserror::Error)]
pub enum TokenRejection {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("signature verification failed")]
    BadSignature,
    #[error("unexpected signing algorithm {0:?}")]
    WrongAlgorithm(Algorithm),
    #[error("token expired")]
    Expired,
    #[error("token revoked")]
    Revoked,
    #[error("user no longer active")]
    UserInactive,
    /// The store could not be asked; not a judgement on the token
    #[error(transparent)]
    Unavailable(WardenError),
}

impl TokenRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            TokenRejection::Malformed(_) => "malformed",
            TokenRejection::BadSignature => "bad_signature",
            TokenRejection::WrongAlgorithm(_) => "wrong_algorithm",
            TokenRejection::Expired => "expired",
            TokenRejection::Revoked => "revoked",
            TokenRejection::UserInactive => "user_inactive",
            TokenRejection::Unavailable(_) => "unavailable",
        }
    }
}

impl From<TokenRejection> for WardenError {
    fn from(rejection: TokenRejection) -> Self {
        match rejection {
            TokenRejection::Unavailable(err) => err,
            other => WardenError::authentication(other.to_string(), COMPONENT),
        }
    }
}

/// Parameters of a token request
#[derive(Debug, Clone, Deserialize)]
pub struct IssueRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Lifetime in hours; the configured default when absent
    pub expires_in_hours: Option<i64>,
}

/// A freshly minted bearer token
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub token_id: String,
    pub name: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and structurally verifies bearer tokens
pub struct TokenIssuer {
    keys: Keys,
    default_ttl: Duration,
    max_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], default_ttl: Duration, max_ttl: Duration) -> Self {
        Self {
            keys: Keys::new(secret),
            default_ttl,
            max_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.signing_secret.as_bytes(),
            Duration::hours(config.token_ttl_hours),
            Duration::days(config.max_token_ttl_days),
        )
    }

    pub fn sign(&self, claims: &BearerClaims) -> WardenResult<String> {
        encode(&Header::new(SIGNING_ALGORITHM), claims, &self.keys.encoding).map_err(|e| {
            WardenError::Internal {
                message: "failed to sign bearer token".to_string(),
                source: Some(Box::new(e)),
                context: warden_core::ErrorContext::new(COMPONENT).with_operation("sign"),
            }
        })
    }

    /// Steps that need no I/O: signature and claim shape, algorithm, expiry.
    pub fn verify_structure(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<BearerClaims, TokenRejection> {
        let header = decode_header(token).map_err(map_decode_error)?;

        // Verify with the algorithm the token names so that a correctly signed
        // token under the wrong algorithm is reported as such below.
        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<BearerClaims>(token, &self.keys.decoding, &validation)
            .map_err(map_decode_error)?;

        if data.header.alg != SIGNING_ALGORITHM {
            return Err(TokenRejection::WrongAlgorithm(data.header.alg));
        }

        if now.timestamp() >= data.claims.exp {
            return Err(TokenRejection::Expired);
        }

        Ok(data.claims)
    }

    /// Register a token row for `owner` and sign a claim for it.
    ///
    /// The row is written first; if signing then fails the row is removed
    /// again. Nothing here is retried.
    pub async fn issue(
        &self,
        owner: UserId,
        request: IssueRequest,
        tokens: &dyn TokenStore,
        directory: &dyn UserDirectory,
    ) -> WardenResult<IssuedToken> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(WardenError::validation("token name is required", "name", COMPONENT));
        }

        let ttl = match request.expires_in_hours {
            Some(hours) if hours <= 0 => {
                return Err(WardenError::validation(
                    "expires_in_hours must be positive",
                    "expires_in_hours",
                    COMPONENT,
                ))
            }
            Some(hours) => Duration::try_hours(hours),
            None => Some(self.default_ttl),
        };
        // Out-of-range hour counts fail the same way as lifetimes above the cap.
        let ttl = match ttl {
            Some(ttl) if ttl <= self.max_ttl => ttl,
            _ => {
                return Err(WardenError::validation(
                    format!("token lifetime may not exceed {} days", self.max_ttl.num_days()),
                    "expires_in_hours",
                    COMPONENT,
                ))
            }
        };

        let permissions = directory.permission_names(owner).await?;
        let row = ApiToken::new(
            generate_token_id(),
            owner,
            name,
            request.description,
            Utc::now() + ttl,
        );
        tokens.add_token(&row).await?;

        let claims = BearerClaims {
            user_id: owner,
            permissions,
            token_id: row.token_id.clone(),
            exp: row.expires_at.timestamp(),
        };

        let token = match self.sign(&claims) {
            Ok(token) => token,
            Err(err) => {
                if let Err(cleanup) = tokens.delete_token(&row).await {
                    warn!("Failed to remove unsigned token row: {}", cleanup);
                }
                return Err(err);
            }
        };

        info!(user_id = %owner, token_name = %row.name, "Issued bearer token");

        Ok(IssuedToken {
            token,
            token_id: row.token_id,
            name: row.name,
            expires_at: row.expires_at,
        })
    }
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> TokenRejection {
    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidKeyFormat | ErrorKind::InvalidAlgorithm => {
            TokenRejection::BadSignature
        }
        _ => TokenRejection::Malformed(err.to_string()),
    }
}

/// Runs the full bearer check against the token store and user directory
#[derive(Clone)]
pub struct BearerValidator {
    issuer: Arc<TokenIssuer>,
    tokens: Arc<dyn TokenStore>,
    directory: Arc<dyn UserDirectory>,
}

impl BearerValidator {
    pub fn new(
        issuer: Arc<TokenIssuer>,
        tokens: Arc<dyn TokenStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            issuer,
            tokens,
            directory,
        }
    }

    pub async fn validate(&self, token: &str) -> Result<BearerClaims, TokenRejection> {
        self.validate_at(token, Utc::now()).await
    }

    /// Signature, algorithm, expiry, store row, then account state.
    pub async fn validate_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<BearerClaims, TokenRejection> {
        let claims = self.issuer.verify_structure(token, now)?;

        let row = self
            .tokens
            .get_token(&TokenLookup::ById(claims.token_id.clone()))
            .await
            .map_err(TokenRejection::Unavailable)?;

        // A row that changed owner or lapsed since issuance counts as revoked.
        match row {
            Some(row) if row.owner == claims.user_id && !row.is_expired_at(now) => {}
            _ => return Err(TokenRejection::Revoked),
        }

        let active = self
            .directory
            .is_user_active(claims.user_id)
            .await
            .map_err(TokenRejection::Unavailable)?;
        if !active {
            return Err(TokenRejection::UserInactive);
        }

        debug!(user_id = %claims.user_id, "Bearer token accepted");
        Ok(claims)
    }
}

/// Permissions parsed from stored names; unknown names are skipped.
pub fn parse_permissions(names: &[String]) -> warden_auth::PermissionSet {
    names
        .iter()
        .filter_map(|name| match name.parse::<Permission>() {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Ignoring {}", e);
                None
            }
        })
        .collect()
}
