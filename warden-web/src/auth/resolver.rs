//! Resolving the effective principal of a request
//!
//! Two credential kinds, one interface: a session cookie resolves through the
//! session store, a bearer token through the full bearer validation. An
//! authenticated session wins; otherwise a presented bearer token is used.

use super::database::UserDirectory;
use super::jwt::BearerValidator;
use super::session::{session_id, SessionStore, BEARER_COOKIE};
use super::{PrincipalSource, ResolvedPrincipal};
use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;
use warden_core::WardenError;

#[derive(Debug)]
pub enum ResolveError {
    /// No usable credential; the reason is for logs only
    Unauthenticated(&'static str),
    /// A backing store failed while checking the credential
    Unavailable(WardenError),
}

#[async_trait::async_trait]
pub trait PrincipalResolver: Send + Sync {
    async fn resolve(
        &self,
        credential: &str,
        now: DateTime<Utc>,
    ) -> Result<ResolvedPrincipal, ResolveError>;
}

pub struct SessionResolver {
    sessions: SessionStore,
    directory: Arc<dyn UserDirectory>,
}

impl SessionResolver {
    pub fn new(sessions: SessionStore, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            sessions,
            directory,
        }
    }

    async fn is_active(&self, user: warden_core::UserId) -> Result<bool, ResolveError> {
        self.directory
            .is_user_active(user)
            .await
            .map_err(ResolveError::Unavailable)
    }
}

#[async_trait::async_trait]
impl PrincipalResolver for SessionResolver {
    async fn resolve(
        &self,
        credential: &str,
        now: DateTime<Utc>,
    ) -> Result<ResolvedPrincipal, ResolveError> {
        let principal = self
            .sessions
            .get(credential, now)
            .await
            .ok_or(ResolveError::Unauthenticated("session_unknown"))?;
        if !principal.is_authenticated() {
            return Err(ResolveError::Unauthenticated("session_anonymous"));
        }

        let (Some(actor), Some(effective)) = (principal.logged_in_user(), principal.effective_user())
        else {
            return Err(ResolveError::Unauthenticated("session_anonymous"));
        };
        let (actor_id, user_id) = (actor.id, effective.id);

        // Disabling or deleting either account ends the session's authority.
        if !self.is_active(actor_id).await? {
            return Err(ResolveError::Unauthenticated("user_inactive"));
        }
        if user_id != actor_id && !self.is_active(user_id).await? {
            return Err(ResolveError::Unauthenticated("assumed_user_inactive"));
        }

        Ok(ResolvedPrincipal {
            user_id,
            actor_id,
            source: PrincipalSource::Session {
                session_id: credential.to_string(),
                principal,
            },
        })
    }
}

pub struct BearerResolver {
    validator: BearerValidator,
}

impl BearerResolver {
    pub fn new(validator: BearerValidator) -> Self {
        Self { validator }
    }
}

#[async_trait::async_trait]
impl PrincipalResolver for BearerResolver {
    async fn resolve(
        &self,
        credential: &str,
        now: DateTime<Utc>,
    ) -> Result<ResolvedPrincipal, ResolveError> {
        match self.validator.validate_at(credential, now).await {
            Ok(claims) => Ok(ResolvedPrincipal {
                user_id: claims.user_id,
                actor_id: claims.user_id,
                source: PrincipalSource::Bearer {
                    token_id: claims.token_id,
                },
            }),
            Err(super::jwt::TokenRejection::Unavailable(err)) => {
                Err(ResolveError::Unavailable(err))
            }
            Err(rejection) => Err(ResolveError::Unauthenticated(rejection.reason())),
        }
    }
}

/// Picks the resolver matching the credential a request carries
pub struct CredentialResolver {
    session: Arc<dyn PrincipalResolver>,
    bearer: Arc<dyn PrincipalResolver>,
}

impl CredentialResolver {
    pub fn new(session: Arc<dyn PrincipalResolver>, bearer: Arc<dyn PrincipalResolver>) -> Self {
        Self { session, bearer }
    }

    pub async fn resolve_headers(
        &self,
        headers: &HeaderMap,
    ) -> Result<ResolvedPrincipal, ResolveError> {
        let jar = CookieJar::from_headers(headers);
        let now = Utc::now();
        let mut failure = ResolveError::Unauthenticated("missing_credential");

        if let Some(id) = session_id(&jar) {
            match self.session.resolve(&id, now).await {
                Ok(principal) => return Ok(principal),
                Err(ResolveError::Unavailable(err)) => return Err(ResolveError::Unavailable(err)),
                Err(err) => {
                    debug!("Session not usable: {:?}", err);
                    failure = err;
                }
            }
        }

        match bearer_credential(headers, &jar) {
            Some(token) => self.bearer.resolve(&token, now).await,
            None => Err(failure),
        }
    }
}

/// `Authorization: Bearer <token>` or the bearer cookie
pub fn bearer_credential(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    let from_header = headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().trim().to_string())
        .filter(|token| !token.is_empty());

    from_header.or_else(|| jar.get(BEARER_COOKIE).map(|c| c.value().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_bearer_from_header() {
        let h = headers(&[("authorization", "Bearer abc.def.ghi")]);
        let jar = CookieJar::from_headers(&h);
        assert_eq!(bearer_credential(&h, &jar).as_deref(), Some("abc.def.ghi"));

        let h = headers(&[("authorization", "bearer xyz")]);
        let jar = CookieJar::from_headers(&h);
        assert_eq!(bearer_credential(&h, &jar).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_bearer_from_cookie() {
        let h = headers(&[("cookie", "warden_token=tok; other=1")]);
        let jar = CookieJar::from_headers(&h);
        assert_eq!(bearer_credential(&h, &jar).as_deref(), Some("tok"));
    }

    #[test]
    fn test_non_bearer_schemes_ignored() {
        let h = headers(&[("authorization", "Basic dXNlcjpwYXNz")]);
        let jar = CookieJar::from_headers(&h);
        assert!(bearer_credential(&h, &jar).is_none());

        let h = headers(&[("authorization", "Bearer ")]);
        let jar = CookieJar::from_headers(&h);
        assert!(bearer_credential(&h, &jar).is_none());
    }
}
