//! Session principal state machine
//!
//! ```text
//! Anonymous --login--> Authenticated --assume--> Assumed
//!     ^                  |      ^                  |
//!     +------logout------+      +-----release------+
//! ```
//!
//! Logout and login are accepted from every state. An assumed user only
//! exists alongside the authenticated user who assumed it.

use serde::{Deserialize, Serialize};
use warden_core::UserId;

/// The part of a user record a session keeps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: UserId,
    pub username: String,
}

impl UserSnapshot {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionPrincipal {
    #[default]
    Anonymous,
    /// Credentials were verified for `user`
    Authenticated { user: UserSnapshot },
    /// `user` is acting as `assumed`
    Assumed {
        user: UserSnapshot,
        assumed: UserSnapshot,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("not logged in")]
    NotAuthenticated,
    #[error("already acting as another user; release first")]
    AlreadyAssuming,
    #[error("cannot assume your own account")]
    AssumeSelf,
    #[error("not acting as another user")]
    NotAssuming,
}

impl SessionPrincipal {
    /// Only called after credential verification succeeded.
    pub fn login(user: UserSnapshot) -> Self {
        SessionPrincipal::Authenticated { user }
    }

    pub fn assume(&self, target: UserSnapshot) -> Result<Self, TransitionError> {
        match self {
            SessionPrincipal::Anonymous => Err(TransitionError::NotAuthenticated),
            SessionPrincipal::Assumed { .. } => Err(TransitionError::AlreadyAssuming),
            SessionPrincipal::Authenticated { user } if user.id == target.id => {
                Err(TransitionError::AssumeSelf)
            }
            SessionPrincipal::Authenticated { user } => Ok(SessionPrincipal::Assumed {
                user: user.clone(),
                assumed: target,
            }),
        }
    }

    pub fn release(&self) -> Result<Self, TransitionError> {
        match self {
            SessionPrincipal::Anonymous => Err(TransitionError::NotAuthenticated),
            SessionPrincipal::Authenticated { .. } => Err(TransitionError::NotAssuming),
            SessionPrincipal::Assumed { user, .. } => Ok(SessionPrincipal::Authenticated {
                user: user.clone(),
            }),
        }
    }

    pub fn logout(&self) -> Self {
        SessionPrincipal::Anonymous
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, SessionPrincipal::Anonymous)
    }

    /// The user whose credentials were verified
    pub fn logged_in_user(&self) -> Option<&UserSnapshot> {
        match self {
            SessionPrincipal::Anonymous => None,
            SessionPrincipal::Authenticated { user } | SessionPrincipal::Assumed { user, .. } => {
                Some(user)
            }
        }
    }

    pub fn assumed_user(&self) -> Option<&UserSnapshot> {
        match self {
            SessionPrincipal::Assumed { assumed, .. } => Some(assumed),
            _ => None,
        }
    }

    /// Identity used for authorization: the assumed user if any, else the logged-in user
    pub fn effective_user(&self) -> Option<&UserSnapshot> {
        self.assumed_user().or_else(|| self.logged_in_user())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> UserSnapshot {
        UserSnapshot::new(UserId(1), "admin")
    }

    fn member() -> UserSnapshot {
        UserSnapshot::new(UserId(2), "member")
    }

    #[test]
    fn test_anonymous_by_default() {
        let principal = SessionPrincipal::default();
        assert!(!principal.is_authenticated());
        assert!(principal.effective_user().is_none());
        assert_eq!(principal.assume(member()), Err(TransitionError::NotAuthenticated));
        assert_eq!(principal.release(), Err(TransitionError::NotAuthenticated));
    }

    #[test]
    fn test_full_lifecycle() {
        let principal = SessionPrincipal::login(admin());
        assert!(principal.is_authenticated());
        assert_eq!(principal.effective_user(), Some(&admin()));

        let assumed = principal.assume(member()).unwrap();
        assert!(assumed.is_authenticated());
        assert_eq!(assumed.logged_in_user(), Some(&admin()));
        assert_eq!(assumed.effective_user(), Some(&member()));

        let released = assumed.release().unwrap();
        assert_eq!(released, principal);

        let out = released.logout();
        assert_eq!(out, SessionPrincipal::Anonymous);
    }

    #[test]
    fn test_nested_assume_rejected() {
        let assumed = SessionPrincipal::login(admin()).assume(member()).unwrap();
        let third = UserSnapshot::new(UserId(3), "third");
        assert_eq!(assumed.assume(third), Err(TransitionError::AlreadyAssuming));
    }

    #[test]
    fn test_assume_self_rejected() {
        let principal = SessionPrincipal::login(admin());
        assert_eq!(principal.assume(admin()), Err(TransitionError::AssumeSelf));
    }

    #[test]
    fn test_release_without_assume() {
        let principal = SessionPrincipal::login(admin());
        assert_eq!(principal.release(), Err(TransitionError::NotAssuming));
    }

    #[test]
    fn test_logout_from_assumed() {
        let assumed = SessionPrincipal::login(admin()).assume(member()).unwrap();
        assert_eq!(assumed.logout(), SessionPrincipal::Anonymous);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(SessionPrincipal::login(admin())).unwrap();
        assert_eq!(json["state"], "authenticated");
        assert_eq!(json["user"]["id"], 1);
    }
}
