//! Warden Auth - the I/O-free core of authentication and authorization
//!
//! - [`hasher`]: the iterated salted credential digest
//! - [`permissions`]: the closed permission catalog and its implication closure
//! - [`principal`]: the session principal state machine
//! - [`secrets`]: random identifiers for tokens, sessions, salts and reset codes

pub mod hasher;
pub mod permissions;
pub mod principal;
pub mod secrets;

pub use hasher::{hash_pass, hash_password, verify_password};
pub use permissions::{ImplicationEngine, Permission, PermissionSet, UnknownPermission};
pub use principal::{SessionPrincipal, TransitionError, UserSnapshot};
