//! Permission catalog and implication engine
//!
//! Permissions form a closed set. Narrow permissions are subsumed by broader
//! ones ("CMS.Page.Creator" is satisfied by holding "CMS.Page.Admin", which is
//! in turn satisfied by "CMS.Admin"). The transitive closure of that relation
//! is computed once in [`ImplicationEngine::new`] so that request-time checks
//! are plain set lookups.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// A set of held or sufficient permissions
pub type PermissionSet = HashSet<Permission>;

/// Every capability the identity provider knows about
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Permission {
    /// Satisfies every permission check
    SuperUser,

    AuthAdmin,
    AuthUserAdmin,
    AuthRoleAdmin,
    AuthTokenAdmin,

    CmsAdmin,
    CmsPageAdmin,
    CmsPageCreator,
    CmsPostAdmin,
    CmsPostCreator,
    CmsMediaUploader,

    OfficersAdmin,
    OfficersEditor,

    EventsAdmin,
    EventsCreator,
}

impl Permission {
    /// The full catalog, in display order
    pub const ALL: [Permission; 15] = [
        Permission::SuperUser,
        Permission::AuthAdmin,
        Permission::AuthUserAdmin,
        Permission::AuthRoleAdmin,
        Permission::AuthTokenAdmin,
        Permission::CmsAdmin,
        Permission::CmsPageAdmin,
        Permission::CmsPageCreator,
        Permission::CmsPostAdmin,
        Permission::CmsPostCreator,
        Permission::CmsMediaUploader,
        Permission::OfficersAdmin,
        Permission::OfficersEditor,
        Permission::EventsAdmin,
        Permission::EventsCreator,
    ];

    /// Canonical dotted name, as stored in the permissions table and in bearer claims
    pub const fn name(self) -> &'static str {
        match self {
            Permission::SuperUser => "SuperUser",
            Permission::AuthAdmin => "Auth.Admin",
            Permission::AuthUserAdmin => "Auth.User.Admin",
            Permission::AuthRoleAdmin => "Auth.Role.Admin",
            Permission::AuthTokenAdmin => "Auth.Token.Admin",
            Permission::CmsAdmin => "CMS.Admin",
            Permission::CmsPageAdmin => "CMS.Page.Admin",
            Permission::CmsPageCreator => "CMS.Page.Creator",
            Permission::CmsPostAdmin => "CMS.Post.Admin",
            Permission::CmsPostCreator => "CMS.Post.Creator",
            Permission::CmsMediaUploader => "CMS.Media.Uploader",
            Permission::OfficersAdmin => "Officers.Admin",
            Permission::OfficersEditor => "Officers.Editor",
            Permission::EventsAdmin => "Events.Admin",
            Permission::EventsCreator => "Events.Creator",
        }
    }

    /// Broader permissions that directly satisfy this one.
    ///
    /// `SuperUser` is not listed here; the engine adds it to every set.
    pub const fn implied_by(self) -> &'static [Permission] {
        match self {
            Permission::SuperUser => &[],

            Permission::AuthAdmin => &[],
            Permission::AuthUserAdmin => &[Permission::AuthAdmin],
            Permission::AuthRoleAdmin => &[Permission::AuthAdmin],
            Permission::AuthTokenAdmin => &[Permission::AuthAdmin],

            Permission::CmsAdmin => &[],
            Permission::CmsPageAdmin => &[Permission::CmsAdmin],
            Permission::CmsPageCreator => &[Permission::CmsPageAdmin],
            Permission::CmsPostAdmin => &[Permission::CmsAdmin],
            Permission::CmsPostCreator => &[Permission::CmsPostAdmin],
            Permission::CmsMediaUploader => {
                &[Permission::CmsPageCreator, Permission::CmsPostCreator]
            }

            Permission::OfficersAdmin => &[],
            Permission::OfficersEditor => &[Permission::OfficersAdmin],

            Permission::EventsAdmin => &[],
            Permission::EventsCreator => &[Permission::EventsAdmin],
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A permission name outside the catalog
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown permission: {0}")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    /// Names are matched exactly; the dotted names are case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.name() == s)
            .ok_or_else(|| UnknownPermission(s.to_string()))
    }
}

impl Serialize for Permission {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Precomputed "what satisfies what" lookup.
///
/// Built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct ImplicationEngine {
    sufficient: HashMap<Permission, PermissionSet>,
}

impl Default for ImplicationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ImplicationEngine {
    pub fn new() -> Self {
        let sufficient = Permission::ALL
            .iter()
            .map(|&p| (p, closure_of(p)))
            .collect::<HashMap<_, _>>();
        debug!(permissions = sufficient.len(), "Permission implication closure built");
        Self { sufficient }
    }

    /// Every permission that, if held, satisfies a requirement of `required`.
    ///
    /// Always contains `required` itself and `SuperUser`.
    pub fn sufficient_permissions_for(&self, required: Permission) -> &PermissionSet {
        // Every catalog entry is inserted in `new`.
        &self.sufficient[&required]
    }

    /// Whether any held permission satisfies `required`.
    pub fn is_satisfied_by(&self, required: Permission, held: &PermissionSet) -> bool {
        !self.sufficient_permissions_for(required).is_disjoint(held)
    }

    /// Permissions whose requirement `held` satisfies, for display.
    pub fn granted_by(&self, held: &PermissionSet) -> Vec<Permission> {
        Permission::ALL
            .iter()
            .copied()
            .filter(|&p| self.is_satisfied_by(p, held))
            .collect()
    }
}

fn closure_of(required: Permission) -> PermissionSet {
    let mut set = PermissionSet::new();
    let mut pending = vec![required];
    while let Some(next) = pending.pop() {
        if set.insert(next) {
            pending.extend_from_slice(next.implied_by());
        }
    }
    set.insert(Permission::SuperUser);
    set
}
