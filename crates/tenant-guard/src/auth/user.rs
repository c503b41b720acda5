//! Authenticated identity

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};

use crate::constants::{GUEST_EMAIL, GUEST_NAME};

/// A group identifier a user is a member of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceAccess(String);

impl ResourceAccess {
    pub fn new(group: impl Into<String>) -> Self {
        Self(group.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceAccess {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceAccess {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The identity a request was authenticated as.
///
/// Users are built once per successful authentication and never mutated;
/// share them behind an [`Arc`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub name: String,
    pub groups: Vec<ResourceAccess>,
    pub tenant: String,
    pub project: String,
    pub issuer: String,
    pub subject: String,
}

static GUEST: LazyLock<Arc<User>> = LazyLock::new(|| {
    Arc::new(User {
        email: GUEST_EMAIL.to_string(),
        name: GUEST_NAME.to_string(),
        ..User::default()
    })
});

impl User {
    /// The anonymous identity returned when no authenticator applies.
    pub fn guest() -> Arc<Self> {
        Arc::clone(&GUEST)
    }

    pub fn is_guest(&self) -> bool {
        *self == **GUEST
    }

    /// True if the user is a member of at least one of `groups`.
    pub fn has_group<'a, I>(&self, groups: I) -> bool
    where
        I: IntoIterator<Item = &'a ResourceAccess>,
    {
        let own: HashSet<&ResourceAccess> = self.groups.iter().collect();
        groups.into_iter().any(|g| own.contains(g))
    }
}
