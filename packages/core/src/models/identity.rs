use serde::{Deserialize, Serialize};
use std::fmt;

/// Default identity allowed to act on every tenant.
pub const ADMIN_IDENTITY: &str = "admin";

/// Authenticated caller of a service operation
///
/// Authentication happens upstream; the core only compares identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    identity: String,
}

impl Caller {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// True when the caller may act on `tenant`'s namespace.
    pub fn may_access(&self, tenant: &str, admin_identity: &str) -> bool {
        self.identity == tenant || self.identity == admin_identity
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity)
    }
}
