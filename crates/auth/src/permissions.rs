use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "ledger.fee.set"). The wildcard `"*"`
/// lets a policy grant everything without enumerating permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    /// Change the posting fee.
    pub const SET_FEE: Permission = Permission(Cow::Borrowed("ledger.fee.set"));
    /// Withdraw accumulated revenue.
    pub const WITHDRAW: Permission = Permission(Cow::Borrowed("ledger.funds.withdraw"));
    /// Change the status of any job, not just one's own.
    pub const MODERATE_JOBS: Permission = Permission(Cow::Borrowed("ledger.jobs.moderate"));
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Every permission an administrator holds.
    pub fn administrator() -> Vec<Permission> {
        vec![Self::SET_FEE, Self::WITHDRAW, Self::MODERATE_JOBS]
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
