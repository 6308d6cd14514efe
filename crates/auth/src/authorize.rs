use serde::{Deserialize, Serialize};
use thiserror::Error;

use jobportal_core::PrincipalId;

use crate::Permission;

/// A caller with its permissions already resolved by an [`crate::AccessPolicy`].
///
/// Commands carry this instead of a bare identity, so the ledger can check
/// capabilities without knowing how they were granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub permissions: Vec<Permission>,
}

impl Principal {
    /// A principal with no privileges (a regular poster).
    pub fn participant(id: PrincipalId) -> Self {
        Self {
            id,
            permissions: Vec::new(),
        }
    }

    pub fn with_permissions(id: PrincipalId, permissions: Vec<Permission>) -> Self {
        Self { id, permissions }
    }

    pub fn has(&self, required: &Permission) -> bool {
        self.permissions
            .iter()
            .any(|p| p.is_wildcard() || p == required)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: {principal} lacks permission '{permission}'")]
    Forbidden {
        principal: PrincipalId,
        permission: String,
    },
}

/// Command-side authorization contract, checked before dispatch.
///
/// `None` means the command is open to every principal; per-record rules
/// (e.g. "only the poster") are then left to the aggregate.
pub trait CommandAuthorization {
    fn required_permission(&self) -> Option<Permission>;
}

/// Authorize a resolved principal.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.has(required) {
        Ok(())
    } else {
        tracing::warn!(
            principal = %principal.id,
            permission = %required,
            "authorization denied"
        );
        Err(AuthzError::Forbidden {
            principal: principal.id,
            permission: required.as_str().to_string(),
        })
    }
}
