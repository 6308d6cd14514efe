//! Pluggable access-control policies.

use std::collections::BTreeSet;

use jobportal_core::PrincipalId;

use crate::{Permission, Principal};

/// Decides which permissions an identity holds.
///
/// The facade asks the policy on every call and hands the resolved
/// [`Principal`] to the ledger. Replacing the policy changes who may set the
/// fee or withdraw without touching ledger logic.
pub trait AccessPolicy: Send + Sync + core::fmt::Debug {
    fn permissions_of(&self, id: &PrincipalId) -> Vec<Permission>;

    fn resolve(&self, id: PrincipalId) -> Principal {
        Principal::with_permissions(id, self.permissions_of(&id))
    }
}

/// The single administrator fixed at deployment holds every privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleAdministrator {
    administrator: PrincipalId,
}

impl SingleAdministrator {
    pub fn new(administrator: PrincipalId) -> Self {
        Self { administrator }
    }

    pub fn administrator(&self) -> PrincipalId {
        self.administrator
    }
}

impl AccessPolicy for SingleAdministrator {
    fn permissions_of(&self, id: &PrincipalId) -> Vec<Permission> {
        if *id == self.administrator {
            Permission::administrator()
        } else {
            Vec::new()
        }
    }
}

/// Any member of a fixed set holds every privilege.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdministratorSet {
    members: BTreeSet<PrincipalId>,
}

impl AdministratorSet {
    pub fn new(members: impl IntoIterator<Item = PrincipalId>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }

    pub fn contains(&self, id: &PrincipalId) -> bool {
        self.members.contains(id)
    }
}

impl AccessPolicy for AdministratorSet {
    fn permissions_of(&self, id: &PrincipalId) -> Vec<Permission> {
        if self.contains(id) {
            Permission::administrator()
        } else {
            Vec::new()
        }
    }
}
