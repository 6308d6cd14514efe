//! `jobportal-auth`: access-control boundary for privileged ledger calls.
//!
//! Decoupled from storage and from the ledger itself: the ledger only ever
//! sees a resolved [`Principal`], and which identities get which permissions
//! is decided by a swappable [`AccessPolicy`].

pub mod authorize;
pub mod permissions;
pub mod policy;

pub use authorize::{AuthzError, CommandAuthorization, Principal, authorize};
pub use permissions::Permission;
pub use policy::{AccessPolicy, AdministratorSet, SingleAdministrator};
