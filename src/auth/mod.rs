pub mod permission;
pub mod permissions_service;
pub mod service;
#[cfg(test)]
pub(crate) mod testing;

pub use permission::{strongest, weakest, ClusterPermissions, Permission};
pub use permissions_service::PermissionsService;
pub use service::{AuthService, Dashboard};
