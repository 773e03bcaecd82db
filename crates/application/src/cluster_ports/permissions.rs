use async_trait::async_trait;
use grantry_core::AppResult;
use grantry_domain::{AccessRole, AccessRoleBinding};

/// Object returned by a get-or-create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedObject<T> {
    /// The stored object.
    pub object: T,
    /// True when this call created it.
    pub created: bool,
}

/// Port for generated RBAC objects.
///
/// Both calls are idempotent: an existing object with the same address is
/// returned unchanged and "already exists" is never an error.
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    /// Returns the stored role, creating it when absent.
    async fn get_or_create_role(&self, role: AccessRole)
    -> AppResult<ProvisionedObject<AccessRole>>;

    /// Returns the stored binding, creating it when absent.
    async fn get_or_create_role_binding(
        &self,
        binding: AccessRoleBinding,
    ) -> AppResult<ProvisionedObject<AccessRoleBinding>>;
}
