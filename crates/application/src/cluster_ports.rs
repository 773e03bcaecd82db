use std::sync::Arc;

mod clock;
mod permissions;
mod requests;
mod targets;
mod templates;

pub use clock::{Clock, SystemClock};
pub use permissions::{PermissionRepository, ProvisionedObject};
pub use requests::AccessRequestRepository;
pub use targets::TargetResolver;
pub use templates::AccessTemplateRepository;

/// Cluster-facing ports a reconciliation pass and its builder are bound to.
#[derive(Clone)]
pub struct ClusterPorts {
    /// Request reads, status writes and deletion.
    pub requests: Arc<dyn AccessRequestRepository>,
    /// Template reads.
    pub templates: Arc<dyn AccessTemplateRepository>,
    /// Role and binding provisioning.
    pub permissions: Arc<dyn PermissionRepository>,
    /// Target selection and inspection.
    pub targets: Arc<dyn TargetResolver>,
}

impl ClusterPorts {
    /// Builds the port set from one adapter implementing every port.
    #[must_use]
    pub fn from_adapter<A>(adapter: Arc<A>) -> Self
    where
        A: AccessRequestRepository
            + AccessTemplateRepository
            + PermissionRepository
            + TargetResolver
            + 'static,
    {
        Self {
            requests: adapter.clone(),
            templates: adapter.clone(),
            permissions: adapter.clone(),
            targets: adapter,
        }
    }
}
