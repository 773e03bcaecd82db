use async_trait::async_trait;
use grantry_core::AppResult;
use grantry_domain::{TargetRef, TargetStatus};

/// Target-selection collaborator.
#[async_trait]
pub trait TargetResolver: Send + Sync {
    /// Picks one pod of the referenced workload.
    ///
    /// With an override, returns that pod only when it belongs to the
    /// workload. Returns `None` when nothing matches.
    async fn resolve_target(
        &self,
        namespace: &str,
        target_ref: &TargetRef,
        target_override: Option<&str>,
    ) -> AppResult<Option<String>>;

    /// Returns the observed state of one pod.
    async fn target_status(&self, namespace: &str, name: &str)
    -> AppResult<Option<TargetStatus>>;
}
