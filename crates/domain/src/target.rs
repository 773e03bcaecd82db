use serde::{Deserialize, Serialize};

/// Pod phase reported for a usable target.
pub const RUNNING_PHASE: &str = "Running";

/// Observed state of one granted target pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStatus {
    /// Pod phase, e.g. `Pending` or `Running`.
    pub phase: String,
    /// Whether the pod reports the `Ready` condition.
    pub ready: bool,
}

impl TargetStatus {
    /// Returns true when the pod is running and ready.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.phase == RUNNING_PHASE && self.ready
    }
}
