use std::str::FromStr;

use grantry_core::{AppError, AppResult, ObjectKey};
use serde::{Deserialize, Serialize};

/// Access command used when a template leaves the pattern blank.
pub const DEFAULT_ACCESS_COMMAND: &str =
    "kubectl exec -ti -n {{ .Metadata.Namespace }} {{ .Metadata.Name }} -- /bin/sh";

/// Workload controller kinds a template may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadKind {
    /// `apps/v1` Deployment.
    Deployment,
    /// `apps/v1` StatefulSet.
    StatefulSet,
    /// `apps/v1` DaemonSet.
    DaemonSet,
}

impl WorkloadKind {
    /// Returns the stable Kubernetes kind value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
        }
    }
}

impl FromStr for WorkloadKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Deployment" => Ok(Self::Deployment),
            "StatefulSet" => Ok(Self::StatefulSet),
            "DaemonSet" => Ok(Self::DaemonSet),
            _ => Err(AppError::Validation(format!(
                "unsupported target workload kind '{value}'"
            ))),
        }
    }
}

/// Target-selection rule: the workload controller whose pods may be granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    /// API version of the controller, e.g. `apps/v1`.
    pub api_version: String,
    /// Controller kind.
    pub kind: WorkloadKind,
    /// Controller name in the template namespace.
    pub name: String,
}

/// Grant bounds and permission shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Groups bound to the generated role.
    pub allowed_groups: Vec<String>,
    /// Duration used when a request does not ask for one.
    pub default_duration: String,
    /// Longest duration a request may receive.
    pub max_duration: String,
    /// Pattern rendered into the request's access message.
    pub access_command: String,
}

/// Administrator-owned exec access policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTemplate {
    key: ObjectKey,
    access_config: AccessConfig,
    target_ref: TargetRef,
}

impl AccessTemplate {
    /// Creates a template after basic shape validation.
    pub fn new(key: ObjectKey, access_config: AccessConfig, target_ref: TargetRef) -> AppResult<Self> {
        if target_ref.name.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "template '{key}' must name a target workload"
            )));
        }

        Ok(Self {
            key,
            access_config,
            target_ref,
        })
    }

    /// Returns the template address.
    #[must_use]
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// Returns the grant bounds and permission shape.
    #[must_use]
    pub fn access_config(&self) -> &AccessConfig {
        &self.access_config
    }

    /// Returns the target-selection rule.
    #[must_use]
    pub fn target_ref(&self) -> &TargetRef {
        &self.target_ref
    }

    /// Returns the command pattern, falling back to the default.
    #[must_use]
    pub fn access_command_pattern(&self) -> &str {
        let pattern = self.access_config.access_command.trim();
        if pattern.is_empty() {
            DEFAULT_ACCESS_COMMAND
        } else {
            pattern
        }
    }
}
