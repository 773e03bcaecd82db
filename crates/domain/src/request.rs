use chrono::{DateTime, Utc};
use grantry_core::{AppError, AppResult, ObjectKey};
use serde::{Deserialize, Serialize};

use crate::condition::{ConditionStatus, ConditionType, Conditions};
use crate::permission::OwnerReference;

/// API group and version of every Grantry resource.
pub const GRANTRY_API_VERSION: &str = "grantry.dev/v1alpha1";

/// Server-assigned identity and bookkeeping for one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    /// Namespace and name.
    pub key: ObjectKey,
    /// Unique id for this incarnation of the object.
    pub uid: String,
    /// Optimistic-concurrency version marker.
    pub resource_version: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Closed set of request kinds, each with its own payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestKind {
    /// Interactive exec into one pod of the template's target workload.
    Exec {
        /// Specific pod the requester asked for.
        target_override: Option<String>,
    },
}

impl RequestKind {
    /// Returns the payload-free tag used for builder dispatch.
    #[must_use]
    pub fn tag(&self) -> RequestKindTag {
        match self {
            Self::Exec { .. } => RequestKindTag::Exec,
        }
    }
}

/// Payload-free request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequestKindTag {
    /// Exec access.
    Exec,
}

impl RequestKindTag {
    /// Returns the stable kind value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exec => "ExecAccessRequest",
        }
    }
}

/// Requester-owned desired state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequestSpec {
    /// Template name in the request namespace.
    pub template_name: String,
    /// Requested duration in Go syntax; absent means the template default.
    pub duration: Option<String>,
    /// Kind and kind payload.
    pub kind: RequestKind,
}

/// Outcome of assigning a target identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAssignment {
    /// The target was recorded.
    Assigned,
    /// A target was already recorded and was kept.
    AlreadyAssigned {
        /// The kept target.
        existing: String,
    },
}

/// Observed state written by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequestStatus {
    /// Condition set.
    pub conditions: Conditions,
    target: Option<String>,
    /// Instructions for using the grant.
    pub access_message: Option<String>,
}

impl AccessRequestStatus {
    /// Rebuilds a status read from storage.
    #[must_use]
    pub fn from_parts(
        conditions: Conditions,
        target: Option<String>,
        access_message: Option<String>,
    ) -> Self {
        Self {
            conditions,
            target: target.filter(|value| !value.is_empty()),
            access_message,
        }
    }

    /// Returns the assigned target identity.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Records the target identity once; later calls keep the first value.
    pub fn assign_target(&mut self, target: impl Into<String>) -> TargetAssignment {
        match &self.target {
            Some(existing) => TargetAssignment::AlreadyAssigned {
                existing: existing.clone(),
            },
            None => {
                self.target = Some(target.into());
                TargetAssignment::Assigned
            }
        }
    }
}

/// Phase derived from the condition set. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPhase {
    /// Nothing evaluated yet.
    Pending,
    /// Durations or template reference are invalid.
    InvalidInput,
    /// The grant window elapsed; deletion is pending or done.
    Expired,
    /// Resources created, readiness not yet evaluated.
    Provisioning,
    /// Resource provisioning failed.
    ProvisioningFailed,
    /// Resources created but target not usable.
    NotReady,
    /// Access is usable.
    Ready,
}

impl AccessPhase {
    /// Derives the phase from conditions.
    #[must_use]
    pub fn from_conditions(conditions: &Conditions) -> Self {
        if conditions.is_false(ConditionType::AccessStillValid) {
            return Self::Expired;
        }
        if conditions.is_false(ConditionType::DurationsValid) {
            return Self::InvalidInput;
        }

        match (
            conditions.status_of(ConditionType::ResourcesCreated),
            conditions.status_of(ConditionType::ResourcesReady),
        ) {
            (ConditionStatus::False, _) => Self::ProvisioningFailed,
            (ConditionStatus::True, ConditionStatus::True) => Self::Ready,
            (ConditionStatus::True, ConditionStatus::False) => Self::NotReady,
            (ConditionStatus::True, ConditionStatus::Unknown) => Self::Provisioning,
            (ConditionStatus::Unknown, _) => Self::Pending,
        }
    }

    /// Returns the stable display value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InvalidInput => "InvalidInput",
            Self::Expired => "Expired",
            Self::Provisioning => "Provisioning",
            Self::ProvisioningFailed => "ProvisioningFailed",
            Self::NotReady => "NotReady",
            Self::Ready => "Ready",
        }
    }
}

/// A requester's ask for temporary access under a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Stored identity.
    pub meta: ResourceMeta,
    /// Desired state.
    pub spec: AccessRequestSpec,
    /// Observed state.
    pub status: AccessRequestStatus,
}

impl AccessRequest {
    /// Returns the request address.
    #[must_use]
    pub fn key(&self) -> &ObjectKey {
        &self.meta.key
    }

    /// Returns the kind tag used for builder dispatch.
    #[must_use]
    pub fn kind_tag(&self) -> RequestKindTag {
        self.spec.kind.tag()
    }

    /// Name shared by the role and binding generated for this request.
    #[must_use]
    pub fn access_object_name(&self) -> String {
        format!("{}-access", self.meta.key.name())
    }

    /// Returns the derived phase.
    #[must_use]
    pub fn phase(&self) -> AccessPhase {
        AccessPhase::from_conditions(&self.status.conditions)
    }

    /// Returns true once the grant is usable.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase() == AccessPhase::Ready
    }

    /// Owner reference placed on objects generated for this request.
    #[must_use]
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: GRANTRY_API_VERSION.to_owned(),
            kind: self.kind_tag().as_str().to_owned(),
            name: self.meta.key.name().to_owned(),
            uid: self.meta.uid.clone(),
        }
    }
}

/// Input for creating a request with a server-generated name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccessRequest {
    /// Target namespace.
    pub namespace: String,
    /// Name prefix; the server appends a random suffix.
    pub generate_name: String,
    /// Desired state.
    pub spec: AccessRequestSpec,
}

impl NewAccessRequest {
    /// Builds an exec request named `<prefix>-<random>`.
    pub fn exec(
        namespace: impl Into<String>,
        prefix: &str,
        template_name: impl Into<String>,
        target_override: Option<String>,
        duration: Option<String>,
    ) -> AppResult<Self> {
        validate_name_prefix(prefix)?;

        Ok(Self {
            namespace: namespace.into(),
            generate_name: format!("{prefix}-"),
            spec: AccessRequestSpec {
                template_name: template_name.into(),
                duration: duration.filter(|value| !value.trim().is_empty()),
                kind: RequestKind::Exec {
                    target_override: target_override.filter(|value| !value.trim().is_empty()),
                },
            },
        })
    }
}

/// Checks that a request name prefix starts with `[a-z][a-z0-9-][a-z0-9]+`.
///
/// Only the leading characters are constrained; the API server validates
/// the full generated name.
pub fn validate_name_prefix(prefix: &str) -> AppResult<()> {
    let bytes = prefix.as_bytes();
    let lower_alnum = |byte: &u8| byte.is_ascii_lowercase() || byte.is_ascii_digit();

    let valid = bytes.len() >= 3
        && bytes[0].is_ascii_lowercase()
        && (lower_alnum(&bytes[1]) || bytes[1] == b'-')
        && lower_alnum(&bytes[2]);

    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "request name prefix '{prefix}' must start with a lowercase letter followed by at least two lowercase alphanumerics (hyphen allowed second)"
        )))
    }
}
