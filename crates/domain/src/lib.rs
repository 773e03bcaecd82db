//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod access_command;
mod condition;
mod duration;
mod expiry;
mod permission;
mod request;
mod target;
mod template;

pub use access_command::render_access_command;
pub use condition::{Condition, ConditionReason, ConditionStatus, ConditionType, Conditions};
pub use duration::{
    DurationField, DurationResolution, DurationSource, GrantDuration, InvalidDuration,
    resolve_duration, resolve_parsed_duration,
};
pub use expiry::{ExpiryVerdict, evaluate_expiry};
pub use permission::{
    AccessRole, AccessRoleBinding, BindingSubject, OwnerReference, PolicyRule, SubjectKind,
};
pub use request::{
    AccessPhase, AccessRequest, AccessRequestSpec, AccessRequestStatus, GRANTRY_API_VERSION,
    NewAccessRequest, RequestKind, RequestKindTag, ResourceMeta, TargetAssignment,
    validate_name_prefix,
};
pub use target::{RUNNING_PHASE, TargetStatus};
pub use template::{AccessConfig, AccessTemplate, DEFAULT_ACCESS_COMMAND, TargetRef, WorkloadKind};
