//! Custom resource definitions and conversions between Kubernetes objects
//! and domain types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use grantry_core::{AppError, AppResult, ObjectKey};
use grantry_domain::{
    AccessConfig, AccessRequest, AccessRequestSpec, AccessRequestStatus, AccessRole,
    AccessRoleBinding, AccessTemplate, BindingSubject, Condition, ConditionStatus, ConditionType,
    Conditions, OwnerReference, PolicyRule, RequestKind, ResourceMeta, SubjectKind, TargetRef,
    TargetStatus,
};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::rbac::v1::{
    PolicyRule as KubePolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference as KubeOwner};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Requester-owned exec access request.
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "grantry.dev",
    version = "v1alpha1",
    kind = "ExecAccessRequest",
    namespaced,
    status = "AccessRequestStatusFields",
    shortname = "execreq",
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".status.podName"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ExecAccessRequestSpec {
    /// Template name in the request namespace.
    pub template_name: String,
    /// Specific pod to exec into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_pod: Option<String>,
    /// Requested duration in Go syntax.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

/// Stored request status.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequestStatusFields {
    /// Conditions in stable type order.
    #[serde(default)]
    pub conditions: Vec<StatusCondition>,
    /// Assigned target pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
    /// Instructions for using the grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_message: Option<String>,
    /// Phase derived from conditions, for display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

/// Wire form of one condition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusCondition {
    /// Condition type.
    #[serde(rename = "type")]
    pub condition_type: String,
    /// `True`, `False` or `Unknown`.
    pub status: String,
    /// Machine-readable reason.
    #[serde(default)]
    pub reason: String,
    /// Human readable detail.
    #[serde(default)]
    pub message: String,
    /// RFC 3339 timestamp of the last status or reason change.
    pub last_transition_time: String,
}

/// Administrator-owned exec access template.
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "grantry.dev",
    version = "v1alpha1",
    kind = "ExecAccessTemplate",
    namespaced,
    shortname = "exectpl"
)]
#[serde(rename_all = "camelCase")]
pub struct ExecAccessTemplateSpec {
    /// Grant bounds and subjects.
    pub access_config: AccessConfigSpec,
    /// Workload whose pods may be granted.
    pub target_ref: TargetRefSpec,
}

/// Wire form of [`AccessConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfigSpec {
    /// Groups bound to the generated role.
    pub allowed_groups: Vec<String>,
    /// Duration applied when the request sets none.
    pub default_duration: String,
    /// Upper bound for requested durations.
    pub max_duration: String,
    /// Access command pattern.
    #[serde(default)]
    pub access_command: String,
}

/// Wire form of [`TargetRef`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetRefSpec {
    /// Controller API version.
    pub api_version: String,
    /// Controller kind.
    pub kind: String,
    /// Controller name.
    pub name: String,
}

pub(crate) fn object_key(meta: &ObjectMeta, kind: &str) -> AppResult<ObjectKey> {
    let namespace = meta
        .namespace
        .clone()
        .ok_or_else(|| AppError::Internal(format!("{kind} without namespace")))?;
    let name = meta
        .name
        .clone()
        .ok_or_else(|| AppError::Internal(format!("{kind} without name")))?;

    Ok(ObjectKey::new(namespace, name))
}

fn conditions_from_wire(key: &ObjectKey, wire: &[StatusCondition]) -> Conditions {
    let parsed: Vec<Condition> = wire
        .iter()
        .filter_map(|condition| {
            let parsed = condition
                .condition_type
                .parse::<ConditionType>()
                .and_then(|condition_type| {
                    let status = condition.status.parse::<ConditionStatus>()?;
                    let last_transition_time =
                        DateTime::parse_from_rfc3339(&condition.last_transition_time)
                            .map(|value| value.with_timezone(&Utc))
                            .map_err(|error| AppError::Validation(error.to_string()))?;
                    Ok(Condition {
                        condition_type,
                        status,
                        reason: condition.reason.clone(),
                        message: condition.message.clone(),
                        last_transition_time,
                    })
                });

            match parsed {
                Ok(condition) => Some(condition),
                Err(error) => {
                    debug!(request = %key, error = %error, "skipping unreadable condition");
                    None
                }
            }
        })
        .collect();

    Conditions::from(parsed)
}

impl ExecAccessRequest {
    /// Converts the stored object into the domain request.
    pub fn to_domain(&self) -> AppResult<AccessRequest> {
        let key = object_key(&self.metadata, "ExecAccessRequest")?;
        let created_at = self
            .metadata
            .creation_timestamp
            .as_ref()
            .map(|timestamp| timestamp.0)
            .ok_or_else(|| {
                AppError::Internal(format!("ExecAccessRequest {key} without creationTimestamp"))
            })?;
        let status = self.status.clone().unwrap_or_default();
        let conditions = conditions_from_wire(&key, &status.conditions);

        Ok(AccessRequest {
            meta: ResourceMeta {
                uid: self.uid().unwrap_or_default(),
                resource_version: self.resource_version().unwrap_or_default(),
                created_at,
                key,
            },
            spec: AccessRequestSpec {
                template_name: self.spec.template_name.clone(),
                duration: self.spec.duration.clone(),
                kind: RequestKind::Exec {
                    target_override: self
                        .spec
                        .target_pod
                        .clone()
                        .filter(|value| !value.is_empty()),
                },
            },
            status: AccessRequestStatus::from_parts(
                conditions,
                status.pod_name,
                status.access_message,
            ),
        })
    }

    /// Builds a new object with a server-generated name.
    #[must_use]
    pub fn for_creation(namespace: &str, generate_name: &str, spec: &AccessRequestSpec) -> Self {
        let RequestKind::Exec { target_override } = &spec.kind;
        let mut request = Self::new(
            "",
            ExecAccessRequestSpec {
                template_name: spec.template_name.clone(),
                target_pod: target_override.clone(),
                duration: spec.duration.clone(),
            },
        );
        request.metadata.name = None;
        request.metadata.generate_name = Some(generate_name.to_owned());
        request.metadata.namespace = Some(namespace.to_owned());
        request
    }
}

impl From<&AccessRequest> for AccessRequestStatusFields {
    fn from(request: &AccessRequest) -> Self {
        Self {
            conditions: request
                .status
                .conditions
                .iter()
                .map(|condition| StatusCondition {
                    condition_type: condition.condition_type.as_str().to_owned(),
                    status: condition.status.as_str().to_owned(),
                    reason: condition.reason.clone(),
                    message: condition.message.clone(),
                    last_transition_time: condition.last_transition_time.to_rfc3339(),
                })
                .collect(),
            pod_name: request.status.target().map(str::to_owned),
            access_message: request.status.access_message.clone(),
            phase: Some(request.phase().as_str().to_owned()),
        }
    }
}

impl ExecAccessTemplate {
    /// Converts the stored object into the domain template.
    pub fn to_domain(&self) -> AppResult<AccessTemplate> {
        let key = object_key(&self.metadata, "ExecAccessTemplate")?;
        let access_config = &self.spec.access_config;
        let target_ref = &self.spec.target_ref;

        AccessTemplate::new(
            key,
            AccessConfig {
                allowed_groups: access_config.allowed_groups.clone(),
                default_duration: access_config.default_duration.clone(),
                max_duration: access_config.max_duration.clone(),
                access_command: access_config.access_command.clone(),
            },
            TargetRef {
                api_version: target_ref.api_version.clone(),
                kind: target_ref.kind.parse()?,
                name: target_ref.name.clone(),
            },
        )
    }
}

fn owned_meta(key: &ObjectKey, owner: &OwnerReference) -> ObjectMeta {
    ObjectMeta {
        name: Some(key.name().to_owned()),
        namespace: Some(key.namespace().to_owned()),
        owner_references: Some(vec![KubeOwner {
            api_version: owner.api_version.clone(),
            kind: owner.kind.clone(),
            name: owner.name.clone(),
            uid: owner.uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]),
        ..ObjectMeta::default()
    }
}

fn owner_from_meta(meta: &ObjectMeta) -> OwnerReference {
    meta.owner_references
        .as_ref()
        .and_then(|owners| owners.iter().find(|owner| owner.controller == Some(true)))
        .map(|owner| OwnerReference {
            api_version: owner.api_version.clone(),
            kind: owner.kind.clone(),
            name: owner.name.clone(),
            uid: owner.uid.clone(),
        })
        .unwrap_or_else(|| OwnerReference {
            api_version: String::new(),
            kind: String::new(),
            name: String::new(),
            uid: String::new(),
        })
}

/// Builds the Kubernetes role for a domain role.
#[must_use]
pub fn role_to_kube(role: &AccessRole) -> Role {
    Role {
        metadata: owned_meta(&role.key, &role.owner),
        rules: Some(
            role.rules
                .iter()
                .map(|rule| KubePolicyRule {
                    api_groups: Some(rule.api_groups.clone()),
                    resources: Some(rule.resources.clone()),
                    resource_names: Some(rule.resource_names.clone()),
                    verbs: rule.verbs.clone(),
                    non_resource_urls: None,
                })
                .collect(),
        ),
    }
}

/// Reads a stored role back into the domain shape.
pub fn role_from_kube(role: &Role) -> AppResult<AccessRole> {
    Ok(AccessRole {
        key: object_key(&role.metadata, "Role")?,
        rules: role
            .rules
            .iter()
            .flatten()
            .map(|rule| PolicyRule {
                api_groups: rule.api_groups.clone().unwrap_or_default(),
                resources: rule.resources.clone().unwrap_or_default(),
                resource_names: rule.resource_names.clone().unwrap_or_default(),
                verbs: rule.verbs.clone(),
            })
            .collect(),
        owner: owner_from_meta(&role.metadata),
    })
}

/// Builds the Kubernetes binding for a domain binding.
#[must_use]
pub fn role_binding_to_kube(binding: &AccessRoleBinding) -> RoleBinding {
    RoleBinding {
        metadata: owned_meta(&binding.key, &binding.owner),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_owned(),
            kind: "Role".to_owned(),
            name: binding.role_name.clone(),
        },
        subjects: Some(
            binding
                .subjects
                .iter()
                .map(|subject| Subject {
                    api_group: Some(RBAC_API_GROUP.to_owned()),
                    kind: subject.kind.as_str().to_owned(),
                    name: subject.name.clone(),
                    namespace: None,
                })
                .collect(),
        ),
    }
}

/// Reads a stored binding back into the domain shape.
pub fn role_binding_from_kube(binding: &RoleBinding) -> AppResult<AccessRoleBinding> {
    Ok(AccessRoleBinding {
        key: object_key(&binding.metadata, "RoleBinding")?,
        role_name: binding.role_ref.name.clone(),
        subjects: binding
            .subjects
            .iter()
            .flatten()
            .filter_map(|subject| {
                let kind = match subject.kind.as_str() {
                    "Group" => SubjectKind::Group,
                    "User" => SubjectKind::User,
                    _ => return None,
                };
                Some(BindingSubject {
                    kind,
                    name: subject.name.clone(),
                })
            })
            .collect(),
        owner: owner_from_meta(&binding.metadata),
    })
}

/// Reads the phase and `Ready` condition of a pod.
#[must_use]
pub fn pod_target_status(pod: &Pod) -> TargetStatus {
    let status = pod.status.as_ref();
    let ready = status
        .and_then(|status| status.conditions.as_ref())
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|condition| condition.type_ == "Ready")
        })
        .is_some_and(|condition| condition.status == "True");

    TargetStatus {
        phase: status
            .and_then(|status| status.phase.clone())
            .unwrap_or_else(|| "Unknown".to_owned()),
        ready,
    }
}

/// Converts listed requests, skipping objects that cannot be read.
pub(crate) fn readable_requests(items: &[ExecAccessRequest]) -> Vec<AccessRequest> {
    items
        .iter()
        .filter_map(|item| match item.to_domain() {
            Ok(request) => Some(request),
            Err(error) => {
                debug!(
                    name = %item.name_any(),
                    namespace = ?item.namespace(),
                    error = %error,
                    "skipping unreadable access request"
                );
                None
            }
        })
        .collect()
}

/// Renders a label selector map as a list-query selector string.
#[must_use]
pub fn selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, TimeZone, Utc};
    use grantry_core::ObjectKey;
    use grantry_domain::{
        AccessPhase, AccessRequest, AccessRequestSpec, AccessRequestStatus, AccessRole,
        AccessRoleBinding, BindingSubject, ConditionReason, ConditionStatus, ConditionType,
        OwnerReference, PolicyRule, RequestKind, ResourceMeta, SubjectKind,
    };
    use grantry_core::AppError;
    use k8s_openapi::api::core::v1::{Pod, PodCondition, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::CustomResourceExt;

    use super::{
        AccessRequestStatusFields, ExecAccessRequest, ExecAccessRequestSpec, ExecAccessTemplate,
        StatusCondition, pod_target_status, readable_requests, role_binding_from_kube,
        role_binding_to_kube, role_from_kube, role_to_kube, selector_string,
    };

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap_or_default()
    }

    fn stored_request(target_pod: Option<&str>) -> ExecAccessRequest {
        let mut stored = ExecAccessRequest::new(
            "alice-x7k2p",
            ExecAccessRequestSpec {
                template_name: "shell".to_owned(),
                target_pod: target_pod.map(str::to_owned),
                duration: None,
            },
        );
        stored.metadata.namespace = Some("web".to_owned());
        stored.metadata.creation_timestamp = Some(Time(created_at()));
        stored
    }

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "grantry.dev/v1alpha1".to_owned(),
            kind: "ExecAccessRequest".to_owned(),
            name: "alice-x7k2p".to_owned(),
            uid: "uid-1".to_owned(),
        }
    }

    #[test]
    fn crds_are_namespaced_under_grantry_group() {
        let request_crd = ExecAccessRequest::crd();
        let template_crd = ExecAccessTemplate::crd();

        assert_eq!(request_crd.spec.group, "grantry.dev");
        assert_eq!(request_crd.spec.scope, "Namespaced");
        assert_eq!(template_crd.spec.names.kind, "ExecAccessTemplate");
    }

    #[test]
    fn request_status_round_trips_through_wire_form() {
        let now = created_at();
        let mut status = AccessRequestStatus::default();
        status.conditions.set(
            ConditionType::ResourcesReady,
            ConditionStatus::True,
            ConditionReason::ResourcesReady,
            "ready",
            now,
        );
        status.conditions.set(
            ConditionType::DurationsValid,
            ConditionStatus::True,
            ConditionReason::Defaulted,
            "defaulted",
            now,
        );
        status.assign_target("api-a");
        let request = AccessRequest {
            meta: ResourceMeta {
                key: ObjectKey::new("web", "alice-x7k2p"),
                uid: "uid-1".to_owned(),
                resource_version: "7".to_owned(),
                created_at: now,
            },
            spec: AccessRequestSpec {
                template_name: "shell".to_owned(),
                duration: None,
                kind: RequestKind::Exec {
                    target_override: None,
                },
            },
            status,
        };

        let wire = AccessRequestStatusFields::from(&request);
        let types: Vec<&str> = wire
            .conditions
            .iter()
            .map(|condition| condition.condition_type.as_str())
            .collect();
        assert_eq!(types, vec!["DurationsValid", "ResourcesReady"]);
        assert_eq!(wire.pod_name.as_deref(), Some("api-a"));
        assert_eq!(wire.phase.as_deref(), Some(AccessPhase::Pending.as_str()));

        let mut stored = stored_request(Some(""));
        stored.status = Some(wire);

        let domain = stored.to_domain();
        assert!(domain.is_ok());
        let domain = domain.unwrap_or_else(|_| unreachable!());
        assert_eq!(domain.status.conditions, request.status.conditions);
        assert_eq!(domain.status.target(), Some("api-a"));
        assert_eq!(domain.meta.created_at, now);
        assert_eq!(
            domain.spec.kind,
            RequestKind::Exec {
                target_override: None
            }
        );
    }

    #[test]
    fn unreadable_conditions_are_skipped() {
        let mut stored = stored_request(None);
        stored.status = Some(AccessRequestStatusFields {
            conditions: vec![StatusCondition {
                condition_type: "SomethingElse".to_owned(),
                status: "True".to_owned(),
                reason: String::new(),
                message: String::new(),
                last_transition_time: "2026-03-01T12:00:00Z".to_owned(),
            }],
            ..AccessRequestStatusFields::default()
        });

        let domain = stored.to_domain();
        assert!(domain.is_ok_and(|request| request.status.conditions.is_empty()));
    }

    #[test]
    fn request_without_creation_timestamp_is_rejected() {
        let mut stored = stored_request(None);
        stored.metadata.creation_timestamp = None;

        assert!(matches!(stored.to_domain(), Err(AppError::Internal(_))));
    }

    #[test]
    fn unreadable_listed_requests_are_skipped() {
        let mut broken = stored_request(None);
        broken.metadata.name = Some("bob-q9z4d".to_owned());
        broken.metadata.creation_timestamp = None;

        let listed = readable_requests(&[broken, stored_request(None)]);

        let names: Vec<&str> = listed.iter().map(|request| request.key().name()).collect();
        assert_eq!(names, vec!["alice-x7k2p"]);
    }

    #[test]
    fn generated_creation_object_has_no_name() {
        let spec = AccessRequestSpec {
            template_name: "shell".to_owned(),
            duration: Some("1h".to_owned()),
            kind: RequestKind::Exec {
                target_override: Some("api-b".to_owned()),
            },
        };

        let request = ExecAccessRequest::for_creation("web", "alice-", &spec);

        assert_eq!(request.metadata.name, None);
        assert_eq!(request.metadata.generate_name.as_deref(), Some("alice-"));
        assert_eq!(request.spec.target_pod.as_deref(), Some("api-b"));
    }

    #[test]
    fn role_and_binding_carry_controller_owner() {
        let role = AccessRole {
            key: ObjectKey::new("web", "alice-x7k2p-access"),
            rules: vec![PolicyRule {
                api_groups: vec![String::new()],
                resources: vec!["pods/exec".to_owned()],
                resource_names: vec!["api-a".to_owned()],
                verbs: vec!["create".to_owned()],
            }],
            owner: owner(),
        };
        let kube_role = role_to_kube(&role);
        let owners = kube_role.metadata.owner_references.clone().unwrap_or_default();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].controller, Some(true));
        assert_eq!(role_from_kube(&kube_role).ok(), Some(role));

        let binding = AccessRoleBinding {
            key: ObjectKey::new("web", "alice-x7k2p-access"),
            role_name: "alice-x7k2p-access".to_owned(),
            subjects: vec![BindingSubject {
                kind: SubjectKind::Group,
                name: "sre".to_owned(),
            }],
            owner: owner(),
        };
        let kube_binding = role_binding_to_kube(&binding);
        assert_eq!(kube_binding.role_ref.kind, "Role");
        assert_eq!(role_binding_from_kube(&kube_binding).ok(), Some(binding));
    }

    #[test]
    fn pod_status_requires_ready_condition() {
        let pod = |phase: &str, ready: &str| Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_owned()),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_owned(),
                    status: ready.to_owned(),
                    ..PodCondition::default()
                }]),
                ..PodStatus::default()
            }),
            ..Pod::default()
        };

        assert!(pod_target_status(&pod("Running", "True")).is_usable());
        assert!(!pod_target_status(&pod("Running", "False")).is_usable());
        assert!(!pod_target_status(&pod("Pending", "True")).is_usable());
        assert_eq!(pod_target_status(&Pod::default()).phase, "Unknown");
    }

    #[test]
    fn selector_joins_labels_in_key_order() {
        let labels = BTreeMap::from([
            ("tier".to_owned(), "web".to_owned()),
            ("app".to_owned(), "api".to_owned()),
        ]);
        assert_eq!(selector_string(&labels), "app=api,tier=web");
    }
}
