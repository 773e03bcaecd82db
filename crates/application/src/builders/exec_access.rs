use async_trait::async_trait;
use tracing::info;

use grantry_core::{AppError, AppResult, ObjectKey};
use grantry_domain::{
    AccessRequest, AccessRole, AccessRoleBinding, AccessTemplate, BindingSubject,
    ConditionReason, PolicyRule, RequestKind, SubjectKind, render_access_command,
};

use super::{AccessBuilder, BuildContext, BuilderReport, ReadinessVerifier};

const POD_RESOURCE: &str = "pods";
const POD_EXEC_RESOURCE: &str = "pods/exec";
const POD_READ_VERBS: [&str; 3] = ["get", "list", "watch"];
const POD_EXEC_VERBS: [&str; 5] = ["create", "update", "delete", "get", "list"];

/// Grants `kubectl exec` into one pod of the template's workload.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecAccessBuilder;

#[async_trait]
impl AccessBuilder for ExecAccessBuilder {
    async fn create_access_resources(
        &self,
        context: &mut BuildContext<'_>,
    ) -> AppResult<BuilderReport> {
        if let Some(target) = context.request.status.target() {
            return Ok(BuilderReport::new(
                ConditionReason::AlreadyAssigned,
                format!("Target pod {target} already assigned"),
            ));
        }

        let RequestKind::Exec { target_override } = &context.request.spec.kind;
        let namespace = context.request.key().namespace().to_owned();
        let target_ref = context.template.target_ref();

        let resolved = context
            .ports
            .targets
            .resolve_target(&namespace, target_ref, target_override.as_deref())
            .await?
            .ok_or_else(|| {
                AppError::NotFound(match target_override {
                    Some(pod) => format!(
                        "pod '{pod}' is not part of {} '{}'",
                        target_ref.kind.as_str(),
                        target_ref.name
                    ),
                    None => format!(
                        "no pod found for {} '{}'",
                        target_ref.kind.as_str(),
                        target_ref.name
                    ),
                })
            })?;

        let role = context
            .ports
            .permissions
            .get_or_create_role(exec_role(context.request, &resolved))
            .await?;
        // A role left by an interrupted pass pins the pod it was created for.
        let target = granted_pod(&role.object).unwrap_or(resolved);

        let binding = context
            .ports
            .permissions
            .get_or_create_role_binding(exec_binding(context.request, context.template))
            .await?;

        let access_message = render_access_command(
            context.template.access_command_pattern(),
            &target,
            &namespace,
        )?;

        info!(
            namespace = %namespace,
            name = %context.request.key().name(),
            target = %target,
            role_created = role.created,
            binding_created = binding.created,
            "exec access resources in place"
        );

        // Unassigned on entry; a target stored meanwhile surfaces as Conflict.
        context.request.status.assign_target(target);
        context.request.status.access_message = Some(access_message);
        context.status.update_status(context.request).await?;

        Ok(BuilderReport::new(
            ConditionReason::ResourcesCreated,
            format!(
                "Role {} and RoleBinding {} grant exec access",
                role.object.key.name(),
                binding.object.key.name()
            ),
        ))
    }

    fn readiness(&self) -> Option<&dyn ReadinessVerifier> {
        Some(self)
    }
}

#[async_trait]
impl ReadinessVerifier for ExecAccessBuilder {
    async fn verify_access_resources(
        &self,
        context: &mut BuildContext<'_>,
    ) -> AppResult<BuilderReport> {
        let namespace = context.request.key().namespace();
        let target = context
            .request
            .status
            .target()
            .ok_or_else(|| AppError::Unavailable("no target pod assigned yet".to_owned()))?;

        let status = context
            .ports
            .targets
            .target_status(namespace, target)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("pod '{namespace}/{target}'")))?;

        if !status.is_usable() {
            return Err(AppError::Unavailable(format!(
                "pod {target} is {} (ready: {})",
                status.phase, status.ready
            )));
        }

        Ok(BuilderReport::new(
            ConditionReason::ResourcesReady,
            format!("Pod {target} is running and ready"),
        ))
    }
}

fn exec_role(request: &AccessRequest, target: &str) -> AccessRole {
    let rule = |resource: &str, verbs: &[&str]| PolicyRule {
        api_groups: vec![String::new()],
        resources: vec![resource.to_owned()],
        resource_names: vec![target.to_owned()],
        verbs: verbs.iter().map(|verb| (*verb).to_owned()).collect(),
    };

    AccessRole {
        key: ObjectKey::new(request.key().namespace(), request.access_object_name()),
        rules: vec![
            rule(POD_RESOURCE, &POD_READ_VERBS),
            rule(POD_EXEC_RESOURCE, &POD_EXEC_VERBS),
        ],
        owner: request.owner_reference(),
    }
}

fn exec_binding(request: &AccessRequest, template: &AccessTemplate) -> AccessRoleBinding {
    let name = request.access_object_name();

    AccessRoleBinding {
        key: ObjectKey::new(request.key().namespace(), name.clone()),
        role_name: name,
        subjects: template
            .access_config()
            .allowed_groups
            .iter()
            .map(|group| BindingSubject {
                kind: SubjectKind::Group,
                name: group.clone(),
            })
            .collect(),
        owner: request.owner_reference(),
    }
}

fn granted_pod(role: &AccessRole) -> Option<String> {
    role.rules
        .iter()
        .find(|rule| rule.resources.iter().any(|resource| resource == POD_EXEC_RESOURCE))
        .and_then(|rule| rule.resource_names.first().cloned())
}
