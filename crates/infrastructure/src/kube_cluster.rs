use std::collections::BTreeMap;

use async_trait::async_trait;
use grantry_application::{
    AccessRequestRepository, AccessTemplateRepository, PermissionRepository, ProvisionedObject,
    TargetResolver,
};
use grantry_core::{AppError, AppResult, ObjectKey};
use grantry_domain::{
    AccessRequest, AccessRole, AccessRoleBinding, AccessTemplate, NewAccessRequest, RUNNING_PHASE,
    TargetRef, TargetStatus, WorkloadKind,
};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use rand::seq::SliceRandom;
use serde_json::json;
use tracing::{debug, info};

use crate::kube_resources::{
    AccessRequestStatusFields, ExecAccessRequest, ExecAccessTemplate, pod_target_status,
    readable_requests, role_binding_from_kube, role_binding_to_kube, role_from_kube, role_to_kube,
    selector_string,
};

const FIELD_MANAGER: &str = "grantry-controller";

/// Cluster adapter backed by the Kubernetes API server.
///
/// Every read goes to the API server; nothing is cached between passes.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Creates an adapter from a configured client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects with in-cluster or kubeconfig credentials.
    pub async fn try_default() -> AppResult<Self> {
        let client = Client::try_default()
            .await
            .map_err(|error| AppError::Internal(format!("failed to build kube client: {error}")))?;
        Ok(Self::new(client))
    }

    /// Returns a handle to the underlying client.
    #[must_use]
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    fn requests(&self, namespace: &str) -> Api<ExecAccessRequest> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn workload_selector(
        &self,
        namespace: &str,
        target_ref: &TargetRef,
    ) -> AppResult<Option<BTreeMap<String, String>>> {
        let name = target_ref.name.as_str();
        let context = format!("{} {namespace}/{name}", target_ref.kind.as_str());

        let selector = match target_ref.kind {
            WorkloadKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
                get_optional(&api, name, &context)
                    .await?
                    .map(|workload| workload.spec.map(|spec| spec.selector))
            }
            WorkloadKind::StatefulSet => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
                get_optional(&api, name, &context)
                    .await?
                    .map(|workload| workload.spec.map(|spec| spec.selector))
            }
            WorkloadKind::DaemonSet => {
                let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
                get_optional(&api, name, &context)
                    .await?
                    .map(|workload| workload.spec.map(|spec| spec.selector))
            }
        };

        Ok(selector.map(|selector| {
            selector
                .and_then(|selector| selector.match_labels)
                .unwrap_or_default()
        }))
    }
}

fn map_kube_error(context: &str, error: kube::Error) -> AppError {
    match error {
        kube::Error::Api(response) if response.code == 403 => {
            AppError::Forbidden(format!("{context}: {}", response.message))
        }
        kube::Error::Api(response) if response.code == 404 => {
            AppError::NotFound(format!("{context}: {}", response.message))
        }
        kube::Error::Api(response) if response.code == 409 => {
            AppError::Conflict(format!("{context}: {}", response.message))
        }
        other => AppError::Internal(format!("{context}: {other}")),
    }
}

fn is_status(error: &kube::Error, code: u16) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == code)
}

async fn get_optional<K>(api: &Api<K>, name: &str, context: &str) -> AppResult<Option<K>>
where
    K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.get(name).await {
        Ok(object) => Ok(Some(object)),
        Err(error) if is_status(&error, 404) => Ok(None),
        Err(error) => Err(map_kube_error(context, error)),
    }
}

/// Creates an object, returning the stored copy when it already exists.
async fn get_or_create<K>(
    api: &Api<K>,
    name: &str,
    object: &K,
    context: &str,
) -> AppResult<(K, bool)>
where
    K: kube::Resource + Clone + serde::de::DeserializeOwned + serde::Serialize + std::fmt::Debug,
{
    if let Some(existing) = get_optional(api, name, context).await? {
        return Ok((existing, false));
    }

    match api.create(&PostParams::default(), object).await {
        Ok(created) => Ok((created, true)),
        Err(error) if is_status(&error, 409) => {
            debug!(object = context, "lost create race, reading stored object");
            let existing = api
                .get(name)
                .await
                .map_err(|error| map_kube_error(context, error))?;
            Ok((existing, false))
        }
        Err(error) => Err(map_kube_error(context, error)),
    }
}

#[async_trait]
impl AccessRequestRepository for KubeCluster {
    async fn find_request(&self, key: &ObjectKey) -> AppResult<Option<AccessRequest>> {
        let context = format!("access request {key}");
        get_optional(&self.requests(key.namespace()), key.name(), &context)
            .await?
            .map(|request| request.to_domain())
            .transpose()
    }

    async fn list_requests(&self, namespace: Option<&str>) -> AppResult<Vec<AccessRequest>> {
        let api: Api<ExecAccessRequest> = match namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        };

        let listed = api
            .list(&ListParams::default())
            .await
            .map_err(|error| map_kube_error("list access requests", error))?;

        Ok(readable_requests(&listed.items))
    }

    async fn create_request(&self, input: NewAccessRequest) -> AppResult<AccessRequest> {
        let object =
            ExecAccessRequest::for_creation(&input.namespace, &input.generate_name, &input.spec);
        let created = self
            .requests(&input.namespace)
            .create(&PostParams::default(), &object)
            .await
            .map_err(|error| {
                map_kube_error(
                    &format!("create access request in {}", input.namespace),
                    error,
                )
            })?;

        created.to_domain()
    }

    async fn update_request_status(&self, request: &AccessRequest) -> AppResult<String> {
        let key = request.key();
        let patch = json!({
            "metadata": { "resourceVersion": request.meta.resource_version },
            "status": AccessRequestStatusFields::from(request),
        });

        let patched = self
            .requests(key.namespace())
            .patch_status(
                key.name(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|error| map_kube_error(&format!("update status of {key}"), error))?;

        Ok(patched.resource_version().unwrap_or_default())
    }

    async fn delete_request(&self, key: &ObjectKey) -> AppResult<bool> {
        match self
            .requests(key.namespace())
            .delete(key.name(), &DeleteParams::background())
            .await
        {
            Ok(_) => {
                info!(request = %key, "access request deletion requested");
                Ok(true)
            }
            Err(error) if is_status(&error, 404) => Ok(false),
            Err(error) => Err(map_kube_error(&format!("delete access request {key}"), error)),
        }
    }
}

#[async_trait]
impl AccessTemplateRepository for KubeCluster {
    async fn find_template(&self, key: &ObjectKey) -> AppResult<Option<AccessTemplate>> {
        let api: Api<ExecAccessTemplate> = Api::namespaced(self.client.clone(), key.namespace());
        get_optional(&api, key.name(), &format!("access template {key}"))
            .await?
            .map(|template| template.to_domain())
            .transpose()
    }
}

#[async_trait]
impl PermissionRepository for KubeCluster {
    async fn get_or_create_role(
        &self,
        role: AccessRole,
    ) -> AppResult<ProvisionedObject<AccessRole>> {
        let api: Api<Role> = Api::namespaced(self.client.clone(), role.key.namespace());
        let (stored, created) = get_or_create(
            &api,
            role.key.name(),
            &role_to_kube(&role),
            &format!("role {}", role.key),
        )
        .await?;

        Ok(ProvisionedObject {
            object: role_from_kube(&stored)?,
            created,
        })
    }

    async fn get_or_create_role_binding(
        &self,
        binding: AccessRoleBinding,
    ) -> AppResult<ProvisionedObject<AccessRoleBinding>> {
        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), binding.key.namespace());
        let (stored, created) = get_or_create(
            &api,
            binding.key.name(),
            &role_binding_to_kube(&binding),
            &format!("role binding {}", binding.key),
        )
        .await?;

        Ok(ProvisionedObject {
            object: role_binding_from_kube(&stored)?,
            created,
        })
    }
}

#[async_trait]
impl TargetResolver for KubeCluster {
    async fn resolve_target(
        &self,
        namespace: &str,
        target_ref: &TargetRef,
        target_override: Option<&str>,
    ) -> AppResult<Option<String>> {
        let Some(labels) = self.workload_selector(namespace, target_ref).await? else {
            return Ok(None);
        };
        if labels.is_empty() {
            return Err(AppError::Validation(format!(
                "{} {namespace}/{} has no matchLabels selector",
                target_ref.kind.as_str(),
                target_ref.name
            )));
        }

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let listed = pods
            .list(&ListParams::default().labels(&selector_string(&labels)))
            .await
            .map_err(|error| map_kube_error(&format!("list pods in {namespace}"), error))?;

        if let Some(name) = target_override {
            return Ok(listed
                .items
                .iter()
                .any(|pod| pod.name_any() == name)
                .then(|| name.to_owned()));
        }

        let running: Vec<String> = listed
            .items
            .iter()
            .filter(|pod| pod_target_status(pod).phase == RUNNING_PHASE)
            .map(ResourceExt::name_any)
            .collect();

        Ok(running.choose(&mut rand::thread_rng()).cloned())
    }

    async fn target_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> AppResult<Option<TargetStatus>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(get_optional(&pods, name, &format!("pod {namespace}/{name}"))
            .await?
            .map(|pod| pod_target_status(&pod)))
    }
}
