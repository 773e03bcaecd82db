use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use grantry_core::{AppError, AppResult, ObjectKey};
use grantry_domain::{
    AccessRequest, AccessRequestStatus, AccessRole, AccessRoleBinding, AccessTemplate,
    NewAccessRequest, ResourceMeta, TargetRef, TargetStatus,
};
use tokio::sync::RwLock;

use crate::cluster_ports::{
    AccessRequestRepository, AccessTemplateRepository, Clock, PermissionRepository,
    ProvisionedObject, SystemClock, TargetResolver,
};

/// In-memory cluster implementing every port.
///
/// Status writes are guarded by resource version, and deleting a request
/// removes the roles and bindings it owns. Target selection picks the first
/// pod by name and generated names count upwards, so runs are reproducible.
pub struct InMemoryCluster {
    clock: Arc<dyn Clock>,
    versions: AtomicU64,
    names: AtomicU64,
    requests: RwLock<HashMap<ObjectKey, AccessRequest>>,
    templates: RwLock<HashMap<ObjectKey, AccessTemplate>>,
    roles: RwLock<HashMap<ObjectKey, AccessRole>>,
    bindings: RwLock<HashMap<ObjectKey, AccessRoleBinding>>,
    workloads: RwLock<HashMap<ObjectKey, BTreeMap<String, TargetStatus>>>,
    status_writes: RwLock<Vec<(ObjectKey, AccessRequestStatus)>>,
    role_creations: AtomicUsize,
    binding_creations: AtomicUsize,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            versions: AtomicU64::new(0),
            names: AtomicU64::new(0),
            requests: RwLock::default(),
            templates: RwLock::default(),
            roles: RwLock::default(),
            bindings: RwLock::default(),
            workloads: RwLock::default(),
            status_writes: RwLock::default(),
            role_creations: AtomicUsize::new(0),
            binding_creations: AtomicUsize::new(0),
        }
    }
}

impl InMemoryCluster {
    /// Creates an empty cluster stamping creations with wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `clock` for creation timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn next_version(&self) -> String {
        (self.versions.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Stores a request as-is apart from a fresh resource version.
    ///
    /// Replaces any stored request with the same key, which is how tests
    /// simulate edits made by other writers.
    pub async fn insert_request(&self, mut request: AccessRequest) -> AccessRequest {
        request.meta.resource_version = self.next_version();
        self.requests
            .write()
            .await
            .insert(request.key().clone(), request.clone());
        request
    }

    /// Stores or replaces a template.
    pub async fn upsert_template(&self, template: AccessTemplate) {
        self.templates
            .write()
            .await
            .insert(template.key().clone(), template);
    }

    /// Replaces the pods of one workload.
    pub async fn upsert_workload(
        &self,
        namespace: &str,
        workload: &str,
        pods: &[(&str, TargetStatus)],
    ) {
        let pods = pods
            .iter()
            .map(|(name, status)| ((*name).to_owned(), status.clone()))
            .collect();
        self.workloads
            .write()
            .await
            .insert(ObjectKey::new(namespace, workload), pods);
    }

    /// Updates the observed state of one pod in any workload of the namespace.
    ///
    /// Returns false when no such pod exists.
    pub async fn set_pod_status(&self, namespace: &str, name: &str, status: TargetStatus) -> bool {
        let mut workloads = self.workloads.write().await;
        let pod = workloads
            .iter_mut()
            .filter(|(key, _)| key.namespace() == namespace)
            .find_map(|(_, pods)| pods.get_mut(name));

        match pod {
            Some(pod) => {
                *pod = status;
                true
            }
            None => false,
        }
    }

    /// Returns a stored request.
    pub async fn request(&self, key: &ObjectKey) -> Option<AccessRequest> {
        self.requests.read().await.get(key).cloned()
    }

    /// Returns a stored role.
    pub async fn role(&self, key: &ObjectKey) -> Option<AccessRole> {
        self.roles.read().await.get(key).cloned()
    }

    /// Returns a stored binding.
    pub async fn role_binding(&self, key: &ObjectKey) -> Option<AccessRoleBinding> {
        self.bindings.read().await.get(key).cloned()
    }

    /// Returns every stored role.
    pub async fn roles(&self) -> Vec<AccessRole> {
        self.roles.read().await.values().cloned().collect()
    }

    /// Returns every stored binding.
    pub async fn bindings(&self) -> Vec<AccessRoleBinding> {
        self.bindings.read().await.values().cloned().collect()
    }

    /// Roles and bindings created so far, in that order.
    #[must_use]
    pub fn creation_counts(&self) -> (usize, usize) {
        (
            self.role_creations.load(Ordering::SeqCst),
            self.binding_creations.load(Ordering::SeqCst),
        )
    }

    /// Number of accepted status writes.
    pub async fn status_write_count(&self) -> usize {
        self.status_writes.read().await.len()
    }

    /// Status carried by the latest accepted write for `key`.
    pub async fn last_status_written(&self, key: &ObjectKey) -> Option<AccessRequestStatus> {
        self.status_writes
            .read()
            .await
            .iter()
            .rev()
            .find(|(written, _)| written == key)
            .map(|(_, status)| status.clone())
    }
}

#[async_trait]
impl AccessRequestRepository for InMemoryCluster {
    async fn find_request(&self, key: &ObjectKey) -> AppResult<Option<AccessRequest>> {
        Ok(self.request(key).await)
    }

    async fn list_requests(&self, namespace: Option<&str>) -> AppResult<Vec<AccessRequest>> {
        let requests = self.requests.read().await;

        let mut values: Vec<AccessRequest> = requests
            .values()
            .filter(|request| namespace.is_none_or(|value| request.key().namespace() == value))
            .cloned()
            .collect();
        values.sort_by(|left, right| left.key().cmp(right.key()));

        Ok(values)
    }

    async fn create_request(&self, input: NewAccessRequest) -> AppResult<AccessRequest> {
        let mut requests = self.requests.write().await;

        let sequence = self.names.fetch_add(1, Ordering::SeqCst) + 1;
        let name = format!("{}{sequence:05}", input.generate_name);
        let key = ObjectKey::new(input.namespace, name.clone());
        if requests.contains_key(&key) {
            return Err(AppError::Conflict(format!(
                "access request '{key}' already exists"
            )));
        }

        let request = AccessRequest {
            meta: ResourceMeta {
                key: key.clone(),
                uid: format!("uid-{name}"),
                resource_version: self.next_version(),
                created_at: self.clock.now(),
            },
            spec: input.spec,
            status: AccessRequestStatus::default(),
        };
        requests.insert(key, request.clone());

        Ok(request)
    }

    async fn update_request_status(&self, request: &AccessRequest) -> AppResult<String> {
        let mut requests = self.requests.write().await;
        let stored = requests
            .get_mut(request.key())
            .ok_or_else(|| AppError::NotFound(format!("access request '{}'", request.key())))?;

        if stored.meta.resource_version != request.meta.resource_version {
            return Err(AppError::Conflict(format!(
                "access request '{}' has resource version {}, write used {}",
                request.key(),
                stored.meta.resource_version,
                request.meta.resource_version
            )));
        }

        let version = self.next_version();
        stored.status = request.status.clone();
        stored.meta.resource_version = version.clone();
        self.status_writes
            .write()
            .await
            .push((request.key().clone(), request.status.clone()));

        Ok(version)
    }

    async fn delete_request(&self, key: &ObjectKey) -> AppResult<bool> {
        let Some(removed) = self.requests.write().await.remove(key) else {
            return Ok(false);
        };

        let owner_uid = removed.meta.uid;
        self.roles
            .write()
            .await
            .retain(|_, role| role.owner.uid != owner_uid);
        self.bindings
            .write()
            .await
            .retain(|_, binding| binding.owner.uid != owner_uid);

        Ok(true)
    }
}

#[async_trait]
impl AccessTemplateRepository for InMemoryCluster {
    async fn find_template(&self, key: &ObjectKey) -> AppResult<Option<AccessTemplate>> {
        Ok(self.templates.read().await.get(key).cloned())
    }
}

#[async_trait]
impl PermissionRepository for InMemoryCluster {
    async fn get_or_create_role(
        &self,
        role: AccessRole,
    ) -> AppResult<ProvisionedObject<AccessRole>> {
        let mut roles = self.roles.write().await;
        if let Some(existing) = roles.get(&role.key) {
            return Ok(ProvisionedObject {
                object: existing.clone(),
                created: false,
            });
        }

        self.role_creations.fetch_add(1, Ordering::SeqCst);
        roles.insert(role.key.clone(), role.clone());
        Ok(ProvisionedObject {
            object: role,
            created: true,
        })
    }

    async fn get_or_create_role_binding(
        &self,
        binding: AccessRoleBinding,
    ) -> AppResult<ProvisionedObject<AccessRoleBinding>> {
        let mut bindings = self.bindings.write().await;
        if let Some(existing) = bindings.get(&binding.key) {
            return Ok(ProvisionedObject {
                object: existing.clone(),
                created: false,
            });
        }

        self.binding_creations.fetch_add(1, Ordering::SeqCst);
        bindings.insert(binding.key.clone(), binding.clone());
        Ok(ProvisionedObject {
            object: binding,
            created: true,
        })
    }
}

#[async_trait]
impl TargetResolver for InMemoryCluster {
    async fn resolve_target(
        &self,
        namespace: &str,
        target_ref: &TargetRef,
        target_override: Option<&str>,
    ) -> AppResult<Option<String>> {
        let workloads = self.workloads.read().await;
        let Some(pods) = workloads.get(&ObjectKey::new(namespace, target_ref.name.as_str())) else {
            return Ok(None);
        };

        Ok(match target_override {
            Some(name) => pods.contains_key(name).then(|| name.to_owned()),
            None => pods.keys().next().cloned(),
        })
    }

    async fn target_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> AppResult<Option<TargetStatus>> {
        let workloads = self.workloads.read().await;

        Ok(workloads
            .iter()
            .filter(|(key, _)| key.namespace() == namespace)
            .find_map(|(_, pods)| pods.get(name).cloned()))
    }
}

#[cfg(test)]
mod tests;
