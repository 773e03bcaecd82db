//! Watch-driven controller loop for access requests.
//!
//! Request events, changes to owned roles and bindings, and template edits
//! all trigger a pass. Each pass re-reads from the API server, so the watch
//! cache only decides *when* to reconcile.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use grantry_application::{AccessRequestReconciler, ReconcileOutcome};
use grantry_core::{AppError, AppResult};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::kube_resources::{ExecAccessRequest, ExecAccessTemplate, object_key};

/// Tunables for the controller loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Namespace to watch; `None` watches all namespaces.
    pub namespace: Option<String>,
    /// Maximum passes running at once. Passes for one request never overlap.
    pub concurrency: u16,
    /// Delay before retrying a pass that failed.
    pub error_requeue_interval: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            namespace: None,
            concurrency: 4,
            error_requeue_interval: Duration::from_secs(15),
        }
    }
}

struct ControllerContext {
    reconciler: AccessRequestReconciler,
    error_requeue_interval: Duration,
}

/// Runs the reconciler for every watched `ExecAccessRequest`.
pub struct AccessRequestController {
    client: Client,
    reconciler: AccessRequestReconciler,
    settings: ControllerSettings,
}

impl AccessRequestController {
    /// Creates a controller bound to one client.
    #[must_use]
    pub fn new(
        client: Client,
        reconciler: AccessRequestReconciler,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            client,
            reconciler,
            settings,
        }
    }

    /// Watches and reconciles until `shutdown` turns true or its sender drops.
    ///
    /// In-flight passes finish before this returns.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> AppResult<()> {
        if self.settings.concurrency == 0 {
            return Err(AppError::Validation(
                "controller concurrency must be greater than zero".to_owned(),
            ));
        }

        let namespace = self.settings.namespace.as_deref();
        let requests: Api<ExecAccessRequest> = scoped_api(&self.client, namespace);
        let roles: Api<Role> = scoped_api(&self.client, namespace);
        let bindings: Api<RoleBinding> = scoped_api(&self.client, namespace);
        let templates: Api<ExecAccessTemplate> = scoped_api(&self.client, namespace);

        let controller = Controller::new(requests, watcher::Config::default());
        let store = controller.store();
        let context = Arc::new(ControllerContext {
            reconciler: self.reconciler,
            error_requeue_interval: self.settings.error_requeue_interval,
        });

        info!(
            namespace = namespace.unwrap_or("*"),
            concurrency = self.settings.concurrency,
            "watching access requests"
        );

        controller
            .owns(roles, watcher::Config::default())
            .owns(bindings, watcher::Config::default())
            .watches(templates, watcher::Config::default(), move |template| {
                requests_using_template(&store.state(), &template)
            })
            .with_config(controller::Config::default().concurrency(self.settings.concurrency))
            .graceful_shutdown_on(async move {
                let _ = shutdown.wait_for(|stopping| *stopping).await;
            })
            .run(reconcile, error_policy, context)
            .for_each(|result| async move {
                match result {
                    Ok((request, action)) => {
                        debug!(request = %request, action = ?action, "pass scheduled");
                    }
                    Err(controller::Error::ReconcilerFailed(_, _)) => {}
                    Err(error) => warn!(error = %error, "controller stream error"),
                }
            })
            .await;

        info!("access request controller stopped");
        Ok(())
    }
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope> + DeserializeOwned,
    K::DynamicType: Default,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

async fn reconcile(
    request: Arc<ExecAccessRequest>,
    context: Arc<ControllerContext>,
) -> Result<Action, AppError> {
    let key = object_key(&request.metadata, "ExecAccessRequest")?;
    let outcome = context.reconciler.reconcile(&key).await?;
    Ok(action_for(outcome))
}

fn error_policy(
    request: Arc<ExecAccessRequest>,
    error: &AppError,
    context: Arc<ControllerContext>,
) -> Action {
    let delay = retry_delay(
        error,
        context.reconciler.settings().requeue_interval,
        context.error_requeue_interval,
    );
    warn!(
        namespace = ?request.namespace(),
        name = %request.name_any(),
        error = %error,
        retry_in = ?delay,
        "access request pass failed"
    );

    Action::requeue(delay)
}

fn action_for(outcome: ReconcileOutcome) -> Action {
    match outcome {
        ReconcileOutcome::RequeueAfter(delay) => Action::requeue(delay),
        ReconcileOutcome::Deleted | ReconcileOutcome::Gone => Action::await_change(),
    }
}

/// Invalid input is rechecked at the regular cadence, other failures sooner.
fn retry_delay(error: &AppError, requeue_interval: Duration, error_interval: Duration) -> Duration {
    match error {
        AppError::Validation(_) => requeue_interval,
        _ => error_interval,
    }
}

fn requests_using_template(
    requests: &[Arc<ExecAccessRequest>],
    template: &ExecAccessTemplate,
) -> Vec<ObjectRef<ExecAccessRequest>> {
    let namespace = template.namespace();
    let name = template.name_any();

    requests
        .iter()
        .filter(|request| request.namespace() == namespace && request.spec.template_name == name)
        .map(|request| ObjectRef::from_obj(request.as_ref()))
        .collect()
}
