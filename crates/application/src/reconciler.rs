use std::sync::Arc;
use std::time::Duration;

use grantry_core::{AppError, AppResult, ObjectKey};
use grantry_domain::{
    AccessRequest, AccessTemplate, ConditionReason, ConditionStatus, ConditionType,
};
use tracing::{debug, info};

use crate::builders::{AccessBuilder, BuildContext, BuilderRegistry};
use crate::cluster_ports::{ClusterPorts, Clock};
use crate::duration_policy::DurationPolicyResolver;
use crate::expiration_guard::{ExpirationGuard, GuardDecision};
use crate::status_synchronizer::StatusSynchronizer;

/// Scheduling decision returned by one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Run another pass after the delay.
    RequeueAfter(Duration),
    /// The request was deleted by this pass.
    Deleted,
    /// The request no longer exists.
    Gone,
}

/// Tunables for the reconciliation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Delay before re-checking a request that reconciled cleanly.
    pub requeue_interval: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            requeue_interval: Duration::from_secs(60),
        }
    }
}

/// Drives one request through the reconciliation pipeline.
#[derive(Clone)]
pub struct AccessRequestReconciler {
    ports: ClusterPorts,
    builders: BuilderRegistry,
    status: StatusSynchronizer,
    durations: DurationPolicyResolver,
    guard: ExpirationGuard,
    settings: ReconcilerSettings,
}

impl AccessRequestReconciler {
    /// Creates a reconciler with the built-in builders and default settings.
    #[must_use]
    pub fn new(ports: ClusterPorts, clock: Arc<dyn Clock>) -> Self {
        let status = StatusSynchronizer::new(ports.requests.clone(), clock);

        Self {
            builders: BuilderRegistry::standard(),
            durations: DurationPolicyResolver::new(status.clone()),
            guard: ExpirationGuard::new(ports.requests.clone(), status.clone()),
            status,
            ports,
            settings: ReconcilerSettings::default(),
        }
    }

    /// Replaces the builder registry.
    #[must_use]
    pub fn with_builders(mut self, builders: BuilderRegistry) -> Self {
        self.builders = builders;
        self
    }

    /// Replaces the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: ReconcilerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns the active settings.
    #[must_use]
    pub fn settings(&self) -> ReconcilerSettings {
        self.settings
    }

    /// Runs one pass for a request key.
    ///
    /// Every step re-derives from a fresh read; nothing carries over between
    /// passes except what is stored on the request status.
    pub async fn reconcile(&self, key: &ObjectKey) -> AppResult<ReconcileOutcome> {
        let Some(mut request) = self.status.refetch(key).await? else {
            debug!(namespace = %key.namespace(), name = %key.name(), "access request gone");
            return Ok(ReconcileOutcome::Gone);
        };

        if self.guard.precheck(&request).await? == GuardDecision::Deleted {
            return Ok(ReconcileOutcome::Deleted);
        }

        let template = self.load_template(&mut request).await?;
        let resolved = self.durations.resolve(&mut request, &template).await?;

        if self.guard.enforce(&mut request, resolved).await? == GuardDecision::Deleted {
            return Ok(ReconcileOutcome::Deleted);
        }

        let builder = self.builders.builder_for(request.kind_tag()).ok_or_else(|| {
            AppError::Internal(format!(
                "no builder registered for kind '{}'",
                request.kind_tag().as_str()
            ))
        })?;

        self.provision(builder.as_ref(), &mut request, &template)
            .await?;
        self.verify(builder.as_ref(), &mut request, &template)
            .await?;

        info!(
            namespace = %key.namespace(),
            name = %key.name(),
            phase = request.phase().as_str(),
            "access request reconciled"
        );

        Ok(ReconcileOutcome::RequeueAfter(
            self.settings.requeue_interval,
        ))
    }

    async fn load_template(&self, request: &mut AccessRequest) -> AppResult<AccessTemplate> {
        let template_key = ObjectKey::new(
            request.key().namespace(),
            request.spec.template_name.as_str(),
        );

        if let Some(template) = self.ports.templates.find_template(&template_key).await? {
            return Ok(template);
        }

        let message = format!(
            "template '{}' not found in namespace '{}'",
            template_key.name(),
            template_key.namespace()
        );
        let _ = self
            .status
            .set_condition(
                request,
                ConditionType::DurationsValid,
                ConditionStatus::False,
                ConditionReason::TemplateNotFound,
                message.clone(),
            )
            .await;

        Err(AppError::NotFound(message))
    }

    async fn provision(
        &self,
        builder: &dyn AccessBuilder,
        request: &mut AccessRequest,
        template: &AccessTemplate,
    ) -> AppResult<()> {
        let result = {
            let mut context = BuildContext {
                ports: &self.ports,
                status: &self.status,
                request: &mut *request,
                template,
            };
            builder.create_access_resources(&mut context).await
        };

        match result {
            Ok(report) => {
                self.status
                    .set_condition(
                        request,
                        ConditionType::ResourcesCreated,
                        ConditionStatus::True,
                        report.reason,
                        report.message,
                    )
                    .await
            }
            Err(error) => {
                let reason = match error {
                    AppError::NotFound(_) => ConditionReason::TargetNotFound,
                    _ => ConditionReason::ProvisioningFailed,
                };
                let _ = self
                    .status
                    .set_condition(
                        request,
                        ConditionType::ResourcesCreated,
                        ConditionStatus::False,
                        reason,
                        error.to_string(),
                    )
                    .await;
                Err(error)
            }
        }
    }

    async fn verify(
        &self,
        builder: &dyn AccessBuilder,
        request: &mut AccessRequest,
        template: &AccessTemplate,
    ) -> AppResult<()> {
        let Some(readiness) = builder.readiness() else {
            return self
                .status
                .set_condition(
                    request,
                    ConditionType::ResourcesReady,
                    ConditionStatus::True,
                    ConditionReason::ResourcesReady,
                    "Ready once provisioned",
                )
                .await;
        };

        let result = {
            let mut context = BuildContext {
                ports: &self.ports,
                status: &self.status,
                request: &mut *request,
                template,
            };
            readiness.verify_access_resources(&mut context).await
        };

        match result {
            Ok(report) => {
                self.status
                    .set_condition(
                        request,
                        ConditionType::ResourcesReady,
                        ConditionStatus::True,
                        report.reason,
                        report.message,
                    )
                    .await
            }
            Err(error) => {
                let _ = self
                    .status
                    .set_condition(
                        request,
                        ConditionType::ResourcesReady,
                        ConditionStatus::False,
                        ConditionReason::NotReady,
                        error.to_string(),
                    )
                    .await;
                Err(error)
            }
        }
    }
}
