//! Per-kind strategies that turn a request into RBAC objects.
//!
//! Each request kind registers exactly one [`AccessBuilder`]. A builder is
//! stateless; everything it needs for one pass arrives in a [`BuildContext`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use grantry_core::AppResult;
use grantry_domain::{AccessRequest, AccessTemplate, ConditionReason, RequestKindTag};

use crate::cluster_ports::ClusterPorts;
use crate::status_synchronizer::StatusSynchronizer;

mod exec_access;

pub use exec_access::ExecAccessBuilder;

/// Everything a builder is bound to for a single reconciliation pass.
pub struct BuildContext<'a> {
    /// Cluster ports.
    pub ports: &'a ClusterPorts,
    /// Status writer.
    pub status: &'a StatusSynchronizer,
    /// Request being reconciled; builders may write its status.
    pub request: &'a mut AccessRequest,
    /// Template the request references.
    pub template: &'a AccessTemplate,
}

/// Successful builder outcome recorded on a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderReport {
    /// Condition reason.
    pub reason: ConditionReason,
    /// Human-readable message.
    pub message: String,
}

impl BuilderReport {
    /// Creates a report.
    #[must_use]
    pub fn new(reason: ConditionReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Provisioning capability every request kind provides.
#[async_trait]
pub trait AccessBuilder: Send + Sync {
    /// Creates the role, binding and access instructions for the request.
    ///
    /// Must be idempotent: repeated or overlapping calls leave exactly one
    /// role and one binding behind.
    async fn create_access_resources(
        &self,
        context: &mut BuildContext<'_>,
    ) -> AppResult<BuilderReport>;

    /// Returns the readiness capability when this kind has one.
    fn readiness(&self) -> Option<&dyn ReadinessVerifier> {
        None
    }
}

/// Optional check that provisioned access is actually usable.
#[async_trait]
pub trait ReadinessVerifier: Send + Sync {
    /// Returns a report when the target is usable, an error otherwise.
    async fn verify_access_resources(
        &self,
        context: &mut BuildContext<'_>,
    ) -> AppResult<BuilderReport>;
}

/// Explicit kind-to-builder dispatch table.
#[derive(Clone, Default)]
pub struct BuilderRegistry {
    builders: BTreeMap<RequestKindTag, Arc<dyn AccessBuilder>>,
}

impl BuilderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a builder for one kind, replacing any previous entry.
    #[must_use]
    pub fn with_builder(mut self, kind: RequestKindTag, builder: Arc<dyn AccessBuilder>) -> Self {
        self.builders.insert(kind, builder);
        self
    }

    /// Registry with every built-in kind.
    #[must_use]
    pub fn standard() -> Self {
        Self::new().with_builder(RequestKindTag::Exec, Arc::new(ExecAccessBuilder))
    }

    /// Returns the builder for a kind.
    #[must_use]
    pub fn builder_for(&self, kind: RequestKindTag) -> Option<Arc<dyn AccessBuilder>> {
        self.builders.get(&kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use grantry_domain::RequestKindTag;

    use super::BuilderRegistry;

    #[test]
    fn standard_registry_covers_exec() {
        let registry = BuilderRegistry::standard();
        let builder = registry.builder_for(RequestKindTag::Exec);
        assert!(builder.is_some_and(|builder| builder.readiness().is_some()));
    }

    #[test]
    fn empty_registry_has_no_builders() {
        assert!(BuilderRegistry::new().builder_for(RequestKindTag::Exec).is_none());
    }
}
