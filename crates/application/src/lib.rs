//! Reconciliation engine, ports and the in-memory cluster adapter.

#![forbid(unsafe_code)]

mod builders;
mod cluster_ports;
mod duration_policy;
mod expiration_guard;
mod in_memory_cluster;
mod reconciler;
mod request_service;
mod status_synchronizer;

#[cfg(test)]
mod test_support;

pub use builders::{
    AccessBuilder, BuildContext, BuilderRegistry, BuilderReport, ExecAccessBuilder,
    ReadinessVerifier,
};
pub use cluster_ports::{
    AccessRequestRepository, AccessTemplateRepository, Clock, ClusterPorts, PermissionRepository,
    ProvisionedObject, SystemClock, TargetResolver,
};
pub use duration_policy::DurationPolicyResolver;
pub use expiration_guard::{ExpirationGuard, GuardDecision};
pub use in_memory_cluster::InMemoryCluster;
pub use reconciler::{AccessRequestReconciler, ReconcileOutcome, ReconcilerSettings};
pub use request_service::{AccessRequestService, WaitOutcome, WaitPolicy};
pub use status_synchronizer::StatusSynchronizer;
