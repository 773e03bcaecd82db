//! Kubernetes adapters for application ports and the watch-driven controller.

#![forbid(unsafe_code)]

mod kube_cluster;
mod kube_controller;
mod kube_resources;

pub use kube_cluster::KubeCluster;
pub use kube_controller::{AccessRequestController, ControllerSettings};
pub use kube_resources::{
    AccessConfigSpec, AccessRequestStatusFields, ExecAccessRequest, ExecAccessRequestSpec,
    ExecAccessTemplate, ExecAccessTemplateSpec, StatusCondition, TargetRefSpec,
};
