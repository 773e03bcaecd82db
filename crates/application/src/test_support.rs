use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use grantry_core::ObjectKey;
use grantry_domain::{
    AccessConfig, AccessRequest, AccessRequestSpec, AccessRequestStatus, AccessTemplate,
    RequestKind, ResourceMeta, TargetRef, TargetStatus, WorkloadKind,
};

use crate::cluster_ports::Clock;

pub(crate) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Clock pinned to `start_time() + offset`.
pub(crate) struct FixedClock {
    offset: Mutex<TimeDelta>,
}

impl Default for FixedClock {
    fn default() -> Self {
        Self {
            offset: Mutex::new(TimeDelta::zero()),
        }
    }
}

impl FixedClock {
    pub(crate) fn advance(&self, delta: TimeDelta) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset += delta;
        }
    }

    pub(crate) fn set_offset(&self, delta: TimeDelta) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset = delta;
        }
    }

    pub(crate) fn current(&self) -> DateTime<Utc> {
        self.now()
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        let offset = self
            .offset
            .lock()
            .map(|offset| *offset)
            .unwrap_or_else(|_| TimeDelta::zero());
        start_time() + offset
    }
}

pub(crate) fn exec_request(namespace: &str, name: &str, duration: Option<&str>) -> AccessRequest {
    AccessRequest {
        meta: ResourceMeta {
            key: ObjectKey::new(namespace, name),
            uid: format!("uid-{name}"),
            resource_version: "0".to_owned(),
            created_at: start_time(),
        },
        spec: AccessRequestSpec {
            template_name: "shell".to_owned(),
            duration: duration.map(str::to_owned),
            kind: RequestKind::Exec {
                target_override: None,
            },
        },
        status: AccessRequestStatus::default(),
    }
}

pub(crate) fn exec_template(
    namespace: &str,
    name: &str,
    default_duration: &str,
    max_duration: &str,
) -> AccessTemplate {
    let template = AccessTemplate::new(
        ObjectKey::new(namespace, name),
        AccessConfig {
            allowed_groups: vec!["sre".to_owned(), "oncall".to_owned()],
            default_duration: default_duration.to_owned(),
            max_duration: max_duration.to_owned(),
            access_command: String::new(),
        },
        TargetRef {
            api_version: "apps/v1".to_owned(),
            kind: WorkloadKind::Deployment,
            name: "api".to_owned(),
        },
    );

    match template {
        Ok(template) => template,
        Err(error) => panic!("test template must be valid: {error}"),
    }
}

pub(crate) fn running() -> TargetStatus {
    TargetStatus {
        phase: "Running".to_owned(),
        ready: true,
    }
}

pub(crate) fn pending() -> TargetStatus {
    TargetStatus {
        phase: "Pending".to_owned(),
        ready: false,
    }
}
