use std::sync::Arc;

use chrono::TimeDelta;
use grantry_core::{AppError, ObjectKey};
use grantry_domain::{AccessRole, NewAccessRequest, OwnerReference};

use crate::cluster_ports::{AccessRequestRepository, PermissionRepository, TargetResolver};
use crate::test_support::{FixedClock, exec_template, pending, running, start_time};

use super::InMemoryCluster;

fn exec_input() -> NewAccessRequest {
    NewAccessRequest::exec("web", "alice", "shell", None, None).unwrap_or_else(|_| unreachable!())
}

fn owner(name: &str, uid: &str) -> OwnerReference {
    OwnerReference {
        api_version: "grantry.dev/v1alpha1".to_owned(),
        kind: "ExecAccessRequest".to_owned(),
        name: name.to_owned(),
        uid: uid.to_owned(),
    }
}

#[tokio::test]
async fn created_requests_get_generated_names_and_identity() {
    let clock = Arc::new(FixedClock::default());
    clock.advance(TimeDelta::minutes(5));
    let cluster = InMemoryCluster::new().with_clock(clock);

    let first = cluster
        .create_request(exec_input())
        .await
        .unwrap_or_else(|_| unreachable!());
    let second = cluster
        .create_request(exec_input())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(first.key().name(), "alice-00001");
    assert_eq!(second.key().name(), "alice-00002");
    assert_ne!(first.meta.uid, second.meta.uid);
    assert_eq!(first.meta.created_at, start_time() + TimeDelta::minutes(5));

    let listed = cluster.list_requests(Some("web")).await.unwrap_or_default();
    assert_eq!(listed.len(), 2);
    let elsewhere = cluster.list_requests(Some("db")).await.unwrap_or_default();
    assert!(elsewhere.is_empty());
}

#[tokio::test]
async fn stale_status_write_is_a_conflict() {
    let cluster = InMemoryCluster::new();
    let created = cluster
        .create_request(exec_input())
        .await
        .unwrap_or_else(|_| unreachable!());

    let mut fresh = created.clone();
    fresh.status.access_message = Some("fresh".to_owned());
    assert!(cluster.update_request_status(&fresh).await.is_ok());

    let mut stale = created.clone();
    stale.status.access_message = Some("stale".to_owned());
    let rejected = cluster.update_request_status(&stale).await;
    assert!(matches!(rejected, Err(AppError::Conflict(_))));

    let stored = cluster
        .request(created.key())
        .await
        .and_then(|request| request.status.access_message);
    assert_eq!(stored.as_deref(), Some("fresh"));
    assert_eq!(cluster.status_write_count().await, 1);
}

#[tokio::test]
async fn deleting_a_request_removes_owned_permissions() {
    let cluster = InMemoryCluster::new();
    let created = cluster
        .create_request(exec_input())
        .await
        .unwrap_or_else(|_| unreachable!());
    let role_key = ObjectKey::new("web", created.access_object_name());
    let foreign_key = ObjectKey::new("web", "someone-else-access");

    for (key, owner) in [
        (role_key.clone(), created.owner_reference()),
        (foreign_key.clone(), owner("someone-else", "other-uid")),
    ] {
        let stored = cluster
            .get_or_create_role(AccessRole {
                key,
                rules: Vec::new(),
                owner,
            })
            .await;
        assert!(stored.is_ok());
    }

    assert_eq!(cluster.delete_request(created.key()).await.ok(), Some(true));
    assert_eq!(cluster.delete_request(created.key()).await.ok(), Some(false));
    assert!(cluster.role(&role_key).await.is_none());
    assert!(cluster.role(&foreign_key).await.is_some());
}

#[tokio::test]
async fn get_or_create_keeps_the_first_object() {
    let cluster = InMemoryCluster::new();
    let key = ObjectKey::new("web", "alice-access");

    let first = cluster
        .get_or_create_role(AccessRole {
            key: key.clone(),
            rules: Vec::new(),
            owner: owner("alice", "uid-1"),
        })
        .await;
    let second = cluster
        .get_or_create_role(AccessRole {
            key,
            rules: Vec::new(),
            owner: owner("alice", "uid-2"),
        })
        .await;

    assert_eq!(first.map(|value| value.created).ok(), Some(true));
    let second = second.unwrap_or_else(|_| unreachable!());
    assert!(!second.created);
    assert_eq!(second.object.owner.uid, "uid-1");
    assert_eq!(cluster.creation_counts(), (1, 0));
}

#[tokio::test]
async fn target_selection_is_deterministic_and_scoped_to_the_workload() {
    let cluster = InMemoryCluster::new();
    cluster
        .upsert_workload("web", "api", &[("api-b", running()), ("api-a", running())])
        .await;
    let template = exec_template("web", "shell", "30m", "2h");

    let picked = cluster
        .resolve_target("web", template.target_ref(), None)
        .await;
    assert_eq!(picked.ok().flatten().as_deref(), Some("api-a"));

    let outside = cluster
        .resolve_target("web", template.target_ref(), Some("db-0"))
        .await;
    assert_eq!(outside.ok().flatten(), None);

    let other_namespace = cluster
        .resolve_target("payments", template.target_ref(), None)
        .await;
    assert_eq!(other_namespace.ok().flatten(), None);
}

#[tokio::test]
async fn pod_status_changes_are_visible_to_target_checks() {
    let cluster = InMemoryCluster::new();
    cluster
        .upsert_workload("web", "api", &[("api-a", running())])
        .await;

    assert!(cluster.set_pod_status("web", "api-a", pending()).await);
    assert!(!cluster.set_pod_status("web", "api-z", pending()).await);

    let status = cluster.target_status("web", "api-a").await;
    assert_eq!(status.ok().flatten(), Some(pending()));
    let missing = cluster.target_status("db", "api-a").await;
    assert_eq!(missing.ok().flatten(), None);
}
