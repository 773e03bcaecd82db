use std::sync::Arc;

use grantry_core::{AppError, AppResult, ObjectKey};
use grantry_domain::{
    AccessRequest, ConditionReason, ConditionStatus, ConditionType, TargetAssignment,
};
use tracing::debug;

use crate::cluster_ports::{AccessRequestRepository, Clock};

/// Strongly-consistent reads and optimistic status writes for requests.
///
/// Every mutating write re-reads the stored request and applies the change
/// to that copy, so edits made since the pass started are kept. A write that
/// still loses the resource-version race fails with `Conflict` and is not
/// retried here; the next pass re-derives from a fresh read.
#[derive(Clone)]
pub struct StatusSynchronizer {
    requests: Arc<dyn AccessRequestRepository>,
    clock: Arc<dyn Clock>,
}

impl StatusSynchronizer {
    /// Creates a synchronizer.
    #[must_use]
    pub fn new(requests: Arc<dyn AccessRequestRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { requests, clock }
    }

    /// Reads the current request, bypassing any cache.
    pub async fn refetch(&self, key: &ObjectKey) -> AppResult<Option<AccessRequest>> {
        self.requests.find_request(key).await
    }

    /// Replaces the in-memory copy with the stored object.
    pub async fn refetch_into(&self, request: &mut AccessRequest) -> AppResult<()> {
        *request = self.stored(request.key()).await?;
        Ok(())
    }

    /// Records the target and access message of `request` on the stored copy.
    ///
    /// The target is write-once: a stored target that differs is a
    /// `Conflict`. On success `request` becomes the written copy.
    pub async fn update_status(&self, request: &mut AccessRequest) -> AppResult<()> {
        let mut fresh = self.stored(request.key()).await?;

        if let Some(target) = request.status.target()
            && let TargetAssignment::AlreadyAssigned { existing } =
                fresh.status.assign_target(target)
            && existing != target
        {
            return Err(AppError::Conflict(format!(
                "access request '{}' already targets '{existing}'",
                request.key()
            )));
        }
        if let Some(message) = &request.status.access_message {
            fresh.status.access_message = Some(message.clone());
        }

        self.write(&mut fresh).await?;
        *request = fresh;
        Ok(())
    }

    /// Sets one condition on the stored copy and writes status when anything
    /// changed. `request` becomes the stored copy either way.
    pub async fn set_condition(
        &self,
        request: &mut AccessRequest,
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: ConditionReason,
        message: impl Into<String> + Send,
    ) -> AppResult<()> {
        let mut fresh = self.stored(request.key()).await?;
        let changed = fresh.status.conditions.set(
            condition_type,
            status,
            reason,
            message,
            self.clock.now(),
        );
        if changed {
            self.write(&mut fresh).await?;
        }

        *request = fresh;
        Ok(())
    }

    /// Returns the time source shared with the engine.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    async fn stored(&self, key: &ObjectKey) -> AppResult<AccessRequest> {
        self.requests
            .find_request(key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("access request '{key}'")))
    }

    async fn write(&self, request: &mut AccessRequest) -> AppResult<()> {
        match self.requests.update_request_status(request).await {
            Ok(resource_version) => {
                request.meta.resource_version = resource_version;
                Ok(())
            }
            Err(error) => {
                debug!(
                    namespace = %request.key().namespace(),
                    name = %request.key().name(),
                    resource_version = %request.meta.resource_version,
                    error = %error,
                    "access request status write rejected"
                );
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use grantry_core::{AppError, AppResult, ObjectKey};
    use grantry_domain::{
        AccessRequest, ConditionReason, ConditionStatus, ConditionType, NewAccessRequest,
    };

    use crate::cluster_ports::AccessRequestRepository;
    use crate::in_memory_cluster::InMemoryCluster;
    use crate::test_support::{FixedClock, exec_request};

    use super::StatusSynchronizer;

    /// Bumps the stored resource version right after every read.
    struct ContendedRequests {
        cluster: Arc<InMemoryCluster>,
    }

    #[async_trait]
    impl AccessRequestRepository for ContendedRequests {
        async fn find_request(&self, key: &ObjectKey) -> AppResult<Option<AccessRequest>> {
            let found = self.cluster.find_request(key).await?;
            if let Some(request) = &found {
                let _ = self.cluster.insert_request(request.clone()).await;
            }
            Ok(found)
        }

        async fn list_requests(&self, namespace: Option<&str>) -> AppResult<Vec<AccessRequest>> {
            self.cluster.list_requests(namespace).await
        }

        async fn create_request(&self, input: NewAccessRequest) -> AppResult<AccessRequest> {
            self.cluster.create_request(input).await
        }

        async fn update_request_status(&self, request: &AccessRequest) -> AppResult<String> {
            self.cluster.update_request_status(request).await
        }

        async fn delete_request(&self, key: &ObjectKey) -> AppResult<bool> {
            self.cluster.delete_request(key).await
        }
    }

    fn synchronizer(cluster: &Arc<InMemoryCluster>) -> StatusSynchronizer {
        StatusSynchronizer::new(cluster.clone(), Arc::new(FixedClock::default()))
    }

    #[tokio::test]
    async fn refetch_picks_up_newer_resource_version() {
        let cluster = Arc::new(InMemoryCluster::new());
        let stale = cluster.insert_request(exec_request("web", "alice-1", None)).await;
        let synchronizer = synchronizer(&cluster);

        let mut writer_copy = stale.clone();
        writer_copy.status.access_message = Some("hello".to_owned());
        assert!(synchronizer.update_status(&mut writer_copy).await.is_ok());

        let mut reader_copy = stale.clone();
        assert!(synchronizer.refetch_into(&mut reader_copy).await.is_ok());
        assert_eq!(
            reader_copy.meta.resource_version,
            writer_copy.meta.resource_version
        );
        assert_ne!(reader_copy.meta.resource_version, stale.meta.resource_version);
    }

    #[tokio::test]
    async fn set_condition_adopts_server_resource_version() {
        let cluster = Arc::new(InMemoryCluster::new());
        let mut request = cluster.insert_request(exec_request("web", "alice-1", None)).await;
        let before = request.meta.resource_version.clone();
        let synchronizer = synchronizer(&cluster);

        let result = synchronizer
            .set_condition(
                &mut request,
                ConditionType::DurationsValid,
                ConditionStatus::True,
                ConditionReason::Defaulted,
                "defaulted",
            )
            .await;

        assert!(result.is_ok());
        assert_ne!(request.meta.resource_version, before);

        let stored = cluster.request(request.key()).await;
        assert_eq!(
            stored.map(|value| value.meta.resource_version),
            Some(request.meta.resource_version.clone())
        );
    }

    #[tokio::test]
    async fn stale_copy_keeps_conditions_written_since_it_was_read() {
        let cluster = Arc::new(InMemoryCluster::new());
        let original = cluster.insert_request(exec_request("web", "alice-1", None)).await;
        let synchronizer = synchronizer(&cluster);

        let mut other_writer = original.clone();
        let written = synchronizer
            .set_condition(
                &mut other_writer,
                ConditionType::DurationsValid,
                ConditionStatus::True,
                ConditionReason::Defaulted,
                "defaulted",
            )
            .await;
        assert!(written.is_ok());

        let mut stale = original.clone();
        let result = synchronizer
            .set_condition(
                &mut stale,
                ConditionType::ResourcesCreated,
                ConditionStatus::True,
                ConditionReason::ResourcesCreated,
                "created",
            )
            .await;

        assert!(result.is_ok());
        let Some(stored) = cluster.request(original.key()).await else {
            panic!("request disappeared");
        };
        assert!(stored.status.conditions.is_true(ConditionType::DurationsValid));
        assert!(stored.status.conditions.is_true(ConditionType::ResourcesCreated));
        assert_eq!(stale.meta.resource_version, stored.meta.resource_version);
    }

    #[tokio::test]
    async fn stale_copy_updates_access_message() {
        let cluster = Arc::new(InMemoryCluster::new());
        let original = cluster.insert_request(exec_request("web", "alice-1", None)).await;
        let synchronizer = synchronizer(&cluster);

        let mut first = original.clone();
        first.status.access_message = Some("first".to_owned());
        assert!(synchronizer.update_status(&mut first).await.is_ok());

        let mut stale = original.clone();
        stale.status.access_message = Some("second".to_owned());
        assert!(synchronizer.update_status(&mut stale).await.is_ok());

        let stored = cluster.request(original.key()).await;
        assert_eq!(
            stored.and_then(|value| value.status.access_message),
            Some("second".to_owned())
        );
    }

    #[tokio::test]
    async fn stored_target_is_never_replaced() {
        let cluster = Arc::new(InMemoryCluster::new());
        let original = cluster.insert_request(exec_request("web", "alice-1", None)).await;
        let synchronizer = synchronizer(&cluster);

        let mut first = original.clone();
        first.status.assign_target("api-a");
        assert!(synchronizer.update_status(&mut first).await.is_ok());

        let mut same = original.clone();
        same.status.assign_target("api-a");
        assert!(synchronizer.update_status(&mut same).await.is_ok());

        let mut other = original.clone();
        other.status.assign_target("api-b");
        let result = synchronizer.update_status(&mut other).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        let stored = cluster.request(original.key()).await;
        assert_eq!(
            stored.and_then(|value| value.status.target().map(str::to_owned)),
            Some("api-a".to_owned())
        );
    }

    #[tokio::test]
    async fn write_racing_another_writer_fails_fast() {
        let cluster = Arc::new(InMemoryCluster::new());
        let mut request = cluster.insert_request(exec_request("web", "alice-1", None)).await;
        let synchronizer = StatusSynchronizer::new(
            Arc::new(ContendedRequests {
                cluster: cluster.clone(),
            }),
            Arc::new(FixedClock::default()),
        );

        let result = synchronizer
            .set_condition(
                &mut request,
                ConditionType::DurationsValid,
                ConditionStatus::True,
                ConditionReason::Defaulted,
                "defaulted",
            )
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(cluster.status_write_count().await, 0);
    }

    #[tokio::test]
    async fn unchanged_condition_skips_the_write() {
        let cluster = Arc::new(InMemoryCluster::new());
        let mut request = cluster.insert_request(exec_request("web", "alice-1", None)).await;
        let synchronizer = synchronizer(&cluster);

        for _ in 0..2 {
            let result = synchronizer
                .set_condition(
                    &mut request,
                    ConditionType::ResourcesReady,
                    ConditionStatus::True,
                    ConditionReason::ResourcesReady,
                    "ready",
                )
                .await;
            assert!(result.is_ok());
        }

        assert_eq!(cluster.status_write_count().await, 1);
    }

    #[tokio::test]
    async fn writes_to_a_deleted_request_are_not_found() {
        let cluster = Arc::new(InMemoryCluster::new());
        let mut request = exec_request("web", "ghost", None);

        let synchronizer = synchronizer(&cluster);
        let refetched = synchronizer.refetch_into(&mut request).await;
        let written = synchronizer
            .set_condition(
                &mut request,
                ConditionType::ResourcesReady,
                ConditionStatus::True,
                ConditionReason::ResourcesReady,
                "ready",
            )
            .await;

        assert!(matches!(refetched, Err(AppError::NotFound(_))));
        assert!(matches!(written, Err(AppError::NotFound(_))));
    }
}
