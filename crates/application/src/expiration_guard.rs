use std::sync::Arc;

use grantry_core::AppResult;
use grantry_domain::{
    AccessRequest, ConditionReason, ConditionStatus, ConditionType, ExpiryVerdict,
    GrantDuration, evaluate_expiry,
};
use tracing::{info, warn};

use crate::cluster_ports::AccessRequestRepository;
use crate::status_synchronizer::StatusSynchronizer;

/// Whether the pipeline may continue after a guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Access is still valid.
    Continue,
    /// The request was deleted; stop the pass.
    Deleted,
}

/// Deletes requests whose grant window has elapsed.
#[derive(Clone)]
pub struct ExpirationGuard {
    requests: Arc<dyn AccessRequestRepository>,
    status: StatusSynchronizer,
}

impl ExpirationGuard {
    /// Creates a guard.
    #[must_use]
    pub fn new(requests: Arc<dyn AccessRequestRepository>, status: StatusSynchronizer) -> Self {
        Self { requests, status }
    }

    /// Deletes the request when an earlier pass already marked it invalid.
    pub async fn precheck(&self, request: &AccessRequest) -> AppResult<GuardDecision> {
        if !request
            .status
            .conditions
            .is_false(ConditionType::AccessStillValid)
        {
            return Ok(GuardDecision::Continue);
        }

        info!(
            namespace = %request.key().namespace(),
            name = %request.key().name(),
            "access request already marked invalid, terminating"
        );
        self.delete(request).await?;
        Ok(GuardDecision::Deleted)
    }

    /// Compares request age with the resolved duration.
    ///
    /// An expired request gets `AccessStillValid=False` and is then deleted
    /// even when that status write fails.
    pub async fn enforce(
        &self,
        request: &mut AccessRequest,
        resolved: GrantDuration,
    ) -> AppResult<GuardDecision> {
        let now = self.status.clock().now();

        match evaluate_expiry(request.meta.created_at, resolved, now) {
            ExpiryVerdict::Expired { age } => {
                info!(
                    namespace = %request.key().namespace(),
                    name = %request.key().name(),
                    age = %age,
                    duration = %resolved,
                    "access request expired"
                );

                if let Err(error) = self
                    .status
                    .set_condition(
                        request,
                        ConditionType::AccessStillValid,
                        ConditionStatus::False,
                        ConditionReason::Expired,
                        format!("Access expired after {resolved} (age {age})"),
                    )
                    .await
                {
                    warn!(
                        namespace = %request.key().namespace(),
                        name = %request.key().name(),
                        error = %error,
                        "failed to record expiry before deletion"
                    );
                }

                self.delete(request).await?;
                Ok(GuardDecision::Deleted)
            }
            ExpiryVerdict::Valid { remaining } => {
                self.status
                    .set_condition(
                        request,
                        ConditionType::AccessStillValid,
                        ConditionStatus::True,
                        ConditionReason::StillValid,
                        format!("Access still valid, {remaining} remaining"),
                    )
                    .await?;
                Ok(GuardDecision::Continue)
            }
        }
    }

    async fn delete(&self, request: &AccessRequest) -> AppResult<()> {
        let deleted = self.requests.delete_request(request.key()).await?;
        if !deleted {
            info!(
                namespace = %request.key().namespace(),
                name = %request.key().name(),
                "access request already gone"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeDelta;
    use grantry_domain::{ConditionReason, ConditionStatus, ConditionType, GrantDuration};

    use crate::in_memory_cluster::InMemoryCluster;
    use crate::status_synchronizer::StatusSynchronizer;
    use crate::test_support::{FixedClock, exec_request};

    use super::{ExpirationGuard, GuardDecision};

    fn guard(cluster: &Arc<InMemoryCluster>, clock: &Arc<FixedClock>) -> ExpirationGuard {
        ExpirationGuard::new(
            cluster.clone(),
            StatusSynchronizer::new(cluster.clone(), clock.clone()),
        )
    }

    #[tokio::test]
    async fn expired_request_is_marked_then_deleted() {
        let cluster = Arc::new(InMemoryCluster::new());
        let clock = Arc::new(FixedClock::default());
        let mut request = cluster.insert_request(exec_request("web", "alice-1", None)).await;
        clock.advance(TimeDelta::minutes(31));

        let decision = guard(&cluster, &clock)
            .enforce(&mut request, GrantDuration::from_minutes(30))
            .await;

        assert_eq!(decision.ok(), Some(GuardDecision::Deleted));
        assert!(cluster.request(request.key()).await.is_none());

        let last_written = cluster.last_status_written(request.key()).await;
        let condition = last_written.and_then(|status| {
            status
                .conditions
                .get(ConditionType::AccessStillValid)
                .map(|value| (value.status, value.reason.clone()))
        });
        assert_eq!(
            condition,
            Some((ConditionStatus::False, "expired".to_owned()))
        );
    }

    #[tokio::test]
    async fn request_is_never_deleted_before_its_window_elapses() {
        let cluster = Arc::new(InMemoryCluster::new());
        let clock = Arc::new(FixedClock::default());
        let mut request = cluster.insert_request(exec_request("web", "alice-1", None)).await;
        let guard = guard(&cluster, &clock);

        for minute in [0, 10, 29, 30] {
            clock.set_offset(TimeDelta::minutes(minute));
            let decision = guard
                .enforce(&mut request, GrantDuration::from_minutes(30))
                .await;
            assert_eq!(decision.ok(), Some(GuardDecision::Continue));
        }

        clock.set_offset(TimeDelta::minutes(30) + TimeDelta::seconds(1));
        let decision = guard
            .enforce(&mut request, GrantDuration::from_minutes(30))
            .await;
        assert_eq!(decision.ok(), Some(GuardDecision::Deleted));
    }

    #[tokio::test]
    async fn valid_request_reports_remaining_time() {
        let cluster = Arc::new(InMemoryCluster::new());
        let clock = Arc::new(FixedClock::default());
        let mut request = cluster.insert_request(exec_request("web", "alice-1", None)).await;
        clock.advance(TimeDelta::minutes(10));

        let decision = guard(&cluster, &clock)
            .enforce(&mut request, GrantDuration::from_minutes(30))
            .await;

        assert_eq!(decision.ok(), Some(GuardDecision::Continue));
        let message = request
            .status
            .conditions
            .get(ConditionType::AccessStillValid)
            .map(|value| value.message.clone());
        assert_eq!(
            message.as_deref(),
            Some("Access still valid, 20m0s remaining")
        );
    }

    #[tokio::test]
    async fn precheck_deletes_requests_already_marked_invalid() {
        let cluster = Arc::new(InMemoryCluster::new());
        let clock = Arc::new(FixedClock::default());
        let mut request = exec_request("web", "alice-1", None);
        request.status.conditions.set(
            ConditionType::AccessStillValid,
            ConditionStatus::False,
            ConditionReason::Expired,
            "expired",
            clock.current(),
        );
        let request = cluster.insert_request(request).await;

        let decision = guard(&cluster, &clock).precheck(&request).await;

        assert_eq!(decision.ok(), Some(GuardDecision::Deleted));
        assert!(cluster.request(request.key()).await.is_none());
    }

    #[tokio::test]
    async fn precheck_is_idempotent_when_request_is_gone() {
        let cluster = Arc::new(InMemoryCluster::new());
        let clock = Arc::new(FixedClock::default());
        let mut request = exec_request("web", "alice-1", None);
        request.status.conditions.set(
            ConditionType::AccessStillValid,
            ConditionStatus::False,
            ConditionReason::Expired,
            "expired",
            clock.current(),
        );

        let decision = guard(&cluster, &clock).precheck(&request).await;
        assert_eq!(decision.ok(), Some(GuardDecision::Deleted));
    }

    #[tokio::test]
    async fn precheck_leaves_valid_requests_alone() {
        let cluster = Arc::new(InMemoryCluster::new());
        let clock = Arc::new(FixedClock::default());
        let request = cluster.insert_request(exec_request("web", "alice-1", None)).await;

        let decision = guard(&cluster, &clock).precheck(&request).await;

        assert_eq!(decision.ok(), Some(GuardDecision::Continue));
        assert!(cluster.request(request.key()).await.is_some());
    }
}
