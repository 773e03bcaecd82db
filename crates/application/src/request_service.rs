use std::sync::Arc;
use std::time::Duration;

use grantry_core::{AppError, AppResult, ObjectKey};
use grantry_domain::{AccessRequest, GrantDuration, NewAccessRequest};
use tracing::info;

use crate::cluster_ports::{AccessRequestRepository, AccessTemplateRepository};

/// Deadline and cadence for waiting on a new request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Total time allowed before giving up.
    pub timeout: Duration,
    /// Delay between reads.
    pub poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The request reached the `Ready` phase.
    Ready(AccessRequest),
    /// The deadline fired first; carries the last observed request.
    TimedOut(Option<AccessRequest>),
}

/// Requester-side operations: submit a request and wait for it.
#[derive(Clone)]
pub struct AccessRequestService {
    requests: Arc<dyn AccessRequestRepository>,
    templates: Arc<dyn AccessTemplateRepository>,
}

impl AccessRequestService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        requests: Arc<dyn AccessRequestRepository>,
        templates: Arc<dyn AccessTemplateRepository>,
    ) -> Self {
        Self {
            requests,
            templates,
        }
    }

    /// Creates a request after checking that its template exists.
    ///
    /// A malformed duration is rejected here instead of surfacing later as
    /// an invalid-input condition.
    pub async fn submit(&self, input: NewAccessRequest) -> AppResult<AccessRequest> {
        let template_key = ObjectKey::new(input.namespace.as_str(), input.spec.template_name.as_str());
        if self.templates.find_template(&template_key).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "template '{}' not found in namespace '{}'",
                template_key.name(),
                template_key.namespace()
            )));
        }

        if let Some(duration) = input.spec.duration.as_deref() {
            GrantDuration::parse(duration)?;
        }

        let created = self.requests.create_request(input).await?;
        info!(
            namespace = %created.key().namespace(),
            name = %created.key().name(),
            template = %created.spec.template_name,
            "access request created"
        );

        Ok(created)
    }

    /// Polls the request until it is ready or the deadline fires.
    ///
    /// `on_poll` sees every observed copy, so callers can report progress.
    pub async fn wait_until_ready<F>(
        &self,
        key: &ObjectKey,
        policy: WaitPolicy,
        mut on_poll: F,
    ) -> AppResult<WaitOutcome>
    where
        F: FnMut(&AccessRequest) + Send,
    {
        let deadline = tokio::time::sleep(policy.timeout);
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval(policy.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_seen = None;

        loop {
            tokio::select! {
                () = &mut deadline => return Ok(WaitOutcome::TimedOut(last_seen)),
                _ = ticker.tick() => {
                    let request = self
                        .requests
                        .find_request(key)
                        .await?
                        .ok_or_else(|| AppError::NotFound(format!("access request '{key}'")))?;

                    on_poll(&request);
                    if request.is_ready() {
                        return Ok(WaitOutcome::Ready(request));
                    }
                    last_seen = Some(request);
                }
            }
        }
    }
}
