use grantry_core::AppResult;
use grantry_domain::{
    AccessRequest, AccessTemplate, ConditionReason, ConditionStatus, ConditionType,
    DurationSource, GrantDuration, resolve_duration,
};
use tracing::{info, warn};

use crate::status_synchronizer::StatusSynchronizer;

/// Resolves a request's grant duration against its template and records the
/// decision on the `DurationsValid` condition.
#[derive(Clone)]
pub struct DurationPolicyResolver {
    status: StatusSynchronizer,
}

impl DurationPolicyResolver {
    /// Creates a resolver writing through the given synchronizer.
    #[must_use]
    pub fn new(status: StatusSynchronizer) -> Self {
        Self { status }
    }

    /// Returns the resolved duration, or a validation error after marking
    /// `DurationsValid=False` with the offending field in the message.
    pub async fn resolve(
        &self,
        request: &mut AccessRequest,
        template: &AccessTemplate,
    ) -> AppResult<GrantDuration> {
        let access_config = template.access_config();
        let resolution = match resolve_duration(
            request.spec.duration.as_deref(),
            access_config.default_duration.as_str(),
            access_config.max_duration.as_str(),
        ) {
            Ok(resolution) => resolution,
            Err(invalid) => {
                warn!(
                    namespace = %request.key().namespace(),
                    name = %request.key().name(),
                    error = %invalid,
                    "access request durations invalid"
                );
                // Best effort; the validation error is returned either way.
                let _ = self
                    .status
                    .set_condition(
                        request,
                        ConditionType::DurationsValid,
                        ConditionStatus::False,
                        ConditionReason::InvalidDuration,
                        invalid.to_string(),
                    )
                    .await;
                return Err(invalid.into());
            }
        };

        info!(
            namespace = %request.key().namespace(),
            name = %request.key().name(),
            duration = %resolution.duration,
            "{}",
            resolution.justification
        );

        self.status
            .set_condition(
                request,
                ConditionType::DurationsValid,
                ConditionStatus::True,
                reason_for(resolution.source),
                resolution.justification,
            )
            .await?;

        Ok(resolution.duration)
    }
}

fn reason_for(source: DurationSource) -> ConditionReason {
    match source {
        DurationSource::TemplateDefault => ConditionReason::Defaulted,
        DurationSource::Requested => ConditionReason::CustomDurationAccepted,
        DurationSource::ClampedToMaximum => ConditionReason::ClampedToMaximum,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use grantry_core::AppError;
    use grantry_domain::{ConditionStatus, ConditionType, GrantDuration};

    use crate::in_memory_cluster::InMemoryCluster;
    use crate::status_synchronizer::StatusSynchronizer;
    use crate::test_support::{FixedClock, exec_request, exec_template};

    use super::DurationPolicyResolver;

    async fn resolve_with(
        requested: Option<&str>,
        default: &str,
        max: &str,
    ) -> (
        Result<GrantDuration, AppError>,
        Option<grantry_domain::Condition>,
    ) {
        let cluster = Arc::new(InMemoryCluster::new());
        let mut request = cluster
            .insert_request(exec_request("web", "alice-1", requested))
            .await;
        let template = exec_template("web", "shell", default, max);
        let resolver = DurationPolicyResolver::new(StatusSynchronizer::new(
            cluster.clone(),
            Arc::new(FixedClock::default()),
        ));

        let result = resolver.resolve(&mut request, &template).await;
        let stored = cluster
            .request(request.key())
            .await
            .and_then(|value| {
                value
                    .status
                    .conditions
                    .get(ConditionType::DurationsValid)
                    .cloned()
            });
        (result, stored)
    }

    #[tokio::test]
    async fn unset_duration_defaults_to_template() {
        let (result, condition) = resolve_with(None, "30m", "2h").await;

        assert_eq!(result.ok(), Some(GrantDuration::from_minutes(30)));
        let condition = condition.map(|value| (value.status, value.reason));
        assert_eq!(
            condition,
            Some((ConditionStatus::True, "defaulted".to_owned()))
        );
    }

    #[tokio::test]
    async fn custom_duration_under_maximum_is_accepted() {
        let (result, condition) = resolve_with(Some("45m"), "30m", "2h").await;

        assert_eq!(result.ok(), Some(GrantDuration::from_minutes(45)));
        assert_eq!(
            condition.map(|value| value.reason),
            Some("custom-duration-accepted".to_owned())
        );
    }

    #[tokio::test]
    async fn long_duration_is_clamped() {
        let (result, condition) = resolve_with(Some("5h"), "30m", "2h").await;

        assert_eq!(result.ok(), Some(GrantDuration::from_hours(2)));
        assert_eq!(
            condition.map(|value| value.reason),
            Some("clamped-to-maximum".to_owned())
        );
    }

    #[tokio::test]
    async fn malformed_template_maximum_marks_durations_invalid() {
        let (result, condition) = resolve_with(Some("1h"), "30m", "two hours").await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        let condition = condition.map(|value| (value.status, value.message));
        assert!(matches!(
            condition,
            Some((ConditionStatus::False, message)) if message.contains("maxDuration")
        ));
    }

    #[tokio::test]
    async fn malformed_request_duration_names_spec_field() {
        let (result, condition) = resolve_with(Some("soon"), "30m", "2h").await;

        assert!(result.is_err());
        assert!(
            condition
                .map(|value| value.message.starts_with("spec.duration"))
                .unwrap_or(false)
        );
    }
}
