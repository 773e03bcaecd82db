//! `grantryctl create exec-access-request`.

use std::io::Write;
use std::sync::Arc;

use clap::Args;
use grantry_application::{AccessRequestService, WaitOutcome, WaitPolicy};
use grantry_core::{AppError, AppResult};
use grantry_domain::{AccessPhase, AccessRequest, GrantDuration, NewAccessRequest};
use grantry_infrastructure::KubeCluster;

/// Flags for creating an exec access request.
#[derive(Debug, Clone, Args)]
pub struct CreateExecArgs {
    /// Template to request access under.
    #[arg(short = 't', long)]
    pub template: String,

    /// Specific pod to exec into; must belong to the template's workload.
    #[arg(short = 'p', long)]
    pub target_pod: Option<String>,

    /// Requested duration, e.g. `30m` or `1h30m`.
    #[arg(short = 'D', long)]
    pub duration: Option<String>,

    /// Name prefix for the request object.
    #[arg(short = 'N', long, env = "USER")]
    pub request_name: Option<String>,

    /// How long to wait for the request to become ready.
    #[arg(long, default_value = "10s")]
    pub wait_time: String,

    /// Namespace of the template and the request.
    #[arg(short = 'n', long, default_value = "default")]
    pub namespace: String,
}

/// Validated, immutable settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateExecConfig {
    /// Request to submit.
    pub request: NewAccessRequest,
    /// Wait deadline and poll cadence.
    pub wait: WaitPolicy,
}

impl CreateExecArgs {
    /// Validates the flags and freezes them into a config value.
    pub fn to_config(&self) -> AppResult<CreateExecConfig> {
        let prefix = self
            .request_name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                AppError::Validation(
                    "--request-name is required when USER is not set".to_owned(),
                )
            })?;

        let wait_time = GrantDuration::parse(&self.wait_time).map_err(|error| {
            AppError::Validation(format!("invalid --wait-time '{}': {error}", self.wait_time))
        })?;

        let request = NewAccessRequest::exec(
            self.namespace.as_str(),
            prefix,
            self.template.as_str(),
            self.target_pod.clone(),
            self.duration.clone(),
        )?;

        Ok(CreateExecConfig {
            request,
            wait: WaitPolicy {
                timeout: wait_time.as_std(),
                ..WaitPolicy::default()
            },
        })
    }
}

/// Runs the command against the configured cluster.
///
/// Returns `false` when the request did not become ready in time.
pub async fn execute(args: &CreateExecArgs) -> AppResult<bool> {
    let config = args.to_config()?;
    let cluster = Arc::new(KubeCluster::try_default().await?);
    let service = AccessRequestService::new(cluster.clone(), cluster);

    run(&config, &service, &mut std::io::stdout()).await
}

/// Submits the request and waits for it, reporting progress to `out`.
pub async fn run<W>(
    config: &CreateExecConfig,
    service: &AccessRequestService,
    out: &mut W,
) -> AppResult<bool>
where
    W: Write + Send,
{
    let created = service.submit(config.request.clone()).await?;
    let key = created.key().clone();
    write_line(
        out,
        format!(
            "Created ExecAccessRequest {} in namespace {}",
            key.name(),
            key.namespace()
        ),
    )?;

    let mut last_phase = None;
    let mut progress_error = None;
    let outcome = service
        .wait_until_ready(&key, config.wait, |request| {
            let phase = request.phase();
            if last_phase == Some(phase) {
                return;
            }
            last_phase = Some(phase);
            if let Err(error) = write_line(out, format!("Waiting for access: {}", phase.as_str()))
                && progress_error.is_none()
            {
                progress_error = Some(error);
            }
        })
        .await?;
    if let Some(error) = progress_error {
        return Err(error);
    }

    match outcome {
        WaitOutcome::Ready(request) => {
            write_line(
                out,
                format!(
                    "Access ready on pod {}",
                    request.status.target().unwrap_or("<unassigned>")
                ),
            )?;
            if let Some(message) = request.status.access_message.as_deref() {
                write_line(out, message.to_owned())?;
            }
            Ok(true)
        }
        WaitOutcome::TimedOut(last_seen) => {
            write_line(
                out,
                format!(
                    "Timed out after {} waiting for {} to become ready",
                    GrantDuration::from_std(config.wait.timeout),
                    key
                ),
            )?;
            if let Some(request) = last_seen {
                write_conditions(out, &request)?;
            }
            Ok(false)
        }
    }
}

fn write_conditions<W: Write>(out: &mut W, request: &AccessRequest) -> AppResult<()> {
    if request.phase() == AccessPhase::Pending && request.status.conditions.is_empty() {
        return write_line(out, "No conditions reported; is the controller running?".to_owned());
    }

    for condition in request.status.conditions.iter() {
        write_line(
            out,
            format!(
                "  {}={} {}: {}",
                condition.condition_type.as_str(),
                condition.status.as_str(),
                condition.reason,
                condition.message
            ),
        )?;
    }

    Ok(())
}

fn write_line<W: Write>(out: &mut W, line: String) -> AppResult<()> {
    writeln!(out, "{line}")
        .map_err(|error| AppError::Internal(format!("failed to write output: {error}")))
}
