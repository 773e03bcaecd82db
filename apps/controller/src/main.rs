//! Grantry access request controller.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use grantry_application::{AccessRequestReconciler, ClusterPorts, ReconcilerSettings, SystemClock};
use grantry_core::{AppError, AppResult};
use grantry_domain::GrantDuration;
use grantry_infrastructure::{AccessRequestController, ControllerSettings, KubeCluster};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ControllerConfig {
    watch_namespace: Option<String>,
    workers: u16,
    requeue_interval: Duration,
    error_requeue_interval: Duration,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ControllerConfig::load()?;
    let cluster = Arc::new(KubeCluster::try_default().await?);

    let reconciler =
        AccessRequestReconciler::new(ClusterPorts::from_adapter(cluster.clone()), Arc::new(SystemClock))
            .with_settings(ReconcilerSettings {
                requeue_interval: config.requeue_interval,
            });
    let controller = AccessRequestController::new(
        cluster.client(),
        reconciler,
        ControllerSettings {
            namespace: config.watch_namespace.clone(),
            concurrency: config.workers,
            error_requeue_interval: config.error_requeue_interval,
        },
    );

    info!(
        namespace = config.watch_namespace.as_deref().unwrap_or("*"),
        workers = config.workers,
        requeue_interval = %GrantDuration::from_std(config.requeue_interval),
        "grantry-controller started"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "failed to listen for shutdown signal");
        }
        let _ = shutdown_tx.send(true);
    });

    controller.run(shutdown_rx).await?;
    info!("grantry-controller stopped");

    Ok(())
}

impl ControllerConfig {
    fn load() -> AppResult<Self> {
        Self::from_lookup(&|name| env::var(name).ok())
    }

    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> AppResult<Self> {
        let watch_namespace = lookup("WATCH_NAMESPACE")
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let workers = parse_env_u16(lookup, "CONTROLLER_WORKERS", 4)?;
        let requeue_interval =
            parse_env_duration(lookup, "CONTROLLER_REQUEUE_INTERVAL", Duration::from_secs(60))?;
        let error_requeue_interval = parse_env_duration(
            lookup,
            "CONTROLLER_ERROR_REQUEUE_INTERVAL",
            Duration::from_secs(15),
        )?;

        if workers == 0 {
            return Err(AppError::Validation(
                "CONTROLLER_WORKERS must be greater than zero".to_owned(),
            ));
        }

        for (name, value) in [
            ("CONTROLLER_REQUEUE_INTERVAL", requeue_interval),
            ("CONTROLLER_ERROR_REQUEUE_INTERVAL", error_requeue_interval),
        ] {
            if value.is_zero() {
                return Err(AppError::Validation(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        Ok(Self {
            watch_namespace,
            workers,
            requeue_interval,
            error_requeue_interval,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn parse_env_u16(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &str,
    default: u16,
) -> AppResult<u16> {
    match lookup(name) {
        Some(value) => value.parse::<u16>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn parse_env_duration(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &str,
    default: Duration,
) -> AppResult<Duration> {
    match lookup(name) {
        Some(value) => GrantDuration::parse(&value)
            .map(|duration| duration.as_std())
            .map_err(|error| {
                AppError::Validation(format!("invalid {name} value '{value}': {error}"))
            }),
        None => Ok(default),
    }
}
