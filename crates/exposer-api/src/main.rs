//! VICE app exposer server

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kube::Client;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use exposer_admission::{
    AdmissionController, DeploymentListerImpl, NatsQuotaClient, PgAnalysisStatusStore,
    PgJobLimitStore, RunningJobCounter,
};
use exposer_api::{serve, AppState, Config, PgInstantLaunchStore};
use exposer_common::telemetry::{init_telemetry, TelemetryConfig};
use exposer_workload::{Reconciler, WorkloadCompiler, WorkloadKubeClientImpl};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    init_telemetry(TelemetryConfig {
        service_name: "app-exposer".to_string(),
        format: config.log_format,
    })?;

    let identifier = config.path_list_identifier();
    identifier
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid path list identifier: {e}"))?;

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;

    let nats = async_nats::connect(config.nats_url.as_str())
        .await
        .with_context(|| format!("failed to connect to NATS at {}", config.nats_url))?;

    let counter = RunningJobCounter::new(
        Arc::new(DeploymentListerImpl::new(client.clone())),
        Arc::new(PgAnalysisStatusStore::new(pool.clone())),
        config.namespace.clone(),
    );
    let admission = AdmissionController::new(
        counter,
        Arc::new(PgJobLimitStore::new(pool.clone())),
        Arc::new(
            NatsQuotaClient::new(nats, config.quota_timeout())
                .with_subject(config.quota_subject.clone()),
        ),
    )
    .with_user_domain(config.user_domain.clone());

    let state = AppState {
        admission,
        compiler: Arc::new(WorkloadCompiler::new(
            config.namespace.clone(),
            config.stager_image(),
            identifier,
        )),
        reconciler: Reconciler::new(Arc::new(WorkloadKubeClientImpl::new(client))),
        instant_launches: Arc::new(PgInstantLaunchStore::new(pool)),
    };

    info!(
        namespace = %config.namespace,
        stager = %config.stager_image().reference(),
        "starting app-exposer"
    );
    serve(config.listen, state).await?;
    Ok(())
}
