//! VICE launch endpoint

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use exposer_admission::AdmissionDecision;
use exposer_common::Job;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::server::AppState;

/// Body returned for an accepted launch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchResponse {
    /// Invocation id of the launched job
    pub invocation_id: String,
}

/// `POST /vice/launch`
///
/// Admission, compilation and reconciliation run in sequence. The
/// admission reservation is held until reconciliation returns.
pub async fn launch_handler(
    State(state): State<AppState>,
    body: Result<Json<Job>, JsonRejection>,
) -> Result<Json<LaunchResponse>, ApiError> {
    let Json(job) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    launch(&state, &job).await
}

#[instrument(skip(state, job), fields(invocation = %job.invocation_id, user = %job.submitter))]
async fn launch(state: &AppState, job: &Job) -> Result<Json<LaunchResponse>, ApiError> {
    let (decision, _reservation) = state.admission.admit(job).await?.into_parts();
    if let AdmissionDecision::Denied(resp) = decision {
        return Err(ApiError::Denied(resp));
    }

    let compiled = state.compiler.compile(job)?;
    let report = state.reconciler.reconcile(&compiled).await?;

    info!(objects = report.applied.len(), "launch provisioned");
    Ok(Json(LaunchResponse {
        invocation_id: job.invocation_id.clone(),
    }))
}
