//! Git sources and Kustomizations

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::Deserialize;

use gitops::{GitOpsError, KustomizationSummary, SourceSummary, SyncOutcome};

use super::{json_body, ActionStatus};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSource {
    name: String,
    url: String,
    branch: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateKustomization {
    name: String,
    source: String,
    path: String,
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    name: String,
}

pub async fn sources(State(state): State<AppState>) -> Result<Json<Vec<SourceSummary>>, ApiError> {
    Ok(Json(state.gitops.list_sources().await?))
}

pub async fn kustomizations(
    State(state): State<AppState>,
) -> Result<Json<Vec<KustomizationSummary>>, ApiError> {
    Ok(Json(state.gitops.list_kustomizations().await?))
}

pub async fn create_source(
    State(state): State<AppState>,
    payload: Result<Json<CreateSource>, JsonRejection>,
) -> Result<Json<ActionStatus>, ApiError> {
    let request = json_body(payload)?;
    reply(
        state
            .gitops
            .create_source(&request.name, &request.url, &request.branch)
            .await,
    )
}

pub async fn create_kustomization(
    State(state): State<AppState>,
    payload: Result<Json<CreateKustomization>, JsonRejection>,
) -> Result<Json<ActionStatus>, ApiError> {
    let request = json_body(payload)?;
    reply(
        state
            .gitops
            .create_kustomization(&request.name, &request.source, &request.path)
            .await,
    )
}

pub async fn sync_kustomization(
    State(state): State<AppState>,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<ActionStatus>, ApiError> {
    let request = json_body(payload)?;
    match state.gitops.sync(&request.name).await {
        Ok(SyncOutcome::Requested) => Ok(Json(ActionStatus::ok())),
        Ok(SyncOutcome::NotFound) => Ok(Json(ActionStatus::failed(format!(
            "Kustomization '{}' not found",
            request.name
        )))),
        Err(e) => reply(Err(e)),
    }
}

/// Input errors are a bad request; cluster failures are reported in-band
fn reply(result: Result<(), GitOpsError>) -> Result<Json<ActionStatus>, ApiError> {
    match result {
        Ok(()) => Ok(Json(ActionStatus::ok())),
        Err(e @ (GitOpsError::InvalidName { .. } | GitOpsError::EmptyField(_))) => Err(e.into()),
        Err(e) => Ok(Json(ActionStatus::failed(e))),
    }
}
