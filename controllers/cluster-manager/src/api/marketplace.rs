//! Marketplace: catalog overview and application installs

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::Deserialize;

use gitops::{DeployError, MarketplaceOverview};

use super::{json_body, ActionStatus};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRequest {
    app_key: String,
}

pub async fn overview(State(state): State<AppState>) -> Result<Json<MarketplaceOverview>, ApiError> {
    Ok(Json(state.deployments.marketplace().await?))
}

pub async fn install_flux(State(state): State<AppState>) -> Json<ActionStatus> {
    match state.deployments.install_toolkit().await {
        Ok(_) => Json(ActionStatus::ok()),
        Err(e) => Json(ActionStatus::failed(e)),
    }
}

pub async fn install_app(
    State(state): State<AppState>,
    payload: Result<Json<AppRequest>, JsonRejection>,
) -> Result<Json<ActionStatus>, ApiError> {
    let request = json_body(payload)?;
    reply(state.deployments.install(&request.app_key).await)
}

pub async fn uninstall_app(
    State(state): State<AppState>,
    payload: Result<Json<AppRequest>, JsonRejection>,
) -> Result<Json<ActionStatus>, ApiError> {
    let request = json_body(payload)?;
    reply(state.deployments.uninstall(&request.app_key).await)
}

/// Unknown keys are a bad request; anything else is reported in-band
fn reply(result: Result<(), DeployError>) -> Result<Json<ActionStatus>, ApiError> {
    match result {
        Ok(()) => Ok(Json(ActionStatus::ok())),
        Err(e @ DeployError::UnknownApp(_)) => Err(e.into()),
        Err(e) => Ok(Json(ActionStatus::failed(e))),
    }
}
