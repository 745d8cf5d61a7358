//! HTTP API
//!
//! All routes live under `/api` and speak camelCase JSON, except the
//! bootstrap progress stream (`text/plain`) and worker artifact downloads.

mod cluster;
mod sources;
mod marketplace;


use std::fmt::Display;

use axum::extract::rejection::JsonRejection;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/init", get(cluster::init))
        .route("/nodes", get(cluster::nodes))
        .route("/nodes/{name}", delete(cluster::delete_node))
        .route("/install-master", post(cluster::install_master))
        .route("/download-worker", get(cluster::download_worker))
        .route("/marketplace", get(marketplace::overview))
        .route("/install-flux", post(marketplace::install_flux))
        .route("/install-app", post(marketplace::install_app))
        .route("/uninstall-app", post(marketplace::uninstall_app))
        .route("/git-sources", get(sources::sources))
        .route("/kustomizations", get(sources::kustomizations))
        .route("/create-source", post(sources::create_source))
        .route("/create-kust", post(sources::create_kustomization))
        .route("/sync-kust", post(sources::sync_kustomization));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `{status: "ok"}` or `{status: "error", error}` for actions whose
/// external failures are reported in-band
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionStatus {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
        }
    }

    pub fn failed(error: impl Display) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(error.to_string()),
        }
    }
}

/// Malformed bodies are a 400, not axum's default 422
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}
