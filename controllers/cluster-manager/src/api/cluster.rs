//! Control plane bootstrap, nodes and worker onboarding

use std::convert::Infallible;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use cluster_client::NodeSummary;
use provisioner::{render_with, ArtifactFormat, BootstrapEvent, JobOutcome, OsFamily, OsInfo};

use super::ActionStatus;
use crate::error::ApiError;
use crate::state::AppState;

pub const INSTALL_COMPLETE: &str = "Installation Complete";
pub const INSTALL_FAILED: &str = "Installation Failed";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    is_ready: bool,
    os_info: OsInfo,
}

pub async fn init(State(state): State<AppState>) -> Json<InitResponse> {
    Json(InitResponse {
        is_ready: state.control_plane.is_initialized().await,
        os_info: OsInfo::from(state.os_release.as_ref()),
    })
}

pub async fn nodes(State(state): State<AppState>) -> Result<Json<Vec<NodeSummary>>, ApiError> {
    Ok(Json(state.control_plane.list_nodes().await?))
}

pub async fn delete_node(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ActionStatus>, ApiError> {
    state.control_plane.delete_node(&name).await?;
    info!(node = %name, "Deleted node");
    Ok(Json(ActionStatus::ok()))
}

/// Start `kubeadm init` on this host and stream its progress as plain text.
///
/// The job keeps running if the client disconnects.
pub async fn install_master(State(state): State<AppState>) -> Result<Response, ApiError> {
    if state.control_plane.is_initialized().await {
        return Err(ApiError::conflict("Control plane is already initialized"));
    }
    let job = state.orchestrator.initialize_control_plane()?;
    info!(family = %job.family(), steps = job.steps().len(), "Streaming control plane bootstrap");

    let lines = ReceiverStream::new(job.into_events())
        .map(|event| Ok::<_, Infallible>(render_event(&event)));

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(lines),
    )
        .into_response())
}

/// Text form of one progress event
pub fn render_event(event: &BootstrapEvent) -> String {
    match event {
        BootstrapEvent::StepStarted { index, total, name } => {
            format!("==> [{}/{}] {}\n", index + 1, total, name)
        }
        BootstrapEvent::Output(line) => format!("{line}\n"),
        BootstrapEvent::StepFinished { name, exit_code, .. } if *exit_code != 0 => {
            format!("!!! {name} exited with code {exit_code}\n")
        }
        BootstrapEvent::StepFinished { .. } => String::new(),
        BootstrapEvent::Finished(JobOutcome::Succeeded) => format!("{INSTALL_COMPLETE}\n"),
        BootstrapEvent::Finished(JobOutcome::Failed { failed_steps }) => {
            format!("{INSTALL_FAILED}: {}\n", failed_steps.join(", "))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadParams {
    #[serde(rename = "type")]
    format: Option<String>,
    os: Option<String>,
}

/// Mint a join token and return a worker setup artifact
pub async fn download_worker(
    State(state): State<AppState>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, ApiError> {
    let format: ArtifactFormat = params.format.as_deref().unwrap_or("sh").parse()?;
    let family: OsFamily = params.os.as_deref().unwrap_or("debian").parse()?;
    debug!(%format, %family, "Worker artifact requested");

    let record = state.broker.issue_join_record().await?;
    let artifact = render_with(&state.install, &record, family, format)?;
    info!(%format, %family, endpoint = %record.master_address(), "Issued worker artifact");

    Ok((
        [
            (header::CONTENT_TYPE, artifact.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", artifact.filename),
            ),
        ],
        artifact.bytes,
    )
        .into_response())
}
