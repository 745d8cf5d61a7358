//! Manager error types and HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use cluster_client::ClusterError;
use gitops::{CatalogError, DeployError, GitOpsError};
use provisioner::{BootstrapError, JoinError, UnknownValue};

/// Errors that stop the manager from starting or serving.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Application catalog could not be loaded
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Error returned by HTTP handlers, rendered as a JSON envelope
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    ServiceUnavailable(String),
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEnvelope {
    request_id: String,
    error: ErrorBody,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn parts(self) -> (&'static str, String) {
        match self {
            Self::BadRequest(m) => ("invalid_argument", m),
            Self::NotFound(m) => ("not_found", m),
            Self::Conflict(m) => ("conflict", m),
            Self::ServiceUnavailable(m) => ("not_ready", m),
            Self::Internal(m) => ("internal", m),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = self.parts();
        let request_id = uuid::Uuid::new_v4().to_string();
        if status.is_server_error() {
            error!(%request_id, %code, "{}", message);
        } else {
            warn!(%request_id, %code, "{}", message);
        }
        let body = ErrorEnvelope {
            request_id,
            error: ErrorBody { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<ClusterError> for ApiError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::NotInitialized(_) => Self::ServiceUnavailable(err.to_string()),
            ClusterError::NotFound(_) => Self::NotFound(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        match err {
            JoinError::NotReadyYet => Self::ServiceUnavailable(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<BootstrapError> for ApiError {
    fn from(err: BootstrapError) -> Self {
        match err {
            BootstrapError::ConcurrencyConflict => Self::Conflict(err.to_string()),
        }
    }
}

impl From<UnknownValue> for ApiError {
    fn from(err: UnknownValue) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<GitOpsError> for ApiError {
    fn from(err: GitOpsError) -> Self {
        match err {
            GitOpsError::InvalidName { .. } | GitOpsError::EmptyField(_) => {
                Self::BadRequest(err.to_string())
            }
            GitOpsError::Cluster(e) => e.into(),
        }
    }
}

impl From<DeployError> for ApiError {
    fn from(err: DeployError) -> Self {
        match err {
            DeployError::UnknownApp(_) => Self::BadRequest(err.to_string()),
            DeployError::Cluster(e) => e.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<provisioner::WorkerScriptError> for ApiError {
    fn from(err: provisioner::WorkerScriptError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::from(JoinError::NotReadyYet).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::from(JoinError::ParseFailure {
                reason: "missing --token".to_string(),
                raw: "kubeadm join".to_string(),
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(BootstrapError::ConcurrencyConflict).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(GitOpsError::EmptyField("url")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ClusterError::NotFound("node worker-1".to_string())).status(),
            StatusCode::NOT_FOUND
        );
    }
}
