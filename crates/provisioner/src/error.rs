//! Provisioner errors

use thiserror::Error;

use cluster_client::ClusterError;

/// Errors starting a bootstrap job
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Another bootstrap job is still running on this host
    #[error("A control plane bootstrap is already in progress")]
    ConcurrencyConflict,
}

/// Errors issuing a join record
#[derive(Debug, Error)]
pub enum JoinError {
    /// Control plane has not been initialized; nothing can issue tokens yet
    #[error("Control plane is not initialized yet")]
    NotReadyYet,

    /// `kubeadm token create` exited non-zero
    #[error("Token creation failed with exit code {exit_code}: {transcript}")]
    CommandFailure { exit_code: i32, transcript: String },

    /// Join command did not have the expected shape
    #[error("Could not parse join command ({reason}): {raw}")]
    ParseFailure { reason: String, raw: String },

    /// Control plane could not be reached
    #[error("Control plane error: {0}")]
    ControlPlane(ClusterError),
}

impl From<ClusterError> for JoinError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::CommandFailed { exit_code, output } => JoinError::CommandFailure {
                exit_code,
                transcript: output,
            },
            ClusterError::UnexpectedOutput { reason, output } => JoinError::ParseFailure {
                reason,
                raw: output,
            },
            ClusterError::NotInitialized(_) => JoinError::NotReadyYet,
            other => JoinError::ControlPlane(other),
        }
    }
}

/// Join record field validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinRecordError {
    /// Endpoint is not `host:port`
    #[error("Invalid API server endpoint: {0}")]
    InvalidEndpoint(String),

    /// Token does not match `[a-z0-9]{6}.[a-z0-9]{16}`
    #[error("Invalid bootstrap token format")]
    InvalidToken,

    /// Hash is not 64 lowercase hex digits (optionally `sha256:` prefixed)
    #[error("Invalid CA certificate hash: {0}")]
    InvalidCaCertHash(String),
}

/// Errors rendering worker artifacts
#[derive(Debug, Error)]
pub enum WorkerScriptError {
    /// YAML serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),
}

/// A request parameter outside its allowed set
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown {kind} '{value}', expected one of: {expected}")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}
