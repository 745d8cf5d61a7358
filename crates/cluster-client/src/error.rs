//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the control plane
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Admin kubeconfig is absent: the control plane has not been bootstrapped
    #[error("Control plane not initialized: {0} not found")]
    NotInitialized(String),

    /// Admin kubeconfig could not be loaded
    #[error("Kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// Kubernetes API request failed
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Control plane rejected a request (used by mocks and non-kube paths)
    #[error("API error: {0}")]
    Api(String),

    /// Host command exited non-zero
    #[error("Command failed with exit code {exit_code}: {output}")]
    CommandFailed { exit_code: i32, output: String },

    /// Host command succeeded but its output had an unexpected shape
    #[error("Unexpected command output ({reason}): {output}")]
    UnexpectedOutput { reason: String, output: String },

    /// Host command could not be run at all
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object is missing fields required to address it
    #[error("Invalid object: {0}")]
    InvalidObject(String),
}

/// Errors from running host commands
#[derive(Debug, Error)]
pub enum ExecError {
    /// The shell could not be started
    #[error("Failed to spawn command: {0}")]
    Spawn(#[source] std::io::Error),

    /// Waiting on or reading from the child failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output pipe was not captured
    #[error("Missing {0} pipe")]
    MissingPipe(&'static str),
}
