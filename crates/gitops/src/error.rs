//! GitOps errors

use std::path::PathBuf;

use thiserror::Error;

use cluster_client::{ClusterError, ExecError};

/// Errors loading or validating the application catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Catalog file could not be read
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Catalog is not valid YAML for the expected shape
    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// An entry is missing a required field or has a bad key
    #[error("Invalid catalog entry '{key}': {reason}")]
    InvalidEntry { key: String, reason: String },

    /// An entry depends on a key that does not exist
    #[error("Catalog entry '{key}' depends on unknown entry '{dependency}'")]
    UnknownDependency { key: String, dependency: String },

    /// Dependencies loop back on themselves
    #[error("Catalog dependency cycle involving '{0}'")]
    DependencyCycle(String),
}

/// Errors from marketplace deployments
#[derive(Debug, Error)]
pub enum DeployError {
    /// Key is not in the catalog
    #[error("Unknown application: {0}")]
    UnknownApp(String),

    /// Dependency must be installed first
    #[error("Application '{app}' requires '{dependency}' to be installed first")]
    DependencyUnmet { app: String, dependency: String },

    /// Flux is not installed in the cluster
    #[error("GitOps toolkit is not installed")]
    ToolkitMissing,

    /// Control plane rejected or failed a request
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Host command could not be run
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Host command exited non-zero
    #[error("Command failed with exit code {exit_code}: {output}")]
    CommandFailed { exit_code: i32, output: String },
}

/// Errors from GitOps source management
#[derive(Debug, Error)]
pub enum GitOpsError {
    /// Name is not a DNS-1123 subdomain
    #[error("Invalid {field} '{value}': must be a lowercase DNS-1123 name")]
    InvalidName { field: &'static str, value: String },

    /// Required field is empty
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// Control plane rejected or failed a request
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),
}
