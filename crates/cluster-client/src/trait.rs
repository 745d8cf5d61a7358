//! ControlPlane trait for mocking
//!
//! This trait abstracts the cluster API so the provisioning and GitOps logic
//! can be tested without a running cluster.

use crds::{GitRepository, Kustomization, ReleaseManifest};

use crate::error::ClusterError;
use crate::models::NodeSummary;

/// Trait for control plane operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ControlPlane: Send + Sync {
    /// Whether the admin credential written by `kubeadm init` exists
    async fn is_initialized(&self) -> bool;

    // Nodes
    async fn list_nodes(&self) -> Result<Vec<NodeSummary>, ClusterError>;
    async fn delete_node(&self, name: &str) -> Result<(), ClusterError>;

    /// Mint a fresh bootstrap token and return the raw `kubeadm join ...` line
    async fn print_join_command(&self) -> Result<String, ClusterError>;

    // Flux
    /// Whether the Flux source CRDs are registered
    async fn gitops_installed(&self) -> Result<bool, ClusterError>;
    async fn list_helm_releases(&self, namespace: &str) -> Result<Vec<String>, ClusterError>;
    async fn apply_release(&self, manifest: &ReleaseManifest) -> Result<(), ClusterError>;
    /// Delete a HelmRelease if present. Returns whether it existed.
    async fn delete_helm_release(&self, namespace: &str, name: &str) -> Result<bool, ClusterError>;
    async fn apply_git_repository(&self, source: &GitRepository) -> Result<(), ClusterError>;
    async fn apply_kustomization(&self, kustomization: &Kustomization) -> Result<(), ClusterError>;
    async fn list_git_repositories(&self, namespace: &str) -> Result<Vec<GitRepository>, ClusterError>;
    async fn list_kustomizations(&self, namespace: &str) -> Result<Vec<Kustomization>, ClusterError>;
    /// Stamp the reconcile-request annotation on a Kustomization.
    /// Fails with [`ClusterError::NotFound`] if it does not exist.
    async fn request_reconcile(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    // Services
    /// First allocated node port of a service, `None` if the service or port is absent
    async fn service_node_port(&self, namespace: &str, service: &str) -> Result<Option<u16>, ClusterError>;
}
