//! Kubernetes-backed control plane
//!
//! The manager starts before the cluster exists, so the kube client is built
//! lazily from the admin kubeconfig on first use.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Node, Service};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::NamespaceResourceScope;
use kube::{Client, Config, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crds::{
    GitRepository, HelmRelease, Kustomization, ReleaseManifest, FLUX_SOURCE_CRD,
    RECONCILE_REQUEST_ANNOTATION,
};

use crate::control_plane_trait::ControlPlane;
use crate::error::ClusterError;
use crate::exec::{shell_quote, CommandExecutor};
use crate::models::{NodeRole, NodeStatus, NodeSummary};

/// Field manager recorded on every server-side apply
pub const FIELD_MANAGER: &str = "kubestead";

const CONTROL_PLANE_LABELS: [&str; 2] = [
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
];

/// [`ControlPlane`] implementation using kube-rs and the local kubeadm binary
pub struct KubeControlPlane {
    admin_kubeconfig: PathBuf,
    executor: Arc<dyn CommandExecutor>,
    client: OnceCell<Client>,
}

impl KubeControlPlane {
    /// Create a control plane adapter
    ///
    /// # Arguments
    /// * `admin_kubeconfig` - Path written by `kubeadm init` (e.g., "/etc/kubernetes/admin.conf")
    /// * `executor` - Used to invoke kubeadm
    pub fn new(admin_kubeconfig: impl AsRef<Path>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            admin_kubeconfig: admin_kubeconfig.as_ref().to_path_buf(),
            executor,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<Client, ClusterError> {
        let client = self
            .client
            .get_or_try_init(|| async {
                if !self.is_initialized().await {
                    return Err(ClusterError::NotInitialized(
                        self.admin_kubeconfig.display().to_string(),
                    ));
                }
                info!("Connecting to control plane using {}", self.admin_kubeconfig.display());
                let kubeconfig = Kubeconfig::read_from(&self.admin_kubeconfig)?;
                let config =
                    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
                Ok(Client::try_from(config)?)
            })
            .await?;
        Ok(client.clone())
    }

    async fn server_side_apply<K>(&self, object: &K) -> Result<(), ClusterError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned,
        K::DynamicType: Default,
    {
        let meta = object.meta();
        let name = meta
            .name
            .as_deref()
            .ok_or_else(|| ClusterError::InvalidObject("metadata.name is required".to_string()))?;
        let namespace = meta
            .namespace
            .as_deref()
            .ok_or_else(|| ClusterError::InvalidObject(format!("{name}: metadata.namespace is required")))?;

        debug!(kind = %K::kind(&K::DynamicType::default()), %namespace, %name, "Server-side apply");
        let api: Api<K> = Api::namespaced(self.client().await?, namespace);
        api.patch(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(object))
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ControlPlane for KubeControlPlane {
    async fn is_initialized(&self) -> bool {
        tokio::fs::try_exists(&self.admin_kubeconfig)
            .await
            .unwrap_or(false)
    }

    async fn list_nodes(&self) -> Result<Vec<NodeSummary>, ClusterError> {
        let api: Api<Node> = Api::all(self.client().await?);
        let nodes = api.list(&ListParams::default()).await?;
        Ok(nodes.items.iter().map(summarize_node).collect())
    }

    async fn delete_node(&self, name: &str) -> Result<(), ClusterError> {
        let api: Api<Node> = Api::all(self.client().await?);
        if api.get_opt(name).await?.is_none() {
            return Err(ClusterError::NotFound(format!("node {name}")));
        }
        info!("Deleting node {}", name);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn print_join_command(&self) -> Result<String, ClusterError> {
        let script = format!(
            "kubeadm token create --print-join-command --kubeconfig {}",
            shell_quote(&self.admin_kubeconfig.to_string_lossy())
        );
        let output = self.executor.run(&script).await?;
        if !output.success() {
            return Err(ClusterError::CommandFailed {
                exit_code: output.exit_code,
                output: output.output,
            });
        }
        join_command_line(&output.output)
    }

    async fn gitops_installed(&self) -> Result<bool, ClusterError> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client().await?);
        Ok(api.get_opt(FLUX_SOURCE_CRD).await?.is_some())
    }

    async fn list_helm_releases(&self, namespace: &str) -> Result<Vec<String>, ClusterError> {
        let api: Api<HelmRelease> = Api::namespaced(self.client().await?, namespace);
        let releases = api.list(&ListParams::default()).await?;
        Ok(releases
            .items
            .into_iter()
            .filter_map(|release| release.metadata.name)
            .collect())
    }

    async fn apply_release(&self, manifest: &ReleaseManifest) -> Result<(), ClusterError> {
        self.server_side_apply(&manifest.repository).await?;
        self.server_side_apply(&manifest.release).await
    }

    async fn delete_helm_release(&self, namespace: &str, name: &str) -> Result<bool, ClusterError> {
        let api: Api<HelmRelease> = Api::namespaced(self.client().await?, namespace);
        if api.get_opt(name).await?.is_none() {
            debug!(%namespace, %name, "HelmRelease already absent");
            return Ok(false);
        }
        api.delete(name, &DeleteParams::default()).await?;
        Ok(true)
    }

    async fn apply_git_repository(&self, source: &GitRepository) -> Result<(), ClusterError> {
        self.server_side_apply(source).await
    }

    async fn apply_kustomization(&self, kustomization: &Kustomization) -> Result<(), ClusterError> {
        self.server_side_apply(kustomization).await
    }

    async fn list_git_repositories(&self, namespace: &str) -> Result<Vec<GitRepository>, ClusterError> {
        let api: Api<GitRepository> = Api::namespaced(self.client().await?, namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_kustomizations(&self, namespace: &str) -> Result<Vec<Kustomization>, ClusterError> {
        let api: Api<Kustomization> = Api::namespaced(self.client().await?, namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn request_reconcile(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let api: Api<Kustomization> = Api::namespaced(self.client().await?, namespace);
        if api.get_opt(name).await?.is_none() {
            return Err(ClusterError::NotFound(format!("kustomization {namespace}/{name}")));
        }
        let patch = serde_json::json!({
            "metadata": {
                "annotations": {
                    RECONCILE_REQUEST_ANNOTATION: chrono::Utc::now().to_rfc3339()
                }
            }
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn service_node_port(&self, namespace: &str, service: &str) -> Result<Option<u16>, ClusterError> {
        let api: Api<Service> = Api::namespaced(self.client().await?, namespace);
        let port = api
            .get_opt(service)
            .await?
            .and_then(|svc| svc.spec)
            .and_then(|spec| spec.ports)
            .and_then(|ports| ports.into_iter().next())
            .and_then(|port| port.node_port)
            .and_then(|node_port| u16::try_from(node_port).ok());
        Ok(port)
    }
}

fn summarize_node(node: &Node) -> NodeSummary {
    let labels = node.metadata.labels.as_ref();
    let role = if labels.is_some_and(|labels| CONTROL_PLANE_LABELS.iter().any(|l| labels.contains_key(*l))) {
        NodeRole::Master
    } else {
        NodeRole::Worker
    };

    let status = node.status.as_ref();
    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"))
        .is_some_and(|c| c.status == "True");

    let internal_ip = status
        .and_then(|s| s.addresses.as_ref())
        .and_then(|addresses| addresses.iter().find(|a| a.type_ == "InternalIP"))
        .map(|a| a.address.clone())
        .unwrap_or_else(|| "N/A".to_string());

    let capacity = |key: &str| {
        status
            .and_then(|s| s.capacity.as_ref())
            .and_then(|capacity| capacity.get(key))
            .map(|quantity| quantity.0.clone())
            .unwrap_or_default()
    };

    NodeSummary {
        name: node.metadata.name.clone().unwrap_or_default(),
        role,
        status: if ready { NodeStatus::Ready } else { NodeStatus::NotReady },
        internal_ip,
        cpu: capacity("cpu"),
        memory: capacity("memory"),
    }
}

/// Picks the `kubeadm join ...` line out of combined command output.
///
/// kubeadm logs warnings to stderr, which lands in the same transcript, so
/// anything that is not part of the join command is skipped. Backslash
/// continuation lines are kept with the command.
fn join_command_line(output: &str) -> Result<String, ClusterError> {
    let unexpected = |reason: &str| ClusterError::UnexpectedOutput {
        reason: reason.to_string(),
        output: output.to_string(),
    };

    let mut found: Option<String> = None;
    let mut lines = output.lines().map(str::trim);
    while let Some(line) = lines.next() {
        if !line.starts_with("kubeadm join ") {
            continue;
        }
        if found.is_some() {
            return Err(unexpected("more than one join command"));
        }
        let mut command = line.to_string();
        while command.ends_with('\\') {
            match lines.next() {
                Some(next) => {
                    command.push(' ');
                    command.push_str(next);
                }
                None => break,
            }
        }
        found = Some(command);
    }
    found.ok_or_else(|| unexpected("no join command"))
}
