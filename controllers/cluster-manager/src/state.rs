//! Shared handler state

use std::sync::Arc;

use cluster_client::{CommandExecutor, ControlPlane};
use gitops::{Catalog, DeploymentManager, DeploymentSettings, GitOpsManager};
use provisioner::{BootstrapConfig, BootstrapOrchestrator, InstallLibrary, JoinTokenBroker, OsRelease};

use crate::config::ManagerConfig;

/// Everything the handlers need, cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub control_plane: Arc<dyn ControlPlane>,
    pub os_release: Arc<OsRelease>,
    pub install: InstallLibrary,
    pub orchestrator: Arc<BootstrapOrchestrator>,
    pub broker: Arc<JoinTokenBroker>,
    pub deployments: Arc<DeploymentManager>,
    pub gitops: Arc<GitOpsManager>,
}

impl AppState {
    pub fn new(
        config: &ManagerConfig,
        control_plane: Arc<dyn ControlPlane>,
        executor: Arc<dyn CommandExecutor>,
        catalog: Catalog,
        os_release: OsRelease,
    ) -> Self {
        let install = InstallLibrary::new(config.kubernetes_release.clone());
        let orchestrator = BootstrapOrchestrator::new(
            executor.clone(),
            os_release.family(),
            BootstrapConfig {
                pod_network_cidr: config.pod_network_cidr.clone(),
                cni_manifest_url: config.cni_manifest_url.clone(),
                install: install.clone(),
            },
        );
        let deployments = DeploymentManager::new(
            control_plane.clone(),
            executor,
            Arc::new(catalog),
            DeploymentSettings {
                gitops_namespace: config.gitops_namespace.clone(),
                target_namespace: config.app_target_namespace.clone(),
                service_lookup_timeout: config.service_lookup_timeout,
                toolkit_install_command: config.flux_install_command.clone(),
            },
        );

        Self {
            broker: Arc::new(JoinTokenBroker::new(control_plane.clone())),
            gitops: Arc::new(GitOpsManager::new(control_plane.clone(), config.gitops_namespace.clone())),
            control_plane,
            os_release: Arc::new(os_release),
            install,
            orchestrator: Arc::new(orchestrator),
            deployments: Arc::new(deployments),
        }
    }
}
