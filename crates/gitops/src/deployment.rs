//! Marketplace deployments
//!
//! Installs catalog applications as a `HelmRepository` + `HelmRelease` pair
//! in the GitOps namespace and reports their state. Installed state is read
//! from the cluster on every call.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use cluster_client::{CommandExecutor, CommandOutput, ControlPlane};
use crds::{ReleaseManifest, ReleaseParams};

use crate::catalog::{AppCatalogEntry, Catalog};
use crate::error::DeployError;
use crate::resolver::{resolve_all, resolve_state, AppState, InstalledAppSet};

pub const DEFAULT_GITOPS_NAMESPACE: &str = "flux-system";
pub const DEFAULT_APP_NAMESPACE: &str = "default";
pub const DEFAULT_SERVICE_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_TOOLKIT_INSTALL_COMMAND: &str =
    "curl -s https://fluxcd.io/install.sh | bash && flux install";

/// Where releases live and how the toolkit is installed
#[derive(Debug, Clone)]
pub struct DeploymentSettings {
    /// Namespace holding the Flux objects
    pub gitops_namespace: String,
    /// Namespace charts install into
    pub target_namespace: String,
    pub service_lookup_timeout: Duration,
    pub toolkit_install_command: String,
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            gitops_namespace: DEFAULT_GITOPS_NAMESPACE.to_string(),
            target_namespace: DEFAULT_APP_NAMESPACE.to_string(),
            service_lookup_timeout: DEFAULT_SERVICE_LOOKUP_TIMEOUT,
            toolkit_install_command: DEFAULT_TOOLKIT_INSTALL_COMMAND.to_string(),
        }
    }
}

/// Reachability of an application's UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum ServiceEndpoint {
    /// Node port allocated
    Ready { node_port: u16 },
    /// Service or port not there yet (or the lookup timed out)
    Pending,
    /// Entry declares no UI service
    NoService,
}

/// Everything the marketplace view needs in one response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceOverview {
    pub flux_installed: bool,
    pub catalog: BTreeMap<String, AppCatalogEntry>,
    pub installed_apps: Vec<String>,
    pub states: BTreeMap<String, AppState>,
    /// Node ports of installed applications whose UI service is ready
    pub services: BTreeMap<String, u16>,
}

pub struct DeploymentManager {
    control_plane: Arc<dyn ControlPlane>,
    executor: Arc<dyn CommandExecutor>,
    catalog: Arc<Catalog>,
    settings: DeploymentSettings,
}

impl DeploymentManager {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        executor: Arc<dyn CommandExecutor>,
        catalog: Arc<Catalog>,
        settings: DeploymentSettings,
    ) -> Self {
        Self {
            control_plane,
            executor,
            catalog,
            settings,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn entry(&self, key: &str) -> Result<&AppCatalogEntry, DeployError> {
        self.catalog
            .get(key)
            .ok_or_else(|| DeployError::UnknownApp(key.to_string()))
    }

    /// Catalog applications currently installed; empty without Flux
    pub async fn installed_apps(&self) -> Result<InstalledAppSet, DeployError> {
        if !self.control_plane.gitops_installed().await? {
            return Ok(InstalledAppSet::default());
        }
        let releases = self
            .control_plane
            .list_helm_releases(&self.settings.gitops_namespace)
            .await?;
        Ok(InstalledAppSet::from_releases(&self.catalog, releases))
    }

    pub async fn state(&self, key: &str) -> Result<AppState, DeployError> {
        let entry = self.entry(key)?;
        let gitops_present = self.control_plane.gitops_installed().await?;
        let installed = self.installed_apps().await?;
        Ok(resolve_state(key, entry, &installed, gitops_present))
    }

    /// Apply the release manifest for `key`.
    ///
    /// Unknown keys and unmet dependencies are rejected before anything is
    /// applied. The apply result is returned as-is; there is no retry.
    pub async fn install(&self, key: &str) -> Result<(), DeployError> {
        let entry = self.entry(key)?;
        match self.state(key).await? {
            AppState::NotInstalled => return Err(DeployError::ToolkitMissing),
            AppState::DependencyUnmet => {
                let dependency = entry.dependency.clone().unwrap_or_default();
                warn!(app = %key, %dependency, "Install rejected: dependency not installed");
                return Err(DeployError::DependencyUnmet {
                    app: key.to_string(),
                    dependency,
                });
            }
            AppState::Installable | AppState::Installed => {}
        }

        let manifest = self.manifest_for(key, entry);
        info!(app = %key, chart = %entry.chart, version = %entry.version, "Installing application");
        self.control_plane.apply_release(&manifest).await?;
        Ok(())
    }

    /// Delete the `HelmRelease` for `key`. Succeeds if it was already gone.
    pub async fn uninstall(&self, key: &str) -> Result<(), DeployError> {
        self.entry(key)?;
        let existed = self
            .control_plane
            .delete_helm_release(&self.settings.gitops_namespace, key)
            .await?;
        if existed {
            info!(app = %key, "Uninstalled application");
        } else {
            debug!(app = %key, "Uninstall requested for absent release");
        }
        Ok(())
    }

    /// Node port of the application's UI service, if allocated
    pub async fn service_endpoint(&self, key: &str) -> Result<ServiceEndpoint, DeployError> {
        let entry = self.entry(key)?;
        let Some(service) = entry.ui_service.as_deref() else {
            return Ok(ServiceEndpoint::NoService);
        };
        Ok(self.lookup_port(service).await)
    }

    async fn lookup_port(&self, service: &str) -> ServiceEndpoint {
        let lookup = self
            .control_plane
            .service_node_port(&self.settings.target_namespace, service);
        match tokio::time::timeout(self.settings.service_lookup_timeout, lookup).await {
            Ok(Ok(Some(node_port))) => ServiceEndpoint::Ready { node_port },
            Ok(Ok(None)) => ServiceEndpoint::Pending,
            Ok(Err(e)) => {
                warn!(%service, "Service lookup failed: {}", e);
                ServiceEndpoint::Pending
            }
            Err(_) => {
                debug!(%service, "Service lookup timed out");
                ServiceEndpoint::Pending
            }
        }
    }

    pub async fn marketplace(&self) -> Result<MarketplaceOverview, DeployError> {
        let flux_installed = self.control_plane.gitops_installed().await?;
        let installed = self.installed_apps().await?;
        let states = resolve_all(&self.catalog, &installed, flux_installed);

        let lookups = installed.iter().filter_map(|key| {
            let service = self.catalog.get(key)?.ui_service.as_deref()?;
            Some(async move { (key, self.lookup_port(service).await) })
        });
        let services = join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(key, endpoint)| match endpoint {
                ServiceEndpoint::Ready { node_port } => Some((key.to_string(), node_port)),
                _ => None,
            })
            .collect();

        Ok(MarketplaceOverview {
            flux_installed,
            catalog: self.catalog.entries().clone(),
            installed_apps: installed.to_vec(),
            states,
            services,
        })
    }

    /// Run the configured Flux install command on this host
    pub async fn install_toolkit(&self) -> Result<CommandOutput, DeployError> {
        info!("Installing GitOps toolkit");
        let output = self
            .executor
            .run(&self.settings.toolkit_install_command)
            .await?;
        if !output.success() {
            warn!(exit_code = output.exit_code, "GitOps toolkit install failed");
            return Err(DeployError::CommandFailed {
                exit_code: output.exit_code,
                output: output.output,
            });
        }
        Ok(output)
    }

    fn manifest_for(&self, key: &str, entry: &AppCatalogEntry) -> ReleaseManifest {
        ReleaseManifest::build(ReleaseParams {
            name: key,
            gitops_namespace: &self.settings.gitops_namespace,
            target_namespace: &self.settings.target_namespace,
            repository_name: &entry.repository.name,
            repository_url: &entry.repository.url,
            chart: &entry.chart,
            version: &entry.version,
            values: (!entry.values.is_null()).then(|| entry.values.clone()),
        })
    }
}
