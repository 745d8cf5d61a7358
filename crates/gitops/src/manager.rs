//! User-managed Flux sources and Kustomizations

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use cluster_client::{ClusterError, ControlPlane};
use crds::{ConditionBearing, GitRepository, Kustomization, Readiness};

use crate::error::GitOpsError;
use crate::names::is_dns1123_subdomain;

/// Result of a reconcile request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncOutcome {
    Requested,
    /// No Kustomization with that name
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSummary {
    pub name: String,
    pub url: String,
    pub branch: Option<String>,
    pub readiness: Readiness,
    pub message: Option<String>,
}

impl From<&GitRepository> for SourceSummary {
    fn from(source: &GitRepository) -> Self {
        Self {
            name: source.metadata.name.clone().unwrap_or_default(),
            url: source.spec.url.clone(),
            branch: source.branch().map(str::to_string),
            readiness: source.readiness(),
            message: source.ready_message().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KustomizationSummary {
    pub name: String,
    /// Name of the referenced source
    pub source: String,
    pub path: String,
    pub readiness: Readiness,
    pub message: Option<String>,
}

impl From<&Kustomization> for KustomizationSummary {
    fn from(kustomization: &Kustomization) -> Self {
        Self {
            name: kustomization.metadata.name.clone().unwrap_or_default(),
            source: kustomization.spec.source_ref.name.clone(),
            path: kustomization.spec.path.clone(),
            readiness: kustomization.readiness(),
            message: kustomization.ready_message().map(str::to_string),
        }
    }
}

/// Creates, lists and syncs Git sources and Kustomizations in one namespace
pub struct GitOpsManager {
    control_plane: Arc<dyn ControlPlane>,
    namespace: String,
}

impl GitOpsManager {
    pub fn new(control_plane: Arc<dyn ControlPlane>, namespace: impl Into<String>) -> Self {
        Self {
            control_plane,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn create_source(&self, name: &str, url: &str, branch: &str) -> Result<(), GitOpsError> {
        validate_name("name", name)?;
        require("url", url)?;
        require("branch", branch)?;

        let source = GitRepository::for_branch(name, &self.namespace, url, branch);
        self.control_plane.apply_git_repository(&source).await?;
        info!(%name, %url, %branch, "Applied GitRepository");
        Ok(())
    }

    pub async fn create_kustomization(&self, name: &str, source: &str, path: &str) -> Result<(), GitOpsError> {
        validate_name("name", name)?;
        validate_name("source", source)?;
        require("path", path)?;

        let kustomization = Kustomization::for_source(name, &self.namespace, source, path);
        self.control_plane.apply_kustomization(&kustomization).await?;
        info!(%name, %source, %path, "Applied Kustomization");
        Ok(())
    }

    /// Ask Flux to reconcile a Kustomization now
    pub async fn sync(&self, name: &str) -> Result<SyncOutcome, GitOpsError> {
        validate_name("name", name)?;
        match self.control_plane.request_reconcile(&self.namespace, name).await {
            Ok(()) => {
                info!(%name, "Requested Kustomization reconcile");
                Ok(SyncOutcome::Requested)
            }
            Err(ClusterError::NotFound(_)) => {
                warn!(%name, "Sync requested for unknown Kustomization");
                Ok(SyncOutcome::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_sources(&self) -> Result<Vec<SourceSummary>, GitOpsError> {
        if !self.control_plane.gitops_installed().await? {
            debug!("GitOps toolkit absent, no sources to list");
            return Ok(Vec::new());
        }
        let sources = self.control_plane.list_git_repositories(&self.namespace).await?;
        Ok(sources.iter().map(SourceSummary::from).collect())
    }

    pub async fn list_kustomizations(&self) -> Result<Vec<KustomizationSummary>, GitOpsError> {
        if !self.control_plane.gitops_installed().await? {
            debug!("GitOps toolkit absent, no kustomizations to list");
            return Ok(Vec::new());
        }
        let kustomizations = self.control_plane.list_kustomizations(&self.namespace).await?;
        Ok(kustomizations.iter().map(KustomizationSummary::from).collect())
    }
}

fn require(field: &'static str, value: &str) -> Result<(), GitOpsError> {
    if value.trim().is_empty() {
        return Err(GitOpsError::EmptyField(field));
    }
    Ok(())
}

fn validate_name(field: &'static str, value: &str) -> Result<(), GitOpsError> {
    require(field, value)?;
    if !is_dns1123_subdomain(value) {
        return Err(GitOpsError::InvalidName {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_client::MockControlPlane;
    use crds::{GitRepositoryStatus, ResourceCondition, RECONCILE_REQUEST_ANNOTATION};

    fn manager(control_plane: &MockControlPlane) -> GitOpsManager {
        GitOpsManager::new(Arc::new(control_plane.clone()), "flux-system")
    }

    fn with_flux() -> MockControlPlane {
        let control_plane = MockControlPlane::new();
        control_plane.set_gitops_installed(true);
        control_plane
    }

    #[tokio::test]
    async fn test_create_source_uses_inputs_verbatim() {
        let control_plane = with_flux();
        manager(&control_plane)
            .create_source("apps", "https://github.com/acme/apps.git", "release-2")
            .await
            .unwrap();

        let sources = control_plane.git_repositories();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].metadata.name.as_deref(), Some("apps"));
        assert_eq!(sources[0].metadata.namespace.as_deref(), Some("flux-system"));
        assert_eq!(sources[0].spec.url, "https://github.com/acme/apps.git");
        assert_eq!(sources[0].branch(), Some("release-2"));
    }

    #[tokio::test]
    async fn test_invalid_input_makes_no_call() {
        let control_plane = with_flux();
        let manager = manager(&control_plane);

        assert!(matches!(
            manager.create_source("Apps_Repo", "https://x", "main").await,
            Err(GitOpsError::InvalidName { field: "name", .. })
        ));
        assert!(matches!(
            manager.create_source("apps", " ", "main").await,
            Err(GitOpsError::EmptyField("url"))
        ));
        assert!(matches!(
            manager.create_kustomization("web", "apps", "").await,
            Err(GitOpsError::EmptyField("path"))
        ));
        assert!(matches!(
            manager.create_kustomization("web", "bad/source", "./web").await,
            Err(GitOpsError::InvalidName { field: "source", .. })
        ));
        assert!(control_plane.git_repositories().is_empty());
        assert!(control_plane.kustomizations().is_empty());
    }

    #[tokio::test]
    async fn test_create_kustomization_references_source() {
        let control_plane = with_flux();
        manager(&control_plane)
            .create_kustomization("web", "apps", "./clusters/web")
            .await
            .unwrap();

        let listed = manager(&control_plane).list_kustomizations().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].source, "apps");
        assert_eq!(listed[0].path, "./clusters/web");
        assert_eq!(listed[0].readiness, Readiness::Unknown);
    }

    #[tokio::test]
    async fn test_sync_outcomes() {
        let control_plane = with_flux();
        control_plane.add_kustomization(Kustomization::for_source("web", "flux-system", "apps", "./web"));
        let manager = manager(&control_plane);

        assert_eq!(manager.sync("web").await.unwrap(), SyncOutcome::Requested);
        assert_eq!(manager.sync("missing").await.unwrap(), SyncOutcome::NotFound);
        assert_eq!(control_plane.reconcile_requests(), vec!["web".to_string()]);

        let stamped = &control_plane.kustomizations()[0];
        assert!(stamped
            .metadata
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(RECONCILE_REQUEST_ANNOTATION)));
    }

    #[tokio::test]
    async fn test_list_sources_projects_readiness() {
        let control_plane = with_flux();
        let mut failing = GitRepository::for_branch("apps", "flux-system", "https://x/apps.git", "main");
        failing.status = Some(GitRepositoryStatus {
            conditions: vec![ResourceCondition {
                message: Some("authentication required".to_string()),
                ..ResourceCondition::new("Ready", "False")
            }],
            ..Default::default()
        });
        control_plane.add_git_repository(failing);
        control_plane.add_git_repository(GitRepository::for_branch("other", "elsewhere", "https://y", "main"));

        let sources = manager(&control_plane).list_sources().await.unwrap();
        assert_eq!(
            sources,
            vec![SourceSummary {
                name: "apps".to_string(),
                url: "https://x/apps.git".to_string(),
                branch: Some("main".to_string()),
                readiness: Readiness::Failed,
                message: Some("authentication required".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn test_lists_are_empty_without_flux() {
        let control_plane = MockControlPlane::new();
        control_plane.add_git_repository(GitRepository::for_branch("apps", "flux-system", "https://x", "main"));
        let manager = manager(&control_plane);

        assert!(manager.list_sources().await.unwrap().is_empty());
        assert!(manager.list_kustomizations().await.unwrap().is_empty());
    }
}
