//! Kustomization CRD (Flux kustomize controller)

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::{ConditionBearing, ResourceCondition};
use crate::references::SourceReference;

/// Default reconciliation interval for user-created Kustomizations
pub const DEFAULT_KUSTOMIZATION_INTERVAL: &str = "10m";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kustomize.toolkit.fluxcd.io",
    version = "v1",
    kind = "Kustomization",
    namespaced,
    status = "KustomizationStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KustomizationSpec {
    /// Reconciliation interval
    pub interval: String,

    /// Path inside the source artifact (e.g., "./clusters/prod")
    pub path: String,

    /// Garbage-collect objects removed from the source
    #[serde(default)]
    pub prune: bool,

    /// Source the manifests come from
    pub source_ref: SourceReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct KustomizationStatus {
    #[serde(default)]
    pub conditions: Vec<ResourceCondition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_handled_reconcile_at: Option<String>,
}

impl Kustomization {
    /// Builds a pruning Kustomization applying `path` from the named `GitRepository`
    pub fn for_source(name: &str, namespace: &str, source: &str, path: &str) -> Self {
        let mut kustomization = Kustomization::new(
            name,
            KustomizationSpec {
                interval: DEFAULT_KUSTOMIZATION_INTERVAL.to_string(),
                path: path.to_string(),
                prune: true,
                source_ref: SourceReference::git_repository(source),
            },
        );
        kustomization.metadata.namespace = Some(namespace.to_string());
        kustomization
    }
}

impl ConditionBearing for Kustomization {
    fn conditions(&self) -> &[ResourceCondition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::Readiness;

    #[test]
    fn test_for_source_references_git_repository() {
        let kustomization = Kustomization::for_source("apps", "flux-system", "apps-repo", "./clusters/prod");
        let json = serde_json::to_value(&kustomization).unwrap();
        assert_eq!(json["apiVersion"], "kustomize.toolkit.fluxcd.io/v1");
        assert_eq!(json["spec"]["sourceRef"]["kind"], "GitRepository");
        assert_eq!(json["spec"]["sourceRef"]["name"], "apps-repo");
        assert_eq!(json["spec"]["path"], "./clusters/prod");
        assert_eq!(json["spec"]["prune"], true);
    }

    #[test]
    fn test_readiness_from_status() {
        let mut kustomization = Kustomization::for_source("apps", "flux-system", "apps-repo", "./");
        kustomization.status = Some(KustomizationStatus {
            conditions: vec![ResourceCondition::new("Ready", "False")],
            ..Default::default()
        });
        assert_eq!(kustomization.readiness(), Readiness::Failed);
    }
}
