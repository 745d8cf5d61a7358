//! HelmRepository CRD (Flux source controller)
//!
//! Chart index a `HelmRelease` pulls its chart from.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::{ConditionBearing, ResourceCondition};

/// Default reconciliation interval for repositories created by Kubestead
pub const DEFAULT_REPOSITORY_INTERVAL: &str = "1h";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "source.toolkit.fluxcd.io",
    version = "v1",
    kind = "HelmRepository",
    namespaced,
    status = "HelmRepositoryStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct HelmRepositorySpec {
    /// Chart repository URL (e.g., "https://charts.bitnami.com/bitnami")
    pub url: String,

    /// How often Flux re-fetches the index
    pub interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct HelmRepositoryStatus {
    #[serde(default)]
    pub conditions: Vec<ResourceCondition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl HelmRepository {
    /// Builds a repository object in `namespace`
    pub fn for_url(name: &str, namespace: &str, url: &str) -> Self {
        let mut repository = HelmRepository::new(
            name,
            HelmRepositorySpec {
                url: url.to_string(),
                interval: DEFAULT_REPOSITORY_INTERVAL.to_string(),
            },
        );
        repository.metadata.namespace = Some(namespace.to_string());
        repository
    }
}

impl ConditionBearing for HelmRepository {
    fn conditions(&self) -> &[ResourceCondition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or(&[])
    }
}
