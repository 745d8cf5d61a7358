//! GitRepository CRD (Flux source controller)

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::{ConditionBearing, ResourceCondition};

/// Default poll interval for user-created Git sources
pub const DEFAULT_SOURCE_INTERVAL: &str = "1m";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "source.toolkit.fluxcd.io",
    version = "v1",
    kind = "GitRepository",
    namespaced,
    status = "GitRepositoryStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositorySpec {
    /// Poll interval
    pub interval: String,

    /// Repository URL (https or ssh)
    pub url: String,

    /// Reference to check out
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<GitRepositoryRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositoryRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct GitRepositoryStatus {
    #[serde(default)]
    pub conditions: Vec<ResourceCondition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl GitRepository {
    /// Builds a source tracking `branch` of `url`
    pub fn for_branch(name: &str, namespace: &str, url: &str, branch: &str) -> Self {
        let mut source = GitRepository::new(
            name,
            GitRepositorySpec {
                interval: DEFAULT_SOURCE_INTERVAL.to_string(),
                url: url.to_string(),
                reference: Some(GitRepositoryRef {
                    branch: Some(branch.to_string()),
                }),
            },
        );
        source.metadata.namespace = Some(namespace.to_string());
        source
    }

    /// Tracked branch, if any
    pub fn branch(&self) -> Option<&str> {
        self.spec
            .reference
            .as_ref()
            .and_then(|r| r.branch.as_deref())
    }
}

impl ConditionBearing for GitRepository {
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
    fn test_for_branch_serializes_ref() {
        let source = GitRepository::for_branch("apps", "flux-system", "https://git.example.com/apps.git", "main");
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["apiVersion"], "source.toolkit.fluxcd.io/v1");
        assert_eq!(json["kind"], "GitRepository");
        assert_eq!(json["metadata"]["namespace"], "flux-system");
        assert_eq!(json["spec"]["ref"]["branch"], "main");
        assert_eq!(source.branch(), Some("main"));
    }

    #[test]
    fn test_readiness_without_status_is_unknown() {
        let source = GitRepository::for_branch("apps", "flux-system", "https://git.example.com/apps.git", "main");
        assert_eq!(source.readiness(), Readiness::Unknown);
    }
}
