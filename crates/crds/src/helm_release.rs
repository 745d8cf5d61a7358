//! HelmRelease CRD (Flux helm controller)
//!
//! Binds a chart from a `HelmRepository` to a version, value overrides and
//! a target namespace. Kubestead creates one per installed marketplace app.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::{ConditionBearing, ResourceCondition};
use crate::references::SourceReference;

/// Default reconciliation interval for releases created by Kubestead
pub const DEFAULT_RELEASE_INTERVAL: &str = "5m";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "helm.toolkit.fluxcd.io",
    version = "v2",
    kind = "HelmRelease",
    namespaced,
    status = "HelmReleaseStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct HelmReleaseSpec {
    /// Reconciliation interval
    pub interval: String,

    /// Namespace the chart's objects are installed into
    /// (defaults to the release's own namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,

    /// Chart template
    pub chart: HelmChartTemplate,

    /// Value overrides passed to the chart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HelmChartTemplate {
    pub spec: HelmChartTemplateSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HelmChartTemplateSpec {
    /// Chart name within the repository
    pub chart: String,

    /// Chart version or semver range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Repository holding the chart
    pub source_ref: SourceReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct HelmReleaseStatus {
    #[serde(default)]
    pub conditions: Vec<ResourceCondition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Last reconcile request handled by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_handled_reconcile_at: Option<String>,
}

impl ConditionBearing for HelmRelease {
    fn conditions(&self) -> &[ResourceCondition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or(&[])
    }
}
