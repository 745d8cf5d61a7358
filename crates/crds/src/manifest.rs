//! Two-document release manifest
//!
//! A marketplace install is one `HelmRepository` plus one `HelmRelease`
//! referencing it, both in the GitOps namespace.

use crate::helm_release::{
    HelmChartTemplate, HelmChartTemplateSpec, HelmRelease, HelmReleaseSpec,
    DEFAULT_RELEASE_INTERVAL,
};
use crate::helm_repository::HelmRepository;
use crate::references::SourceReference;

/// Chart coordinates and overrides for one release
#[derive(Debug, Clone)]
pub struct ReleaseParams<'a> {
    /// Release (and catalog) key
    pub name: &'a str,
    /// Namespace holding the Flux objects
    pub gitops_namespace: &'a str,
    /// Namespace the chart installs into
    pub target_namespace: &'a str,
    pub repository_name: &'a str,
    pub repository_url: &'a str,
    pub chart: &'a str,
    pub version: &'a str,
    pub values: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ReleaseManifest {
    pub repository: HelmRepository,
    pub release: HelmRelease,
}

impl ReleaseManifest {
    pub fn build(params: ReleaseParams<'_>) -> Self {
        let repository = HelmRepository::for_url(
            params.repository_name,
            params.gitops_namespace,
            params.repository_url,
        );

        let mut release = HelmRelease::new(
            params.name,
            HelmReleaseSpec {
                interval: DEFAULT_RELEASE_INTERVAL.to_string(),
                target_namespace: Some(params.target_namespace.to_string()),
                chart: HelmChartTemplate {
                    spec: HelmChartTemplateSpec {
                        chart: params.chart.to_string(),
                        version: Some(params.version.to_string()),
                        source_ref: SourceReference::helm_repository(
                            params.repository_name,
                            params.gitops_namespace,
                        ),
                    },
                },
                values: params.values,
            },
        );
        release.metadata.namespace = Some(params.gitops_namespace.to_string());

        Self {
            repository,
            release,
        }
    }

    /// Renders both objects as one multi-document YAML stream
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        let repository = serde_yaml::to_string(&self.repository)?;
        let release = serde_yaml::to_string(&self.release)?;
        Ok(format!("{repository}---\n{release}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn kouncil() -> ReleaseManifest {
        ReleaseManifest::build(ReleaseParams {
            name: "kouncil",
            gitops_namespace: "flux-system",
            target_namespace: "default",
            repository_name: "consdata",
            repository_url: "https://consdata.github.io/kouncil/",
            chart: "kouncil",
            version: "1.9.0",
            values: Some(serde_json::json!({"service": {"type": "NodePort"}})),
        })
    }

    #[test]
    fn test_release_references_repository() {
        let manifest = kouncil();
        let source_ref = &manifest.release.spec.chart.spec.source_ref;
        assert_eq!(source_ref.kind, "HelmRepository");
        assert_eq!(source_ref.name, "consdata");
        assert_eq!(source_ref.namespace.as_deref(), Some("flux-system"));
        assert_eq!(manifest.release.spec.target_namespace.as_deref(), Some("default"));
        assert_eq!(manifest.repository.metadata.namespace.as_deref(), Some("flux-system"));
    }

    #[test]
    fn test_to_yaml_has_two_documents() {
        let yaml = kouncil().to_yaml().unwrap();
        let docs: Vec<serde_yaml::Value> = serde_yaml::Deserializer::from_str(&yaml)
            .map(serde_yaml::Value::deserialize)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["kind"], serde_yaml::Value::from("HelmRepository"));
        assert_eq!(docs[1]["kind"], serde_yaml::Value::from("HelmRelease"));
        assert_eq!(docs[1]["spec"]["chart"]["spec"]["version"], serde_yaml::Value::from("1.9.0"));
    }
}
