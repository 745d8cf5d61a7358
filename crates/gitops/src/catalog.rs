//! Application catalog
//!
//! Static descriptors of the applications the marketplace can install. The
//! catalog is loaded once at startup (built in, or from a YAML file) and
//! never changes afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CatalogError;
use crate::names::is_dns1123_label;

const BUILTIN_CATALOG: &str = include_str!("default_catalog.yaml");

/// Helm chart repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRepository {
    /// Name of the `HelmRepository` object (e.g., "bitnami")
    pub name: String,
    pub url: String,
}

/// One installable application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppCatalogEntry {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub chart: String,
    pub repository: ChartRepository,
    /// Chart version
    pub version: String,
    /// Value overrides passed to the chart
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub values: serde_json::Value,
    /// Key of an application that must be installed first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency: Option<String>,
    /// Service exposing the application's UI through a node port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

/// Validated, immutable set of catalog entries keyed by application key
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    entries: BTreeMap<String, AppCatalogEntry>,
}

impl Catalog {
    /// The catalog shipped with Kubestead
    pub fn builtin() -> Result<Catalog, CatalogError> {
        Catalog::from_yaml(BUILTIN_CATALOG)
    }

    /// Load from a YAML file mapping keys to entries
    pub fn load(path: impl AsRef<Path>) -> Result<Catalog, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Catalog::from_yaml(&content)?;
        info!("Loaded {} catalog entries from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn from_yaml(content: &str) -> Result<Catalog, CatalogError> {
        let entries: BTreeMap<String, AppCatalogEntry> = serde_yaml::from_str(content)?;
        Catalog::new(entries)
    }

    /// Validate entries: keys are DNS-1123 labels, required fields are
    /// non-empty, dependencies exist and do not form a cycle
    pub fn new(entries: BTreeMap<String, AppCatalogEntry>) -> Result<Catalog, CatalogError> {
        for (key, entry) in &entries {
            validate_entry(key, entry)?;
            if let Some(dependency) = &entry.dependency {
                if !entries.contains_key(dependency) {
                    return Err(CatalogError::UnknownDependency {
                        key: key.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        for key in entries.keys() {
            let mut seen = BTreeSet::from([key.as_str()]);
            let mut current = key.as_str();
            while let Some(next) = entries
                .get(current)
                .and_then(|entry| entry.dependency.as_deref())
            {
                if !seen.insert(next) {
                    return Err(CatalogError::DependencyCycle(key.clone()));
                }
                current = next;
            }
        }

        Ok(Catalog { entries })
    }

    pub fn get(&self, key: &str) -> Option<&AppCatalogEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AppCatalogEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn entries(&self) -> &BTreeMap<String, AppCatalogEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_entry(key: &str, entry: &AppCatalogEntry) -> Result<(), CatalogError> {
    let invalid = |reason: &str| CatalogError::InvalidEntry {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if !is_dns1123_label(key) {
        return Err(invalid("key must be a lowercase DNS-1123 label"));
    }
    let required = [
        ("title", &entry.title),
        ("chart", &entry.chart),
        ("version", &entry.version),
        ("repository.url", &entry.repository.url),
    ];
    if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
        return Err(invalid(&format!("{field} must not be empty")));
    }
    if !is_dns1123_label(&entry.repository.name) {
        return Err(invalid("repository.name must be a lowercase DNS-1123 label"));
    }
    if entry.dependency.as_deref() == Some(key) {
        return Err(CatalogError::DependencyCycle(key.to_string()));
    }
    if entry.ui_service.as_deref().is_some_and(str::is_empty) {
        return Err(invalid("uiService must not be empty when set"));
    }
    Ok(())
}
