//! Deployment dependency resolution
//!
//! Pure functions from (catalog, observed releases, Flux presence) to the
//! state of each application.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::catalog::{AppCatalogEntry, Catalog};

/// Install state of one catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AppState {
    /// Flux is absent; nothing can be installed
    NotInstalled,
    /// Declared dependency is not installed
    DependencyUnmet,
    Installable,
    Installed,
}

/// Catalog keys with a `HelmRelease` in the GitOps namespace, as observed now
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstalledAppSet(BTreeSet<String>);

impl InstalledAppSet {
    /// Keep only release names that are catalog keys
    pub fn from_releases<I, S>(catalog: &Catalog, releases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            releases
                .into_iter()
                .filter(|name| catalog.contains(name.as_ref()))
                .map(|name| name.as_ref().to_string())
                .collect(),
        )
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

/// State of a single entry.
///
/// Only the direct dependency is checked; catalog validation guarantees it
/// exists and that chains are acyclic, so chains install bottom-up.
pub fn resolve_state(
    key: &str,
    entry: &AppCatalogEntry,
    installed: &InstalledAppSet,
    gitops_present: bool,
) -> AppState {
    if !gitops_present {
        return AppState::NotInstalled;
    }
    if let Some(dependency) = &entry.dependency {
        if !installed.contains(dependency) {
            return AppState::DependencyUnmet;
        }
    }
    if installed.contains(key) {
        AppState::Installed
    } else {
        AppState::Installable
    }
}

/// State of every entry in the catalog
pub fn resolve_all(
    catalog: &Catalog,
    installed: &InstalledAppSet,
    gitops_present: bool,
) -> BTreeMap<String, AppState> {
    catalog
        .iter()
        .map(|(key, entry)| (key.to_string(), resolve_state(key, entry, installed, gitops_present)))
        .collect()
}
