//! Cross-resource references used by Flux specs
//!
//! Flux resources point at their source with a `sourceRef` carrying the
//! referenced kind, name and optional namespace.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference from a Flux object to a source object, possibly in another namespace.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceReference {
    /// Kind of the referenced source (e.g., "HelmRepository", "GitRepository")
    pub kind: String,

    /// Name of the referenced source
    pub name: String,

    /// Namespace of the referenced source (defaults to the referencing object's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl SourceReference {
    /// Reference to a `HelmRepository` in the given namespace
    pub fn helm_repository(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind: "HelmRepository".to_string(),
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// Reference to a `GitRepository` in the same namespace
    pub fn git_repository(name: impl Into<String>) -> Self {
        Self {
            kind: "GitRepository".to_string(),
            name: name.into(),
            namespace: None,
        }
    }
}
