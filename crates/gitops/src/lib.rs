//! Kubestead GitOps
//!
//! Declarative application management on top of Flux:
//! - [`catalog`]: the immutable application catalog, validated on load
//! - [`resolver`]: per-application install state from the observed cluster
//! - [`deployment`]: marketplace install/uninstall through `HelmRelease`s
//! - [`manager`]: user-managed `GitRepository` and `Kustomization` objects
//!
//! No state is cached here; every query reads the cluster.

pub mod catalog;
pub mod deployment;
pub mod error;
pub mod manager;
pub mod names;
pub mod resolver;

pub use catalog::{AppCatalogEntry, Catalog, ChartRepository};
pub use deployment::{
    DeploymentManager, DeploymentSettings, MarketplaceOverview, ServiceEndpoint,
};
pub use error::{CatalogError, DeployError, GitOpsError};
pub use manager::{GitOpsManager, KustomizationSummary, SourceSummary, SyncOutcome};
pub use resolver::{resolve_all, resolve_state, AppState, InstalledAppSet};
