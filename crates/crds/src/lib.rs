//! Kubestead CRD Definitions
//!
//! Typed views of the Flux custom resources Kubestead creates and reads:
//! - `HelmRepository` / `HelmRelease`: marketplace application installs
//! - `GitRepository` / `Kustomization`: user-managed GitOps sources
//!
//! Kubestead does not install these CRDs; the Flux toolkit owns them.

pub mod conditions;
pub mod helm_repository;
pub mod helm_release;
pub mod git_repository;
pub mod kustomization;
pub mod manifest;
pub mod references;

pub use conditions::*;
pub use helm_repository::*;
pub use helm_release::*;
pub use git_repository::*;
pub use kustomization::*;
pub use manifest::*;
pub use references::*;

/// Annotation Flux controllers watch to trigger an out-of-band reconciliation.
pub const RECONCILE_REQUEST_ANNOTATION: &str = "reconcile.fluxcd.io/requestedAt";

/// CRD whose presence signals that the Flux source controller is installed.
pub const FLUX_SOURCE_CRD: &str = "gitrepositories.source.toolkit.fluxcd.io";
