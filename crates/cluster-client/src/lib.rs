//! Cluster Collaborators
//!
//! Thin adapters between Kubestead and the outside world:
//! - [`ControlPlane`]: read and write cluster state (nodes, Flux objects, services)
//!   and mint join commands through kubeadm
//! - [`CommandExecutor`]: run shell scripts on the local host, optionally streaming
//!   their output line by line
//!
//! The concrete implementations are [`KubeControlPlane`] (kube-rs) and
//! [`ShellExecutor`] (`tokio::process`). In-memory mocks are available behind
//! the `test-util` feature.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cluster_client::{ControlPlane, KubeControlPlane, ShellExecutor};
//!
//! # async fn example() -> Result<(), cluster_client::ClusterError> {
//! let control_plane = KubeControlPlane::new(
//!     "/etc/kubernetes/admin.conf",
//!     Arc::new(ShellExecutor::new()),
//! );
//!
//! if control_plane.is_initialized().await {
//!     for node in control_plane.list_nodes().await? {
//!         println!("{} {:?}", node.name, node.status);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod exec;
pub mod models;
#[path = "trait.rs"]
pub mod control_plane_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeControlPlane;
pub use control_plane_trait::ControlPlane;
pub use error::{ClusterError, ExecError};
pub use exec::{CommandExecutor, ShellExecutor, STRICT_SHELL_ARGS};
pub use models::*;
#[cfg(feature = "test-util")]
pub use mock::{MockControlPlane, MockExecutor};
