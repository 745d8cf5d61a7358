//! Kubestead Provisioner
//!
//! Turns a bare Linux host into a kubeadm control plane and packages the
//! credentials other hosts need to join it as workers.
//!
//! - [`os_family`]: classify the host from `/etc/os-release`
//! - [`install`]: per-family container runtime and Kubernetes package steps
//! - [`bootstrap`]: run the install steps plus `kubeadm init` with streamed output
//! - [`join`]: mint a bootstrap token and parse it into a [`JoinRecord`]
//! - [`worker_script`]: render a shell script or cloud-init document for a worker
//!
//! Bootstrap side effects are irreversible. A failed run leaves the host
//! partially configured; re-running is only safe after manual inspection
//! (e.g. `kubeadm reset`).

pub mod bootstrap;
pub mod error;
pub mod install;
pub mod join;
pub mod os_family;
pub mod worker_script;

mod bootstrap_test;

pub use bootstrap::{
    BootstrapConfig, BootstrapEvent, BootstrapJob, BootstrapLock, BootstrapOrchestrator, JobOutcome,
    JobState,
};
pub use error::{BootstrapError, JoinError, JoinRecordError, UnknownValue, WorkerScriptError};
pub use install::{commands_for, InstallLibrary, ShellStep, DEFAULT_KUBERNETES_RELEASE};
pub use join::{parse_join_command, JoinRecord, JoinTokenBroker};
pub use os_family::{OsFamily, OsInfo, OsRelease};
pub use worker_script::{render, render_with, ArtifactFormat, JoinConfiguration, WorkerArtifact};
