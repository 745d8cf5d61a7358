//! Control plane bootstrap
//!
//! Runs the host install steps followed by `kubeadm init`, admin kubeconfig
//! setup and the pod network manifest. Output is streamed as
//! [`BootstrapEvent`]s while the pipeline runs in a spawned task.
//!
//! Only one bootstrap may run per host. [`BootstrapLock`] rejects a second
//! attempt immediately instead of queueing it.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use cluster_client::CommandExecutor;

use crate::error::BootstrapError;
use crate::install::{InstallLibrary, ShellStep};
use crate::os_family::OsFamily;

pub const DEFAULT_POD_NETWORK_CIDR: &str = "10.244.0.0/16";
pub const DEFAULT_CNI_MANIFEST_URL: &str =
    "https://github.com/flannel-io/flannel/releases/latest/download/kube-flannel.yml";
pub const ADMIN_KUBECONFIG_PATH: &str = "/etc/kubernetes/admin.conf";

const EVENT_BUFFER: usize = 256;
const LINE_BUFFER: usize = 64;

/// Cluster initialization settings
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub pod_network_cidr: String,
    pub cni_manifest_url: String,
    pub install: InstallLibrary,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            pod_network_cidr: DEFAULT_POD_NETWORK_CIDR.to_string(),
            cni_manifest_url: DEFAULT_CNI_MANIFEST_URL.to_string(),
            install: InstallLibrary::default(),
        }
    }
}

/// Process-wide guard allowing a single bootstrap job at a time
#[derive(Debug, Clone, Default)]
pub struct BootstrapLock {
    inner: Arc<Mutex<()>>,
}

/// Held for the lifetime of one bootstrap pipeline
#[derive(Debug)]
pub struct BootstrapPermit {
    _guard: OwnedMutexGuard<()>,
}

impl BootstrapLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock or fail with [`BootstrapError::ConcurrencyConflict`]. Never waits.
    pub fn try_acquire(&self) -> Result<BootstrapPermit, BootstrapError> {
        self.inner
            .clone()
            .try_lock_owned()
            .map(|guard| BootstrapPermit { _guard: guard })
            .map_err(|_| BootstrapError::ConcurrencyConflict)
    }

    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// Terminal result of a bootstrap job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    /// Names of every step that exited non-zero
    Failed { failed_steps: Vec<String> },
}

/// Lifecycle of a bootstrap job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Succeeded,
    Failed,
}

impl From<&JobOutcome> for JobState {
    fn from(outcome: &JobOutcome) -> Self {
        match outcome {
            JobOutcome::Succeeded => JobState::Succeeded,
            JobOutcome::Failed { .. } => JobState::Failed,
        }
    }
}

/// Progress of a bootstrap job, in emission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapEvent {
    StepStarted { index: usize, total: usize, name: String },
    /// One line of stdout or stderr
    Output(String),
    StepFinished { index: usize, name: String, exit_code: i32 },
    Finished(JobOutcome),
}

/// Handle to a running bootstrap
#[derive(Debug)]
pub struct BootstrapJob {
    family: OsFamily,
    steps: Vec<String>,
    events: mpsc::Receiver<BootstrapEvent>,
    state: watch::Receiver<JobState>,
}

impl BootstrapJob {
    pub fn family(&self) -> OsFamily {
        self.family
    }

    /// Step names in execution order
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Next event; `None` after [`BootstrapEvent::Finished`] has been received
    pub async fn next_event(&mut self) -> Option<BootstrapEvent> {
        self.events.recv().await
    }

    pub fn into_events(self) -> mpsc::Receiver<BootstrapEvent> {
        self.events
    }
}

/// Drives control plane initialization on the local host
pub struct BootstrapOrchestrator {
    executor: Arc<dyn CommandExecutor>,
    family: OsFamily,
    config: BootstrapConfig,
    lock: BootstrapLock,
}

impl BootstrapOrchestrator {
    pub fn new(executor: Arc<dyn CommandExecutor>, family: OsFamily, config: BootstrapConfig) -> Self {
        Self {
            executor,
            family,
            config,
            lock: BootstrapLock::new(),
        }
    }

    /// Share an existing lock instead of the orchestrator's own
    pub fn with_lock(mut self, lock: BootstrapLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn lock(&self) -> &BootstrapLock {
        &self.lock
    }

    pub fn family(&self) -> OsFamily {
        self.family
    }

    /// Full step list for this host
    pub fn pipeline(&self) -> Vec<ShellStep> {
        let mut steps = self.config.install.commands_for(self.family);
        if !self.family.is_supported() {
            return steps;
        }

        steps.push(ShellStep::new(
            "kubeadm-init",
            format!("kubeadm init --pod-network-cidr={}", self.config.pod_network_cidr),
        ));
        steps.push(ShellStep::new(
            "admin-kubeconfig",
            format!(
                r#"TARGET_USER="${{SUDO_USER:-$(id -un)}}"
TARGET_HOME="$(getent passwd "$TARGET_USER" | cut -d: -f6)"
mkdir -p "$TARGET_HOME/.kube"
cp -f {ADMIN_KUBECONFIG_PATH} "$TARGET_HOME/.kube/config"
chown "$(id -u "$TARGET_USER"):$(id -g "$TARGET_USER")" "$TARGET_HOME/.kube/config""#
            ),
        ));
        steps.push(ShellStep::new(
            "network-plugin",
            format!(
                "kubectl --kubeconfig {ADMIN_KUBECONFIG_PATH} apply -f {}",
                self.config.cni_manifest_url
            ),
        ));
        steps
    }

    /// Start a bootstrap job.
    ///
    /// Fails with [`BootstrapError::ConcurrencyConflict`] if one is already
    /// running. The pipeline keeps going if the returned job is dropped.
    pub fn initialize_control_plane(&self) -> Result<BootstrapJob, BootstrapError> {
        let permit = self.lock.try_acquire().inspect_err(|_| {
            warn!("Rejected bootstrap request: another bootstrap is in progress");
        })?;

        let steps = self.pipeline();
        let names = steps.iter().map(|s| s.name.clone()).collect();
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (state_tx, state_rx) = watch::channel(JobState::Running);

        info!(family = %self.family, steps = steps.len(), "Starting control plane bootstrap");
        tokio::spawn(run_pipeline(
            self.executor.clone(),
            steps,
            events_tx,
            state_tx,
            permit,
        ));

        Ok(BootstrapJob {
            family: self.family,
            steps: names,
            events: events_rx,
            state: state_rx,
        })
    }
}

async fn run_pipeline(
    executor: Arc<dyn CommandExecutor>,
    steps: Vec<ShellStep>,
    events: mpsc::Sender<BootstrapEvent>,
    state: watch::Sender<JobState>,
    permit: BootstrapPermit,
) -> JobOutcome {
    let total = steps.len();
    let mut failed_steps = Vec::new();

    for (index, step) in steps.into_iter().enumerate() {
        info!(step = %step.name, "Bootstrap step {}/{}", index + 1, total);
        // Send errors mean the caller went away; keep running
        let _ = events
            .send(BootstrapEvent::StepStarted {
                index,
                total,
                name: step.name.clone(),
            })
            .await;

        let (line_tx, mut line_rx) = mpsc::channel::<String>(LINE_BUFFER);
        let forwarder = {
            let events = events.clone();
            tokio::spawn(async move {
                while let Some(line) = line_rx.recv().await {
                    debug!(target: "bootstrap_output", "{}", line);
                    let _ = events.send(BootstrapEvent::Output(line)).await;
                }
            })
        };

        let result = executor.run_streaming(&step.script, line_tx).await;
        let _ = forwarder.await;

        let exit_code = match result {
            Ok(code) => code,
            Err(e) => {
                error!(step = %step.name, "Bootstrap step could not run: {}", e);
                let _ = events
                    .send(BootstrapEvent::Output(format!("error: {e}")))
                    .await;
                -1
            }
        };
        if exit_code != 0 {
            warn!(step = %step.name, exit_code, "Bootstrap step failed");
            failed_steps.push(step.name.clone());
        }

        let _ = events
            .send(BootstrapEvent::StepFinished {
                index,
                name: step.name,
                exit_code,
            })
            .await;
    }

    let outcome = if failed_steps.is_empty() {
        info!("Control plane bootstrap succeeded");
        JobOutcome::Succeeded
    } else {
        error!(failed = ?failed_steps, "Control plane bootstrap failed");
        JobOutcome::Failed { failed_steps }
    };

    state.send_replace(JobState::from(&outcome));
    // Release before the terminal event so a client reacting to it can start a new job
    drop(permit);
    let _ = events.send(BootstrapEvent::Finished(outcome.clone())).await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_rejects_second_holder() {
        let lock = BootstrapLock::new();
        let permit = lock.try_acquire().unwrap();
        assert!(lock.is_held());
        assert!(matches!(
            lock.clone().try_acquire(),
            Err(BootstrapError::ConcurrencyConflict)
        ));
        drop(permit);
        assert!(!lock.is_held());
        assert!(lock.try_acquire().is_ok());
    }
}
