//! Mock collaborators for unit testing
//!
//! In-memory implementations of [`ControlPlane`] and [`CommandExecutor`] that
//! record every call, so tests can assert on what would have been sent to the
//! cluster or the host.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};

use crds::{GitRepository, Kustomization, ReleaseManifest, RECONCILE_REQUEST_ANNOTATION};

use crate::control_plane_trait::ControlPlane;
use crate::error::{ClusterError, ExecError};
use crate::exec::CommandExecutor;
use crate::models::{CommandOutput, NodeSummary};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct ControlPlaneState {
    initialized: bool,
    gitops_installed: bool,
    nodes: Vec<NodeSummary>,
    deleted_nodes: Vec<String>,
    join_command: Option<String>,
    join_requests: usize,
    // (namespace, name)
    releases: BTreeSet<(String, String)>,
    applied_manifests: Vec<ReleaseManifest>,
    apply_error: Option<String>,
    service_ports: HashMap<(String, String), u16>,
    service_delay: Option<Duration>,
    git_repositories: Vec<GitRepository>,
    kustomizations: Vec<Kustomization>,
    reconcile_requests: Vec<String>,
}

/// Mock control plane
///
/// Starts uninitialized, without Flux, with no nodes or releases.
#[derive(Clone, Default)]
pub struct MockControlPlane {
    state: Arc<Mutex<ControlPlaneState>>,
}

impl MockControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_initialized(&self, initialized: bool) {
        locked(&self.state).initialized = initialized;
    }

    pub fn set_gitops_installed(&self, installed: bool) {
        locked(&self.state).gitops_installed = installed;
    }

    pub fn add_node(&self, node: NodeSummary) {
        locked(&self.state).nodes.push(node);
    }

    /// Raw output returned by `print_join_command`; `None` makes it fail
    pub fn set_join_command(&self, command: Option<&str>) {
        locked(&self.state).join_command = command.map(str::to_string);
    }

    pub fn insert_release(&self, namespace: &str, name: &str) {
        locked(&self.state)
            .releases
            .insert((namespace.to_string(), name.to_string()));
    }

    /// Make every subsequent apply fail with `message`
    pub fn fail_applies_with(&self, message: &str) {
        locked(&self.state).apply_error = Some(message.to_string());
    }

    pub fn set_service_port(&self, namespace: &str, service: &str, port: u16) {
        locked(&self.state)
            .service_ports
            .insert((namespace.to_string(), service.to_string()), port);
    }

    /// Delay every service lookup, for timeout tests
    pub fn set_service_delay(&self, delay: Duration) {
        locked(&self.state).service_delay = Some(delay);
    }

    pub fn add_git_repository(&self, source: GitRepository) {
        locked(&self.state).git_repositories.push(source);
    }

    pub fn add_kustomization(&self, kustomization: Kustomization) {
        locked(&self.state).kustomizations.push(kustomization);
    }

    // Recorded calls

    pub fn applied_manifests(&self) -> Vec<ReleaseManifest> {
        locked(&self.state).applied_manifests.clone()
    }

    pub fn deleted_nodes(&self) -> Vec<String> {
        locked(&self.state).deleted_nodes.clone()
    }

    pub fn join_requests(&self) -> usize {
        locked(&self.state).join_requests
    }

    pub fn reconcile_requests(&self) -> Vec<String> {
        locked(&self.state).reconcile_requests.clone()
    }

    pub fn git_repositories(&self) -> Vec<GitRepository> {
        locked(&self.state).git_repositories.clone()
    }

    pub fn kustomizations(&self) -> Vec<Kustomization> {
        locked(&self.state).kustomizations.clone()
    }

    pub fn has_release(&self, namespace: &str, name: &str) -> bool {
        locked(&self.state)
            .releases
            .contains(&(namespace.to_string(), name.to_string()))
    }

    fn apply_error(&self) -> Result<(), ClusterError> {
        match &locked(&self.state).apply_error {
            Some(message) => Err(ClusterError::Api(message.clone())),
            None => Ok(()),
        }
    }
}

fn object_key(namespace: Option<&String>, name: Option<&String>) -> (String, String) {
    (
        namespace.cloned().unwrap_or_default(),
        name.cloned().unwrap_or_default(),
    )
}

#[async_trait::async_trait]
impl ControlPlane for MockControlPlane {
    async fn is_initialized(&self) -> bool {
        locked(&self.state).initialized
    }

    async fn list_nodes(&self) -> Result<Vec<NodeSummary>, ClusterError> {
        Ok(locked(&self.state).nodes.clone())
    }

    async fn delete_node(&self, name: &str) -> Result<(), ClusterError> {
        let mut state = locked(&self.state);
        let before = state.nodes.len();
        state.nodes.retain(|node| node.name != name);
        if state.nodes.len() == before {
            return Err(ClusterError::NotFound(format!("node {name}")));
        }
        state.deleted_nodes.push(name.to_string());
        Ok(())
    }

    async fn print_join_command(&self) -> Result<String, ClusterError> {
        let mut state = locked(&self.state);
        state.join_requests += 1;
        state
            .join_command
            .clone()
            .ok_or_else(|| ClusterError::CommandFailed {
                exit_code: 1,
                output: "failed to create bootstrap token".to_string(),
            })
    }

    async fn gitops_installed(&self) -> Result<bool, ClusterError> {
        Ok(locked(&self.state).gitops_installed)
    }

    async fn list_helm_releases(&self, namespace: &str) -> Result<Vec<String>, ClusterError> {
        Ok(locked(&self.state)
            .releases
            .iter()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect())
    }

    async fn apply_release(&self, manifest: &ReleaseManifest) -> Result<(), ClusterError> {
        self.apply_error()?;
        let key = object_key(
            manifest.release.metadata.namespace.as_ref(),
            manifest.release.metadata.name.as_ref(),
        );
        let mut state = locked(&self.state);
        state.releases.insert(key);
        state.applied_manifests.push(manifest.clone());
        Ok(())
    }

    async fn delete_helm_release(&self, namespace: &str, name: &str) -> Result<bool, ClusterError> {
        Ok(locked(&self.state)
            .releases
            .remove(&(namespace.to_string(), name.to_string())))
    }

    async fn apply_git_repository(&self, source: &GitRepository) -> Result<(), ClusterError> {
        self.apply_error()?;
        let mut state = locked(&self.state);
        state
            .git_repositories
            .retain(|existing| existing.metadata.name != source.metadata.name);
        state.git_repositories.push(source.clone());
        Ok(())
    }

    async fn apply_kustomization(&self, kustomization: &Kustomization) -> Result<(), ClusterError> {
        self.apply_error()?;
        let mut state = locked(&self.state);
        state
            .kustomizations
            .retain(|existing| existing.metadata.name != kustomization.metadata.name);
        state.kustomizations.push(kustomization.clone());
        Ok(())
    }

    async fn list_git_repositories(&self, namespace: &str) -> Result<Vec<GitRepository>, ClusterError> {
        Ok(locked(&self.state)
            .git_repositories
            .iter()
            .filter(|source| source.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn list_kustomizations(&self, namespace: &str) -> Result<Vec<Kustomization>, ClusterError> {
        Ok(locked(&self.state)
            .kustomizations
            .iter()
            .filter(|k| k.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn request_reconcile(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let mut state = locked(&self.state);
        let kustomization = state
            .kustomizations
            .iter_mut()
            .find(|k| {
                k.metadata.namespace.as_deref() == Some(namespace)
                    && k.metadata.name.as_deref() == Some(name)
            })
            .ok_or_else(|| ClusterError::NotFound(format!("kustomization {namespace}/{name}")))?;
        kustomization
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(RECONCILE_REQUEST_ANNOTATION.to_string(), "mock".to_string());
        state.reconcile_requests.push(name.to_string());
        Ok(())
    }

    async fn service_node_port(&self, namespace: &str, service: &str) -> Result<Option<u16>, ClusterError> {
        let delay = locked(&self.state).service_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(locked(&self.state)
            .service_ports
            .get(&(namespace.to_string(), service.to_string()))
            .copied())
    }
}

#[derive(Default)]
struct ExecutorState {
    scripts: Vec<String>,
    // (needle, exit code): any script containing needle exits with code
    failures: Vec<(String, i32)>,
    output: Vec<String>,
}

/// Mock command executor
///
/// Records every script. Scripts exit 0 unless registered with
/// [`MockExecutor::fail_when_contains`]. A gated executor blocks every
/// streaming run until [`MockExecutor::open_gate`] is called.
#[derive(Clone, Default)]
pub struct MockExecutor {
    state: Arc<Mutex<ExecutorState>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor whose streaming runs wait for [`MockExecutor::open_gate`]
    pub fn gated() -> Self {
        Self {
            state: Arc::default(),
            gate: Some(Arc::new(Semaphore::new(0))),
        }
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn fail_when_contains(&self, needle: &str, exit_code: i32) {
        locked(&self.state)
            .failures
            .push((needle.to_string(), exit_code));
    }

    /// Lines emitted by every run
    pub fn set_output(&self, lines: &[&str]) {
        locked(&self.state).output = lines.iter().map(|l| l.to_string()).collect();
    }

    pub fn scripts(&self) -> Vec<String> {
        locked(&self.state).scripts.clone()
    }

    /// Wait until at least `count` scripts have started
    pub async fn wait_for_scripts(&self, count: usize) {
        while locked(&self.state).scripts.len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn record(&self, script: &str) -> (i32, Vec<String>) {
        let mut state = locked(&self.state);
        state.scripts.push(script.to_string());
        let exit_code = state
            .failures
            .iter()
            .find(|(needle, _)| script.contains(needle.as_str()))
            .map(|(_, code)| *code)
            .unwrap_or(0);
        (exit_code, state.output.clone())
    }
}

#[async_trait::async_trait]
impl CommandExecutor for MockExecutor {
    async fn run(&self, script: &str) -> Result<CommandOutput, ExecError> {
        let (exit_code, output) = self.record(script);
        Ok(CommandOutput {
            exit_code,
            output: output.join("\n"),
        })
    }

    async fn run_streaming(&self, script: &str, sink: mpsc::Sender<String>) -> Result<i32, ExecError> {
        let (exit_code, output) = self.record(script);
        if let Some(gate) = &self.gate {
            // Permit returns to the semaphore on drop, so one open_gate releases all runs
            let _permit = gate.acquire().await;
        }
        for line in output {
            let _ = sink.send(line).await;
        }
        Ok(exit_code)
    }
}
