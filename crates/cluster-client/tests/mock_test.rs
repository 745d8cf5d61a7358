//! Tests for the in-memory collaborators
//!
//! Other crates build their unit tests on these mocks, so their recorded
//! behavior is pinned down here.

use std::time::Duration;

use cluster_client::{
    ClusterError, CommandExecutor, ControlPlane, MockControlPlane, MockExecutor, NodeRole,
    NodeStatus, NodeSummary,
};
use crds::{Kustomization, ReleaseManifest, ReleaseParams, RECONCILE_REQUEST_ANNOTATION};
use tokio::sync::mpsc;

fn manifest(name: &str) -> ReleaseManifest {
    ReleaseManifest::build(ReleaseParams {
        name,
        gitops_namespace: "flux-system",
        target_namespace: "default",
        repository_name: "bitnami",
        repository_url: "https://charts.bitnami.com/bitnami",
        chart: name,
        version: "1.0.0",
        values: None,
    })
}

#[tokio::test]
async fn test_apply_release_records_manifest_and_release() {
    let control_plane = MockControlPlane::new();
    control_plane.apply_release(&manifest("kafka")).await.unwrap();

    assert_eq!(control_plane.applied_manifests().len(), 1);
    assert_eq!(
        control_plane.list_helm_releases("flux-system").await.unwrap(),
        vec!["kafka".to_string()]
    );
    assert!(control_plane.list_helm_releases("default").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_apply_records_nothing() {
    let control_plane = MockControlPlane::new();
    control_plane.fail_applies_with("admission webhook denied");

    let err = control_plane.apply_release(&manifest("kafka")).await.unwrap_err();
    assert!(matches!(err, ClusterError::Api(ref m) if m.contains("denied")));
    assert!(control_plane.applied_manifests().is_empty());
}

#[tokio::test]
async fn test_delete_helm_release_reports_existence() {
    let control_plane = MockControlPlane::new();
    control_plane.insert_release("flux-system", "trino");

    assert!(control_plane.delete_helm_release("flux-system", "trino").await.unwrap());
    assert!(!control_plane.delete_helm_release("flux-system", "trino").await.unwrap());
}

#[tokio::test]
async fn test_delete_node() {
    let control_plane = MockControlPlane::new();
    control_plane.add_node(NodeSummary {
        name: "worker-1".to_string(),
        role: NodeRole::Worker,
        status: NodeStatus::Ready,
        internal_ip: "10.0.0.21".to_string(),
        cpu: "2".to_string(),
        memory: "4026512Ki".to_string(),
    });

    control_plane.delete_node("worker-1").await.unwrap();
    assert_eq!(control_plane.deleted_nodes(), vec!["worker-1".to_string()]);
    assert!(matches!(
        control_plane.delete_node("worker-1").await,
        Err(ClusterError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_request_reconcile_stamps_annotation() {
    let control_plane = MockControlPlane::new();
    control_plane.add_kustomization(Kustomization::for_source("apps", "flux-system", "apps", "./"));

    control_plane.request_reconcile("flux-system", "apps").await.unwrap();
    let annotated = &control_plane.kustomizations()[0];
    assert!(annotated
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(RECONCILE_REQUEST_ANNOTATION)));

    assert!(matches!(
        control_plane.request_reconcile("flux-system", "missing").await,
        Err(ClusterError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_join_command_failure() {
    let control_plane = MockControlPlane::new();
    assert!(matches!(
        control_plane.print_join_command().await,
        Err(ClusterError::CommandFailed { .. })
    ));
    assert_eq!(control_plane.join_requests(), 1);
}

#[tokio::test]
async fn test_service_port_delay() {
    let control_plane = MockControlPlane::new();
    control_plane.set_service_port("default", "trino", 30080);
    control_plane.set_service_delay(Duration::from_millis(200));

    let lookup = tokio::time::timeout(
        Duration::from_millis(20),
        control_plane.service_node_port("default", "trino"),
    )
    .await;
    assert!(lookup.is_err());
}

#[tokio::test]
async fn test_executor_failures_and_output() {
    let executor = MockExecutor::new();
    executor.fail_when_contains("kubeadm init", 1);
    executor.set_output(&["step output"]);

    let (tx, mut rx) = mpsc::channel(4);
    assert_eq!(executor.run_streaming("kubeadm init --pod-network-cidr=10.244.0.0/16", tx).await.unwrap(), 1);
    assert_eq!(rx.recv().await.as_deref(), Some("step output"));

    let output = executor.run("swapoff -a").await.unwrap();
    assert!(output.success());
    assert_eq!(executor.scripts().len(), 2);
}

#[tokio::test]
async fn test_gated_executor_blocks_until_opened() {
    let executor = MockExecutor::gated();
    let runner = executor.clone();
    let handle = tokio::spawn(async move {
        let (tx, _rx) = mpsc::channel(4);
        runner.run_streaming("swapoff -a", tx).await
    });

    executor.wait_for_scripts(1).await;
    assert!(!handle.is_finished());

    executor.open_gate();
    assert_eq!(handle.await.unwrap().unwrap(), 0);
}
