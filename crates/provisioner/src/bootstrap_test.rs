//! Unit tests for the bootstrap orchestrator

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cluster_client::MockExecutor;

    use crate::bootstrap::*;
    use crate::error::BootstrapError;
    use crate::os_family::OsFamily;

    fn orchestrator(executor: &MockExecutor, family: OsFamily) -> BootstrapOrchestrator {
        BootstrapOrchestrator::new(Arc::new(executor.clone()), family, BootstrapConfig::default())
    }

    async fn drain(job: &mut BootstrapJob) -> Vec<BootstrapEvent> {
        let mut events = Vec::new();
        while let Some(event) = job.next_event().await {
            events.push(event);
        }
        events
    }

    fn started(events: &[BootstrapEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                BootstrapEvent::StepStarted { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_pipeline_appends_cluster_init_steps() {
        let executor = MockExecutor::new();
        let steps: Vec<String> = orchestrator(&executor, OsFamily::Debian)
            .pipeline()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(
            steps,
            vec![
                "disable-swap",
                "kernel-modules",
                "sysctl-bridge",
                "container-runtime",
                "kubernetes-packages",
                "kubeadm-init",
                "admin-kubeconfig",
                "network-plugin",
            ]
        );
    }

    #[test]
    fn test_pipeline_uses_configured_cidr_and_cni() {
        let executor = MockExecutor::new();
        let config = BootstrapConfig {
            pod_network_cidr: "192.168.0.0/16".to_string(),
            cni_manifest_url: "https://example.com/calico.yaml".to_string(),
            ..Default::default()
        };
        let pipeline = BootstrapOrchestrator::new(Arc::new(executor), OsFamily::Rhel, config).pipeline();
        let init = pipeline.iter().find(|s| s.name == "kubeadm-init").unwrap();
        assert_eq!(init.script, "kubeadm init --pod-network-cidr=192.168.0.0/16");
        let cni = pipeline.iter().find(|s| s.name == "network-plugin").unwrap();
        assert!(cni.script.ends_with("apply -f https://example.com/calico.yaml"));
    }

    #[tokio::test]
    async fn test_successful_job_streams_every_step() {
        let executor = MockExecutor::new();
        executor.set_output(&["ok"]);
        let orchestrator = orchestrator(&executor, OsFamily::Debian);

        let mut job = orchestrator.initialize_control_plane().unwrap();
        assert_eq!(job.family(), OsFamily::Debian);
        let names = job.steps().to_vec();
        let events = drain(&mut job).await;

        assert_eq!(started(&events), names);
        assert_eq!(
            events.iter().filter(|e| matches!(e, BootstrapEvent::Output(l) if l == "ok")).count(),
            names.len()
        );
        assert_eq!(events.last(), Some(&BootstrapEvent::Finished(JobOutcome::Succeeded)));
        assert_eq!(job.state(), JobState::Succeeded);
        assert_eq!(executor.scripts().len(), names.len());
        assert!(!orchestrator.lock().is_held());
    }

    #[tokio::test]
    async fn test_failed_step_does_not_stop_pipeline() {
        let executor = MockExecutor::new();
        executor.fail_when_contains("kubeadm init", 1);
        let orchestrator = orchestrator(&executor, OsFamily::Suse);

        let mut job = orchestrator.initialize_control_plane().unwrap();
        let events = drain(&mut job).await;

        assert!(events.contains(&BootstrapEvent::StepFinished {
            index: 5,
            name: "kubeadm-init".to_string(),
            exit_code: 1,
        }));
        assert!(started(&events).contains(&"network-plugin".to_string()));
        assert_eq!(
            events.last(),
            Some(&BootstrapEvent::Finished(JobOutcome::Failed {
                failed_steps: vec!["kubeadm-init".to_string()],
            }))
        );
        assert_eq!(job.state(), JobState::Failed);
    }

    #[tokio::test]
    async fn test_unknown_family_runs_manual_step_only() {
        let executor = MockExecutor::new();
        executor.fail_when_contains("No automated install path", 1);
        let orchestrator = orchestrator(&executor, OsFamily::Unknown);

        let mut job = orchestrator.initialize_control_plane().unwrap();
        assert_eq!(job.steps(), ["manual-install".to_string()]);
        let events = drain(&mut job).await;

        assert_eq!(executor.scripts().len(), 1);
        assert!(matches!(
            events.last(),
            Some(BootstrapEvent::Finished(JobOutcome::Failed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_second_bootstrap_is_rejected_while_running() {
        let executor = MockExecutor::gated();
        let orchestrator = orchestrator(&executor, OsFamily::Debian);

        let mut first = orchestrator.initialize_control_plane().unwrap();
        executor.wait_for_scripts(1).await;

        assert!(matches!(
            orchestrator.initialize_control_plane(),
            Err(BootstrapError::ConcurrencyConflict)
        ));
        // No second pipeline was started
        assert_eq!(executor.scripts().len(), 1);
        assert_eq!(first.state(), JobState::Running);

        executor.open_gate();
        let events = drain(&mut first).await;
        assert_eq!(events.last(), Some(&BootstrapEvent::Finished(JobOutcome::Succeeded)));

        let mut second = orchestrator.initialize_control_plane().unwrap();
        drain(&mut second).await;
        assert_eq!(second.state(), JobState::Succeeded);
    }

    #[tokio::test]
    async fn test_shared_lock_spans_orchestrators() {
        let executor = MockExecutor::gated();
        let lock = BootstrapLock::new();
        let a = orchestrator(&executor, OsFamily::Debian).with_lock(lock.clone());
        let b = orchestrator(&executor, OsFamily::Debian).with_lock(lock.clone());

        let _job = a.initialize_control_plane().unwrap();
        assert!(matches!(
            b.initialize_control_plane(),
            Err(BootstrapError::ConcurrencyConflict)
        ));
        executor.open_gate();
    }

    #[tokio::test]
    async fn test_dropped_job_still_completes_and_releases_lock() {
        let executor = MockExecutor::new();
        executor.set_output(&["line one", "line two"]);
        let orchestrator = orchestrator(&executor, OsFamily::Rhel);

        let job = orchestrator.initialize_control_plane().unwrap();
        let total = job.steps().len();
        drop(job);

        executor.wait_for_scripts(total).await;
        while orchestrator.lock().is_held() {
            tokio::task::yield_now().await;
        }
        assert!(orchestrator.initialize_control_plane().is_ok());
    }
}
