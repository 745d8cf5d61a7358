//! Manager configuration from environment variables

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use gitops::deployment::{
    DEFAULT_APP_NAMESPACE, DEFAULT_GITOPS_NAMESPACE, DEFAULT_TOOLKIT_INSTALL_COMMAND,
};
use gitops::names::is_dns1123_label;
use provisioner::bootstrap::{ADMIN_KUBECONFIG_PATH, DEFAULT_CNI_MANIFEST_URL, DEFAULT_POD_NETWORK_CIDR};
use provisioner::os_family::OS_RELEASE_PATH;
use provisioner::DEFAULT_KUBERNETES_RELEASE;

use crate::error::ControllerError;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_SERVICE_LOOKUP_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    pub listen_addr: SocketAddr,
    pub admin_kubeconfig: PathBuf,
    pub os_release_path: PathBuf,
    /// Kubernetes minor release used for package repositories (e.g. "v1.30")
    pub kubernetes_release: String,
    pub pod_network_cidr: String,
    pub cni_manifest_url: String,
    pub gitops_namespace: String,
    pub app_target_namespace: String,
    /// Catalog file; the built-in catalog is used when unset
    pub catalog_path: Option<PathBuf>,
    pub service_lookup_timeout: Duration,
    pub flux_install_command: String,
}

impl ManagerConfig {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let listen_addr = get("LISTEN_ADDR", DEFAULT_LISTEN_ADDR);
        let listen_addr = listen_addr.parse().map_err(|_| {
            ControllerError::InvalidConfig(format!("LISTEN_ADDR is not a socket address: {listen_addr}"))
        })?;

        let kubernetes_release = get("KUBERNETES_RELEASE", DEFAULT_KUBERNETES_RELEASE);
        if !is_minor_release(&kubernetes_release) {
            return Err(ControllerError::InvalidConfig(format!(
                "KUBERNETES_RELEASE must look like v1.30, got {kubernetes_release}"
            )));
        }

        let gitops_namespace = get("GITOPS_NAMESPACE", DEFAULT_GITOPS_NAMESPACE);
        let app_target_namespace = get("APP_TARGET_NAMESPACE", DEFAULT_APP_NAMESPACE);
        for (key, value) in [
            ("GITOPS_NAMESPACE", &gitops_namespace),
            ("APP_TARGET_NAMESPACE", &app_target_namespace),
        ] {
            if !is_dns1123_label(value) {
                return Err(ControllerError::InvalidConfig(format!(
                    "{key} is not a valid namespace name: {value}"
                )));
            }
        }

        let timeout_ms = get(
            "SERVICE_LOOKUP_TIMEOUT_MS",
            &DEFAULT_SERVICE_LOOKUP_TIMEOUT_MS.to_string(),
        );
        let timeout_ms: u64 = timeout_ms.parse().map_err(|_| {
            ControllerError::InvalidConfig(format!(
                "SERVICE_LOOKUP_TIMEOUT_MS must be a number of milliseconds, got {timeout_ms}"
            ))
        })?;

        Ok(Self {
            listen_addr,
            admin_kubeconfig: PathBuf::from(get("ADMIN_KUBECONFIG", ADMIN_KUBECONFIG_PATH)),
            os_release_path: PathBuf::from(get("OS_RELEASE_PATH", OS_RELEASE_PATH)),
            kubernetes_release,
            pod_network_cidr: get("POD_NETWORK_CIDR", DEFAULT_POD_NETWORK_CIDR),
            cni_manifest_url: get("CNI_MANIFEST_URL", DEFAULT_CNI_MANIFEST_URL),
            gitops_namespace,
            app_target_namespace,
            catalog_path: lookup("CATALOG_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            service_lookup_timeout: Duration::from_millis(timeout_ms),
            flux_install_command: get("FLUX_INSTALL_COMMAND", DEFAULT_TOOLKIT_INSTALL_COMMAND),
        })
    }
}

/// `v<major>.<minor>`
fn is_minor_release(value: &str) -> bool {
    value
        .strip_prefix('v')
        .and_then(|rest| rest.split_once('.'))
        .is_some_and(|(major, minor)| {
            !major.is_empty()
                && !minor.is_empty()
                && major.chars().all(|c| c.is_ascii_digit())
                && minor.chars().all(|c| c.is_ascii_digit())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<ManagerConfig, ControllerError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ManagerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:5000".parse().unwrap());
        assert_eq!(config.admin_kubeconfig, PathBuf::from("/etc/kubernetes/admin.conf"));
        assert_eq!(config.os_release_path, PathBuf::from("/etc/os-release"));
        assert_eq!(config.kubernetes_release, "v1.30");
        assert_eq!(config.pod_network_cidr, "10.244.0.0/16");
        assert_eq!(config.gitops_namespace, "flux-system");
        assert_eq!(config.app_target_namespace, "default");
        assert_eq!(config.catalog_path, None);
        assert_eq!(config.service_lookup_timeout, Duration::from_secs(2));
        assert!(config.flux_install_command.contains("flux install"));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("LISTEN_ADDR", "127.0.0.1:8080"),
            ("KUBERNETES_RELEASE", "v1.31"),
            ("CATALOG_PATH", "/etc/kubestead/catalog.yaml"),
            ("SERVICE_LOOKUP_TIMEOUT_MS", "250"),
            ("GITOPS_NAMESPACE", ""),
        ])
        .unwrap();
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.kubernetes_release, "v1.31");
        assert_eq!(config.catalog_path, Some(PathBuf::from("/etc/kubestead/catalog.yaml")));
        assert_eq!(config.service_lookup_timeout, Duration::from_millis(250));
        assert_eq!(config.gitops_namespace, "flux-system");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for pairs in [
            [("LISTEN_ADDR", "not-an-addr")],
            [("KUBERNETES_RELEASE", "1.30")],
            [("SERVICE_LOOKUP_TIMEOUT_MS", "2s")],
            [("APP_TARGET_NAMESPACE", "Apps")],
        ] {
            assert!(
                matches!(config(&pairs), Err(ControllerError::InvalidConfig(_))),
                "{pairs:?}"
            );
        }
    }
}
