//! Kubestead Cluster Manager
//!
//! Single-binary manager running on the future control plane host:
//! - Bootstraps the control plane (`kubeadm init`) with streamed progress
//! - Issues worker join scripts and cloud-init documents
//! - Installs marketplace applications and manages Git sources through Flux
//!
//! The server starts before the cluster exists; the Kubernetes client is built
//! on first use from the admin kubeconfig.

mod api;
mod config;
mod error;
mod state;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cluster_client::{KubeControlPlane, ShellExecutor};
use gitops::Catalog;
use provisioner::OsRelease;

use crate::config::ManagerConfig;
use crate::error::ControllerError;
use crate::state::AppState;

const DEFAULT_LOG_FILTER: &str = "info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    info!("Starting Kubestead Cluster Manager");

    let config = ManagerConfig::from_env()?;
    info!("Configuration:");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Admin kubeconfig: {}", config.admin_kubeconfig.display());
    info!("  Kubernetes release: {}", config.kubernetes_release);
    info!("  GitOps namespace: {}", config.gitops_namespace);

    let catalog = load_catalog(&config)?;
    let os_release = OsRelease::read(&config.os_release_path);
    info!(
        os = %os_release.pretty_name(),
        family = %os_release.family(),
        "Detected host operating system"
    );

    let executor = Arc::new(ShellExecutor::new());
    let control_plane = Arc::new(KubeControlPlane::new(&config.admin_kubeconfig, executor.clone()));
    let state = AppState::new(&config, control_plane, executor, catalog, os_release);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!("Listening on http://{}", config.listen_addr);

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Cluster manager stopped");
    Ok(())
}

fn load_catalog(config: &ManagerConfig) -> Result<Catalog, ControllerError> {
    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path)?,
        None => Catalog::builtin()?,
    };
    info!("Catalog has {} applications", catalog.len());
    Ok(catalog)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
