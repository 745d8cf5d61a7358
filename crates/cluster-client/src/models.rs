//! Cluster data models
//!
//! Projections of cluster state returned to API callers.

use serde::{Deserialize, Serialize};

/// Node role as shown in the dashboard
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeRole {
    Master,
    Worker,
}

/// Node readiness as reported by the kubelet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeStatus {
    Ready,
    NotReady,
}

/// One row of the node listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    pub name: String,
    pub role: NodeRole,
    pub status: NodeStatus,
    /// First `InternalIP` address, "N/A" if the node reports none
    pub internal_ip: String,
    /// CPU capacity (e.g., "4")
    pub cpu: String,
    /// Memory capacity (e.g., "16318624Ki")
    pub memory: String,
}

/// Result of a finished host command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    /// stdout followed by stderr
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
