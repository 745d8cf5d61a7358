//! Worker script synthesizer
//!
//! Renders a [`JoinRecord`] and the install steps for a target family into a
//! self-contained artifact a new machine runs to join the cluster. The shell
//! and cloud-init formats carry the same payload: every install step once,
//! in order, then a kubeadm `JoinConfiguration` and `kubeadm join`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use cluster_client::STRICT_SHELL_ARGS;

use crate::error::{JoinRecordError, UnknownValue, WorkerScriptError};
use crate::install::{InstallLibrary, ShellStep};
use crate::join::JoinRecord;
use crate::os_family::OsFamily;

/// Where the join configuration is written on the worker
pub const JOIN_CONFIG_PATH: &str = "/etc/kubernetes/join-config.yaml";

/// Label applied to every worker joined through Kubestead
pub const WORKER_NODE_LABEL: &str = "kubestead.io/worker=true";

const JOIN_CONFIG_API_VERSION: &str = "kubeadm.k8s.io/v1beta3";
const JOIN_CONFIG_KIND: &str = "JoinConfiguration";
const JOIN_CONFIG_DELIMITER: &str = "KUBESTEAD_JOIN_CONFIG";

/// Output format of a worker artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactFormat {
    /// Bash script (`sh`)
    Shell,
    /// cloud-init user data (`yaml`)
    CloudInit,
}

impl ArtifactFormat {
    pub fn filename(&self) -> &'static str {
        match self {
            ArtifactFormat::Shell => "worker-setup.sh",
            ArtifactFormat::CloudInit => "worker-user-data.yaml",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactFormat::Shell => "text/x-sh",
            ArtifactFormat::CloudInit => "text/yaml",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactFormat::Shell => "sh",
            ArtifactFormat::CloudInit => "yaml",
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactFormat {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sh" => Ok(ArtifactFormat::Shell),
            "yaml" => Ok(ArtifactFormat::CloudInit),
            _ => Err(UnknownValue {
                kind: "artifact type",
                value: s.to_string(),
                expected: "sh, yaml",
            }),
        }
    }
}

/// A rendered artifact ready to be served as a download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerArtifact {
    pub bytes: Vec<u8>,
    pub filename: &'static str,
    pub content_type: &'static str,
}

/// kubeadm `JoinConfiguration` (v1beta3), the subset Kubestead sets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinConfiguration {
    pub api_version: String,
    pub kind: String,
    pub discovery: Discovery,
    pub node_registration: NodeRegistration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discovery {
    pub bootstrap_token: BootstrapTokenDiscovery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapTokenDiscovery {
    pub api_server_endpoint: String,
    pub token: String,
    pub ca_cert_hashes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRegistration {
    #[serde(default)]
    pub kubelet_extra_args: BTreeMap<String, String>,
}

impl JoinConfiguration {
    pub fn from_record(record: &JoinRecord) -> Self {
        Self {
            api_version: JOIN_CONFIG_API_VERSION.to_string(),
            kind: JOIN_CONFIG_KIND.to_string(),
            discovery: Discovery {
                bootstrap_token: BootstrapTokenDiscovery {
                    api_server_endpoint: record.master_address().to_string(),
                    token: record.token().to_string(),
                    ca_cert_hashes: vec![record.prefixed_ca_cert_hash()],
                },
            },
            node_registration: NodeRegistration {
                kubelet_extra_args: BTreeMap::from([(
                    "node-labels".to_string(),
                    WORKER_NODE_LABEL.to_string(),
                )]),
            },
        }
    }

    /// Read the embedded credentials back out
    pub fn to_record(&self) -> Result<JoinRecord, JoinRecordError> {
        let discovery = &self.discovery.bootstrap_token;
        let hash = discovery
            .ca_cert_hashes
            .first()
            .ok_or_else(|| JoinRecordError::InvalidCaCertHash(String::new()))?;
        JoinRecord::new(
            discovery.api_server_endpoint.as_str(),
            discovery.token.as_str(),
            hash,
        )
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// cloud-init `write_files` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFile {
    pub path: String,
    pub owner: String,
    pub permissions: String,
    pub content: String,
}

/// The cloud-init keys Kubestead emits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudConfig {
    pub package_update: bool,
    pub write_files: Vec<WriteFile>,
    pub runcmd: Vec<Vec<String>>,
}

/// Render a worker artifact for `family` using the default install library
pub fn render(
    record: &JoinRecord,
    family: OsFamily,
    format: ArtifactFormat,
) -> Result<WorkerArtifact, WorkerScriptError> {
    render_with(&InstallLibrary::default(), record, family, format)
}

/// Render a worker artifact with a configured install library
pub fn render_with(
    library: &InstallLibrary,
    record: &JoinRecord,
    family: OsFamily,
    format: ArtifactFormat,
) -> Result<WorkerArtifact, WorkerScriptError> {
    let steps = library.commands_for(family);
    let join_config = JoinConfiguration::from_record(record).to_yaml()?;

    let body = match format {
        ArtifactFormat::Shell => shell_script(family, &steps, &join_config),
        ArtifactFormat::CloudInit => cloud_config(&steps, join_config)?,
    };

    Ok(WorkerArtifact {
        bytes: body.into_bytes(),
        filename: format.filename(),
        content_type: format.content_type(),
    })
}

fn shell_script(family: OsFamily, steps: &[ShellStep], join_config: &str) -> String {
    let total = steps.len() + 1;
    let mut script = format!(
        r#"#!/usr/bin/env bash
# Kubestead worker setup ({family})
set -eo pipefail

if [ "$(id -u)" -ne 0 ]; then
  echo "This script must be run as root" >&2
  exit 1
fi
"#
    );

    for (index, step) in steps.iter().enumerate() {
        script.push_str(&format!(
            "\necho \"==> [{}/{total}] {}\"\n{}\n",
            index + 1,
            step.name,
            step.script
        ));
    }

    script.push_str(&format!(
        r#"
echo "==> [{total}/{total}] join-cluster"
mkdir -p /etc/kubernetes
cat <<'{JOIN_CONFIG_DELIMITER}' > {JOIN_CONFIG_PATH}
{join_config}{JOIN_CONFIG_DELIMITER}
chmod 600 {JOIN_CONFIG_PATH}
kubeadm join --config {JOIN_CONFIG_PATH}
"#
    ));
    script
}

fn cloud_config(steps: &[ShellStep], join_config: String) -> Result<String, WorkerScriptError> {
    let mut runcmd: Vec<Vec<String>> = steps
        .iter()
        .map(|step| {
            std::iter::once("bash")
                .chain(STRICT_SHELL_ARGS)
                .chain(std::iter::once(step.script.as_str()))
                .map(String::from)
                .collect()
        })
        .collect();
    runcmd.push(
        ["kubeadm", "join", "--config", JOIN_CONFIG_PATH]
            .into_iter()
            .map(String::from)
            .collect(),
    );

    let config = CloudConfig {
        package_update: true,
        write_files: vec![WriteFile {
            path: JOIN_CONFIG_PATH.to_string(),
            owner: "root:root".to_string(),
            permissions: "0600".to_string(),
            content: join_config,
        }],
        runcmd,
    };

    Ok(format!("#cloud-config\n{}", serde_yaml::to_string(&config)?))
}
