//! OS family resolution
//!
//! Every install script branches on the package manager family, so the host
//! is classified once from its os-release file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::UnknownValue;

/// Default os-release location
pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Package manager family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    /// apt based (Debian, Ubuntu and derivatives)
    Debian,
    /// dnf/yum based (RHEL, CentOS, Rocky, Alma, Fedora)
    Rhel,
    /// zypper based (SLES, openSUSE)
    Suse,
    /// No automated install path
    Unknown,
}

impl OsFamily {
    pub const ALL: [OsFamily; 4] = [OsFamily::Debian, OsFamily::Rhel, OsFamily::Suse, OsFamily::Unknown];

    /// Classify a host. `ID` wins; `ID_LIKE` is only consulted when `ID` is not recognized.
    pub fn from_os_release(release: &OsRelease) -> OsFamily {
        let id = release.id().to_lowercase();
        if let Some(family) = Self::from_id(&id) {
            return family;
        }

        release
            .id_like()
            .split_whitespace()
            .find_map(|like| Self::from_like(&like.to_lowercase()))
            .unwrap_or(OsFamily::Unknown)
    }

    fn from_id(id: &str) -> Option<OsFamily> {
        match id {
            "ubuntu" | "debian" | "pop" | "kali" | "linuxmint" | "raspbian" => Some(OsFamily::Debian),
            "rhel" | "centos" | "rocky" | "almalinux" | "fedora" | "ol" => Some(OsFamily::Rhel),
            "sles" | "sled" | "opensuse" | "opensuse-leap" | "opensuse-tumbleweed" => Some(OsFamily::Suse),
            _ => None,
        }
    }

    fn from_like(like: &str) -> Option<OsFamily> {
        match like {
            "debian" | "ubuntu" => Some(OsFamily::Debian),
            "rhel" | "centos" | "fedora" => Some(OsFamily::Rhel),
            "suse" | "opensuse" => Some(OsFamily::Suse),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Debian => "debian",
            OsFamily::Rhel => "rhel",
            OsFamily::Suse => "suse",
            OsFamily::Unknown => "unknown",
        }
    }

    /// Whether the install library has an automated path for this family
    pub fn is_supported(&self) -> bool {
        !matches!(self, OsFamily::Unknown)
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsFamily {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OsFamily::ALL
            .into_iter()
            .find(|family| family.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownValue {
                kind: "OS family",
                value: s.to_string(),
                expected: "debian, rhel, suse, unknown",
            })
    }
}

/// Parsed os-release file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsRelease {
    fields: BTreeMap<String, String>,
}

impl Default for OsRelease {
    fn default() -> Self {
        let fields = [
            ("ID", "unknown"),
            ("VERSION_ID", "unknown"),
            ("PRETTY_NAME", "Unknown Linux"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { fields }
    }
}

impl OsRelease {
    /// Parse `KEY=VALUE` lines. Quotes are stripped; comments, blank and
    /// malformed lines are skipped. Missing keys keep their defaults.
    pub fn parse(content: &str) -> OsRelease {
        let mut release = OsRelease::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            release
                .fields
                .insert(key.trim().to_string(), value.to_string());
        }
        release
    }

    /// Read and parse an os-release file, falling back to defaults if it is
    /// missing or unreadable
    pub fn read(path: impl AsRef<Path>) -> OsRelease {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                debug!("Read OS release from {}", path.display());
                OsRelease::parse(&content)
            }
            Err(e) => {
                warn!("Could not read {}: {}; assuming unknown OS", path.display(), e);
                OsRelease::default()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn id(&self) -> &str {
        self.get("ID").unwrap_or("unknown")
    }

    pub fn id_like(&self) -> &str {
        self.get("ID_LIKE").unwrap_or_default()
    }

    pub fn version_id(&self) -> &str {
        self.get("VERSION_ID").unwrap_or("unknown")
    }

    pub fn pretty_name(&self) -> &str {
        self.get("PRETTY_NAME").unwrap_or("Unknown Linux")
    }

    pub fn family(&self) -> OsFamily {
        OsFamily::from_os_release(self)
    }
}

/// Host identity as reported to the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsInfo {
    pub id: String,
    pub version_id: String,
    pub pretty_name: String,
    pub family: OsFamily,
}

impl From<&OsRelease> for OsInfo {
    fn from(release: &OsRelease) -> Self {
        Self {
            id: release.id().to_string(),
            version_id: release.version_id().to_string(),
            pretty_name: release.pretty_name().to_string(),
            family: release.family(),
        }
    }
}
