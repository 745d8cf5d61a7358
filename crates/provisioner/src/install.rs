//! Install command library
//!
//! Declarative per-family host preparation steps. Nothing here executes a
//! command; the bootstrap orchestrator and the worker script renderer decide
//! how the steps are run. Scripts assume root and run under `bash -eo pipefail`,
//! so commands allowed to fail carry an explicit `|| true`.

use serde::Serialize;

use crate::os_family::OsFamily;

/// Kubernetes package stream used when none is configured
pub const DEFAULT_KUBERNETES_RELEASE: &str = "v1.30";

/// One named shell snippet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellStep {
    pub name: String,
    pub script: String,
}

impl ShellStep {
    pub fn new(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: script.into(),
        }
    }
}

/// Steps for `family` from the default package stream
pub fn commands_for(family: OsFamily) -> Vec<ShellStep> {
    InstallLibrary::default().commands_for(family)
}

/// Install steps bound to a Kubernetes package stream (e.g., "v1.30")
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLibrary {
    kubernetes_release: String,
}

impl Default for InstallLibrary {
    fn default() -> Self {
        Self::new(DEFAULT_KUBERNETES_RELEASE)
    }
}

impl InstallLibrary {
    pub fn new(kubernetes_release: impl Into<String>) -> Self {
        Self {
            kubernetes_release: kubernetes_release.into(),
        }
    }

    pub fn kubernetes_release(&self) -> &str {
        &self.kubernetes_release
    }

    /// Ordered host preparation steps for `family`.
    ///
    /// `Unknown` yields a single `manual-install` step that prints
    /// instructions and exits non-zero.
    pub fn commands_for(&self, family: OsFamily) -> Vec<ShellStep> {
        let (runtime, packages) = match family {
            OsFamily::Debian => (DEBIAN_CONTAINERD, self.debian_packages()),
            OsFamily::Rhel => (RHEL_CONTAINERD, self.rhel_packages()),
            OsFamily::Suse => (SUSE_CONTAINERD, self.suse_packages()),
            OsFamily::Unknown => return vec![self.manual_install()],
        };

        vec![
            ShellStep::new("disable-swap", DISABLE_SWAP),
            ShellStep::new("kernel-modules", KERNEL_MODULES),
            ShellStep::new("sysctl-bridge", SYSCTL_BRIDGE),
            ShellStep::new("container-runtime", format!("{runtime}\n{CONTAINERD_CONFIG}")),
            ShellStep::new("kubernetes-packages", packages),
        ]
    }

    fn repo_base(&self) -> String {
        format!("https://pkgs.k8s.io/core:/stable:/{}", self.kubernetes_release)
    }

    fn debian_packages(&self) -> String {
        let base = self.repo_base();
        format!(
            r#"rm -f /etc/apt/sources.list.d/kubernetes.list
apt-get update
apt-get install -y apt-transport-https ca-certificates curl gpg
install -m 0755 -d /etc/apt/keyrings
curl -fsSL {base}/deb/Release.key | gpg --dearmor --yes -o /etc/apt/keyrings/kubernetes-apt-keyring.gpg
echo 'deb [signed-by=/etc/apt/keyrings/kubernetes-apt-keyring.gpg] {base}/deb/ /' > /etc/apt/sources.list.d/kubernetes.list
apt-get update
apt-get install -y kubelet kubeadm kubectl
apt-mark hold kubelet kubeadm kubectl
systemctl enable --now kubelet"#
        )
    }

    fn rhel_packages(&self) -> String {
        let base = self.repo_base();
        format!(
            r#"setenforce 0 || true
if [ -f /etc/selinux/config ]; then
  sed -i 's/^SELINUX=enforcing$/SELINUX=permissive/' /etc/selinux/config
fi
cat <<'EOF' > /etc/yum.repos.d/kubernetes.repo
[kubernetes]
name=Kubernetes
baseurl={base}/rpm/
enabled=1
gpgcheck=1
gpgkey={base}/rpm/repodata/repomd.xml.key
exclude=kubelet kubeadm kubectl cri-tools kubernetes-cni
EOF
dnf install -y kubelet kubeadm kubectl --disableexcludes=kubernetes
systemctl enable --now kubelet"#
        )
    }

    fn suse_packages(&self) -> String {
        let base = self.repo_base();
        format!(
            r#"zypper --non-interactive removerepo kubernetes || true
zypper --non-interactive addrepo --refresh --check {base}/rpm/ kubernetes
zypper --non-interactive --gpg-auto-import-keys refresh
zypper --non-interactive install -y kubelet kubeadm kubectl
zypper --non-interactive addlock kubelet kubeadm kubectl
systemctl enable --now kubelet"#
        )
    }

    fn manual_install(&self) -> ShellStep {
        ShellStep::new(
            "manual-install",
            format!(
                r#"echo "No automated install path for this operating system."
echo "Install containerd and kubelet, kubeadm, kubectl ({release}) manually, then re-run:"
echo "  https://kubernetes.io/docs/setup/production-environment/tools/kubeadm/install-kubeadm/"
exit 1"#,
                release = self.kubernetes_release
            ),
        )
    }
}

const DISABLE_SWAP: &str = r#"swapoff -a
sed -i '/ swap / s/^\(.*\)$/#\1/g' /etc/fstab"#;

const KERNEL_MODULES: &str = r#"cat <<'EOF' > /etc/modules-load.d/k8s.conf
overlay
br_netfilter
EOF
modprobe overlay
modprobe br_netfilter"#;

const SYSCTL_BRIDGE: &str = r#"cat <<'EOF' > /etc/sysctl.d/k8s.conf
net.bridge.bridge-nf-call-iptables  = 1
net.bridge.bridge-nf-call-ip6tables = 1
net.ipv4.ip_forward                 = 1
EOF
sysctl --system"#;

const DEBIAN_CONTAINERD: &str = r#"apt-get update
apt-get install -y ca-certificates curl gnupg
install -m 0755 -d /etc/apt/keyrings
. /etc/os-release
case "$ID" in
  ubuntu|debian) DOCKER_DISTRO="$ID" ;;
  *) case "$ID_LIKE" in *ubuntu*) DOCKER_DISTRO=ubuntu ;; *) DOCKER_DISTRO=debian ;; esac ;;
esac
CODENAME="${UBUNTU_CODENAME:-$VERSION_CODENAME}"
if [ "$CODENAME" = "trixie" ] || [ "$CODENAME" = "sid" ]; then CODENAME=bookworm; fi
curl -fsSL "https://download.docker.com/linux/$DOCKER_DISTRO/gpg" | gpg --dearmor --yes -o /etc/apt/keyrings/docker.gpg
chmod a+r /etc/apt/keyrings/docker.gpg
echo "deb [arch=$(dpkg --print-architecture) signed-by=/etc/apt/keyrings/docker.gpg] https://download.docker.com/linux/$DOCKER_DISTRO $CODENAME stable" > /etc/apt/sources.list.d/docker.list
apt-get update
apt-get install -y containerd.io"#;

const RHEL_CONTAINERD: &str = r#"dnf install -y dnf-plugins-core
dnf config-manager --add-repo https://download.docker.com/linux/centos/docker-ce.repo
dnf install -y containerd.io"#;

const SUSE_CONTAINERD: &str = "zypper --non-interactive install -y containerd";

// Written after the package install on every family
const CONTAINERD_CONFIG: &str = r#"mkdir -p /etc/containerd
containerd config default > /etc/containerd/config.toml
if [ -d /run/systemd/system ]; then
  sed -i 's/SystemdCgroup = false/SystemdCgroup = true/g' /etc/containerd/config.toml
fi
systemctl enable containerd
systemctl restart containerd"#;
