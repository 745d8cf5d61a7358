//! Join token broker
//!
//! Mints a bootstrap token on the control plane and turns the printed
//! `kubeadm join` line into a validated [`JoinRecord`].

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, warn};

use cluster_client::ControlPlane;

use crate::error::{JoinError, JoinRecordError};

static TOKEN_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]{6}\.[a-z0-9]{16}$"));
static HASH_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{64}$"));

const HASH_PREFIX: &str = "sha256:";

// Flags kubeadm may print that carry a detached value we do not use
const IGNORED_VALUE_FLAGS: [&str; 3] = ["--certificate-key", "--cri-socket", "--node-name"];

fn matches(re: &LazyLock<Result<Regex, regex::Error>>, value: &str) -> bool {
    re.as_ref().is_ok_and(|re| re.is_match(value))
}

/// Everything a worker needs to join: API endpoint, bootstrap token and CA
/// public key hash.
///
/// Fields are validated on construction; a `JoinRecord` is always complete.
#[derive(Clone, PartialEq, Eq)]
pub struct JoinRecord {
    master_address: String,
    token: String,
    ca_cert_hash: String,
}

impl JoinRecord {
    /// Validate and build a record
    ///
    /// # Arguments
    /// * `master_address` - API server endpoint, `host:port`
    /// * `token` - Bootstrap token, `[a-z0-9]{6}.[a-z0-9]{16}`
    /// * `ca_cert_hash` - 64 lowercase hex digits, with or without the `sha256:` prefix
    pub fn new(
        master_address: impl Into<String>,
        token: impl Into<String>,
        ca_cert_hash: impl AsRef<str>,
    ) -> Result<Self, JoinRecordError> {
        let master_address = master_address.into();
        let token = token.into();
        let hash = ca_cert_hash.as_ref();
        let hash = hash.strip_prefix(HASH_PREFIX).unwrap_or(hash);

        if !valid_endpoint(&master_address) {
            return Err(JoinRecordError::InvalidEndpoint(master_address));
        }
        if !matches(&TOKEN_RE, &token) {
            return Err(JoinRecordError::InvalidToken);
        }
        if !matches(&HASH_RE, hash) {
            return Err(JoinRecordError::InvalidCaCertHash(hash.to_string()));
        }

        Ok(Self {
            master_address,
            token,
            ca_cert_hash: hash.to_string(),
        })
    }

    /// API server endpoint, `host:port`
    pub fn master_address(&self) -> &str {
        &self.master_address
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Hex digest without the `sha256:` prefix
    pub fn ca_cert_hash(&self) -> &str {
        &self.ca_cert_hash
    }

    /// Hash in the form kubeadm expects (`sha256:<hex>`)
    pub fn prefixed_ca_cert_hash(&self) -> String {
        format!("{HASH_PREFIX}{}", self.ca_cert_hash)
    }
}

// Token is a credential; keep it out of logs
impl fmt::Debug for JoinRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token_id = self.token.split('.').next().unwrap_or_default();
        f.debug_struct("JoinRecord")
            .field("master_address", &self.master_address)
            .field("token", &format_args!("{token_id}.<redacted>"))
            .field("ca_cert_hash", &self.ca_cert_hash)
            .finish()
    }
}

fn valid_endpoint(endpoint: &str) -> bool {
    let Some((host, port)) = endpoint.rsplit_once(':') else {
        return false;
    };
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    !host.is_empty()
        && !host.chars().any(|c| c.is_whitespace() || c == '/')
        && port.parse::<u16>().is_ok_and(|p| p != 0)
}

/// Extract a [`JoinRecord`] from `kubeadm token create --print-join-command` output.
///
/// Parsing is by argument position, not by pattern search: the endpoint is
/// the positional argument after `join`, and each flag must appear exactly once.
pub fn parse_join_command(raw: &str) -> Result<JoinRecord, JoinError> {
    let failure = |reason: &str| JoinError::ParseFailure {
        reason: reason.to_string(),
        raw: raw.to_string(),
    };

    let args: Vec<&str> = raw
        .split_whitespace()
        .filter(|arg| *arg != "\\")
        .collect();

    let join_at = args
        .iter()
        .position(|arg| *arg == "join")
        .ok_or_else(|| failure("missing 'join' subcommand"))?;

    let mut endpoint: Option<&str> = None;
    let mut token: Option<&str> = None;
    let mut hash: Option<&str> = None;

    let mut rest = args[join_at + 1..].iter();
    while let Some(arg) = rest.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value)),
            _ => (*arg, None),
        };

        let slot = match flag {
            "--token" => &mut token,
            "--discovery-token-ca-cert-hash" => &mut hash,
            other if other.starts_with('-') => {
                debug!("Ignoring join flag {}", other);
                if inline.is_none() && IGNORED_VALUE_FLAGS.contains(&other) {
                    rest.next();
                }
                continue;
            }
            _ => {
                if endpoint.is_some() {
                    return Err(failure("more than one API server endpoint"));
                }
                endpoint = Some(*arg);
                continue;
            }
        };

        if slot.is_some() {
            return Err(failure(&format!("duplicate {flag}")));
        }
        let value = match inline {
            Some(value) => value,
            None => rest
                .next()
                .copied()
                .ok_or_else(|| failure(&format!("{flag} has no value")))?,
        };
        if value.is_empty() {
            return Err(failure(&format!("{flag} is empty")));
        }
        *slot = Some(value);
    }

    let endpoint = endpoint.ok_or_else(|| failure("missing API server endpoint"))?;
    let token = token.ok_or_else(|| failure("missing --token"))?;
    let hash = hash.ok_or_else(|| failure("missing --discovery-token-ca-cert-hash"))?;
    if !hash.starts_with(HASH_PREFIX) {
        return Err(failure("CA certificate hash is not sha256"));
    }

    JoinRecord::new(endpoint, token, hash).map_err(|e| failure(&e.to_string()))
}

/// Issues join records from a live control plane
pub struct JoinTokenBroker {
    control_plane: Arc<dyn ControlPlane>,
}

impl JoinTokenBroker {
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        Self { control_plane }
    }

    /// Mint one new bootstrap token and package it.
    ///
    /// Fails with [`JoinError::NotReadyYet`] without contacting kubeadm when
    /// the control plane has not been initialized.
    pub async fn issue_join_record(&self) -> Result<JoinRecord, JoinError> {
        if !self.control_plane.is_initialized().await {
            return Err(JoinError::NotReadyYet);
        }

        let raw = self.control_plane.print_join_command().await?;
        match parse_join_command(&raw) {
            Ok(record) => {
                info!(endpoint = %record.master_address(), "Issued join record");
                Ok(record)
            }
            Err(e) => {
                warn!("Join command could not be parsed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_client::{KubeControlPlane, MockControlPlane, MockExecutor};

    const HASH: &str = "8f3c8a5d1e2b4c6d7e8f9a0b1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d";
    const TOKEN: &str = "abcdef.0123456789abcdef";

    fn join_line() -> String {
        format!("kubeadm join 10.0.0.10:6443 --token {TOKEN} --discovery-token-ca-cert-hash sha256:{HASH}")
    }

    #[test]
    fn test_parse_kubeadm_output() {
        let record = parse_join_command(&format!("{}\n", join_line())).unwrap();
        assert_eq!(record.master_address(), "10.0.0.10:6443");
        assert_eq!(record.token(), TOKEN);
        assert_eq!(record.ca_cert_hash(), HASH);
        assert_eq!(record.prefixed_ca_cert_hash(), format!("sha256:{HASH}"));
    }

    #[test]
    fn test_parse_accepts_inline_values_and_line_continuations() {
        let raw = format!(
            "kubeadm join cp.example.internal:6443 \\\n    --token={TOKEN} \\\n    --discovery-token-ca-cert-hash=sha256:{HASH}"
        );
        let record = parse_join_command(&raw).unwrap();
        assert_eq!(record.master_address(), "cp.example.internal:6443");
        assert_eq!(record.token(), TOKEN);
    }

    #[test]
    fn test_parse_ignores_unrelated_flags() {
        let raw = format!("{} --control-plane --certificate-key 0a1b2c", join_line());
        assert!(parse_join_command(&raw).is_ok());
    }

    #[test]
    fn test_parse_rejects_malformed_tokens() {
        for bad in ["", "ABCDEF.0123456789ABCDEF", "abcdef0123456789abcdef", "abc.def", "abcdef.0123456789abcdef0"] {
            let raw = format!("kubeadm join 10.0.0.10:6443 --token {bad} --discovery-token-ca-cert-hash sha256:{HASH}");
            match parse_join_command(&raw) {
                Err(JoinError::ParseFailure { raw: carried, .. }) => assert_eq!(carried, raw),
                other => panic!("token {bad:?} accepted: {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_rejects_missing_and_duplicate_fields() {
        let cases = [
            format!("kubeadm join --token {TOKEN} --discovery-token-ca-cert-hash sha256:{HASH}"),
            format!("kubeadm join 10.0.0.10:6443 --discovery-token-ca-cert-hash sha256:{HASH}"),
            format!("kubeadm join 10.0.0.10:6443 --token {TOKEN}"),
            format!("kubeadm join 10.0.0.10:6443 --token {TOKEN} --token {TOKEN} --discovery-token-ca-cert-hash sha256:{HASH}"),
            format!("kubeadm join 10.0.0.10:6443 --token {TOKEN} --discovery-token-ca-cert-hash {HASH}"),
            format!("kubeadm join 10.0.0.10 --token {TOKEN} --discovery-token-ca-cert-hash sha256:{HASH}"),
            format!("kubeadm join 10.0.0.10:6443 --token {TOKEN} --discovery-token-ca-cert-hash sha256:{}", &HASH[..40]),
            "failed to load admin kubeconfig".to_string(),
        ];
        for raw in cases {
            assert!(
                matches!(parse_join_command(&raw), Err(JoinError::ParseFailure { .. })),
                "accepted: {raw}"
            );
        }
    }

    #[test]
    fn test_record_validation() {
        assert!(JoinRecord::new("[fd00::10]:6443", TOKEN, HASH).is_ok());
        assert_eq!(
            JoinRecord::new("10.0.0.10:0", TOKEN, HASH),
            Err(JoinRecordError::InvalidEndpoint("10.0.0.10:0".to_string()))
        );
        assert_eq!(JoinRecord::new("10.0.0.10:6443", "nope", HASH), Err(JoinRecordError::InvalidToken));
        assert!(matches!(
            JoinRecord::new("10.0.0.10:6443", TOKEN, HASH.to_uppercase()),
            Err(JoinRecordError::InvalidCaCertHash(_))
        ));
    }

    #[test]
    fn test_debug_redacts_token_secret() {
        let record = JoinRecord::new("10.0.0.10:6443", TOKEN, HASH).unwrap();
        let debug = format!("{record:?}");
        assert!(debug.contains("abcdef.<redacted>"));
        assert!(!debug.contains("0123456789abcdef\""));
    }

    #[tokio::test]
    async fn test_broker_requires_initialized_control_plane() {
        let control_plane = MockControlPlane::new();
        control_plane.set_join_command(Some(&join_line()));
        let broker = JoinTokenBroker::new(Arc::new(control_plane.clone()));

        assert!(matches!(broker.issue_join_record().await, Err(JoinError::NotReadyYet)));
        assert_eq!(control_plane.join_requests(), 0);
    }

    #[tokio::test]
    async fn test_broker_issues_one_token_per_call() {
        let control_plane = MockControlPlane::new();
        control_plane.set_initialized(true);
        control_plane.set_join_command(Some(&join_line()));
        let broker = JoinTokenBroker::new(Arc::new(control_plane.clone()));

        let record = broker.issue_join_record().await.unwrap();
        assert_eq!(record.token(), TOKEN);
        broker.issue_join_record().await.unwrap();
        assert_eq!(control_plane.join_requests(), 2);
    }

    #[tokio::test]
    async fn test_broker_surfaces_command_failure() {
        let control_plane = MockControlPlane::new();
        control_plane.set_initialized(true);
        let broker = JoinTokenBroker::new(Arc::new(control_plane));

        match broker.issue_join_record().await {
            Err(JoinError::CommandFailure { transcript, .. }) => {
                assert!(transcript.contains("bootstrap token"))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_broker_ignores_kubeadm_warnings_on_stderr() {
        // Any existing file stands in for the admin kubeconfig
        let kubeconfig = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");
        let executor = MockExecutor::new();
        let join = join_line();
        executor.set_output(&[
            join.as_str(),
            "W1017 09:12:44.123456   4242 version.go:104] could not fetch a Kubernetes version from the internet: unable to get URL",
            "W1017 09:12:44.123500   4242 version.go:105] falling back to the local client version: v1.30.4",
        ]);
        let control_plane = KubeControlPlane::new(kubeconfig, Arc::new(executor.clone()));
        let broker = JoinTokenBroker::new(Arc::new(control_plane));

        let record = broker.issue_join_record().await.unwrap();
        assert_eq!(record.master_address(), "10.0.0.10:6443");
        assert_eq!(record.token(), TOKEN);
        assert!(executor.scripts()[0].starts_with("kubeadm token create --print-join-command"));
    }

    #[tokio::test]
    async fn test_broker_rejects_output_without_join_command() {
        let kubeconfig = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");
        let executor = MockExecutor::new();
        executor.set_output(&["W1017 09:12:44.123456   4242 token.go:80] no join command printed"]);
        let broker = JoinTokenBroker::new(Arc::new(KubeControlPlane::new(kubeconfig, Arc::new(executor))));

        assert!(matches!(
            broker.issue_join_record().await,
            Err(JoinError::ParseFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_broker_surfaces_parse_failure() {
        let control_plane = MockControlPlane::new();
        control_plane.set_initialized(true);
        control_plane.set_join_command(Some("kubeadm join 10.0.0.10:6443 --token  --discovery-token-ca-cert-hash sha256:abc"));
        let broker = JoinTokenBroker::new(Arc::new(control_plane));

        assert!(matches!(
            broker.issue_join_record().await,
            Err(JoinError::ParseFailure { .. })
        ));
    }
}
