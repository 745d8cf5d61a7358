//! Kubernetes object name validation

use std::sync::LazyLock;

use regex::Regex;

static LABEL_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$"));

const MAX_LABEL_LEN: usize = 63;
const MAX_SUBDOMAIN_LEN: usize = 253;

/// DNS-1123 label: lowercase alphanumerics and '-', at most 63 characters
pub fn is_dns1123_label(name: &str) -> bool {
    name.len() <= MAX_LABEL_LEN
        && LABEL_RE
            .as_ref()
            .is_ok_and(|re| re.is_match(name))
}

/// DNS-1123 subdomain: dot-separated labels, at most 253 characters
pub fn is_dns1123_subdomain(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_SUBDOMAIN_LEN
        && name.split('.').all(is_dns1123_label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert!(is_dns1123_label("kafka"));
        assert!(is_dns1123_label("airflow-webserver"));
        assert!(is_dns1123_label("a1"));
        assert!(!is_dns1123_label(""));
        assert!(!is_dns1123_label("-kafka"));
        assert!(!is_dns1123_label("kafka-"));
        assert!(!is_dns1123_label("Kafka"));
        assert!(!is_dns1123_label("my_app"));
        assert!(!is_dns1123_label(&"a".repeat(64)));
    }

    #[test]
    fn test_subdomains() {
        assert!(is_dns1123_subdomain("apps.prod"));
        assert!(is_dns1123_subdomain("flux-system"));
        assert!(!is_dns1123_subdomain("apps..prod"));
        assert!(!is_dns1123_subdomain(".apps"));
        assert!(!is_dns1123_subdomain("apps/prod"));
        assert!(!is_dns1123_subdomain(""));
    }
}
