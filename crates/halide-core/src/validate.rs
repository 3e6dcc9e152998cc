//! DNS-safe names and loopback detection.
//!
//! Node names end up as the first label of derived site URLs
//! (`https://<label>.<cluster domain>/`), so they are reduced to RFC 1123
//! labels before use.

use std::net::IpAddr;

/// Maximum length of a single DNS label.
pub const MAX_LABEL_LEN: usize = 63;

/// Maximum length of a full domain name (without trailing dot).
pub const MAX_DOMAIN_LEN: usize = 253;

/// Returns true if `label` is a lowercase RFC 1123 label.
#[must_use]
pub fn is_dns_label(label: &str) -> bool {
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return false;
    }
    if label.starts_with('-') || label.ends_with('-') {
        return false;
    }
    label
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Returns true if `domain` consists of at least two valid labels.
///
/// A single trailing dot is accepted.
#[must_use]
pub fn is_dns_domain(domain: &str) -> bool {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if domain.len() > MAX_DOMAIN_LEN || !domain.contains('.') {
        return false;
    }
    // A purely numeric last label would make this an IPv4 address.
    if domain
        .rsplit('.')
        .next()
        .is_some_and(|tld| tld.bytes().all(|b| b.is_ascii_digit()))
    {
        return false;
    }
    domain.split('.').all(is_dns_label)
}

/// Reduce an arbitrary node name to a DNS label.
///
/// Lowercases, turns every run of non-alphanumeric characters into a single
/// `-`, trims dashes and truncates to 63 bytes. Returns an empty string when
/// nothing usable is left.
///
/// Example: `"Media Server #2"` -> `"media-server-2"`
#[must_use]
pub fn sanitize_dns_label(name: &str) -> String {
    let mut label = collapse_separators(name);
    if label.len() > MAX_LABEL_LEN {
        label.truncate(MAX_LABEL_LEN);
        while label.ends_with('-') {
            label.pop();
        }
    }
    label
}

/// Normalize a human node name for comparisons.
///
/// Case and separators (spaces, `_`, `.`, `-`) are ignored, so
/// `"Living_Room"` and `"living-room"` compare equal.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    collapse_separators(name)
}

fn collapse_separators(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }

    out
}

/// Returns true if `host` refers to the local machine.
///
/// Accepts bare hosts as returned by `Url::host_str`, including bracketed
/// IPv6 literals.
#[must_use]
pub fn is_loopback_host(host: &str) -> bool {
    let host = host.trim().trim_end_matches('.');
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback();
    }

    let host = host.to_ascii_lowercase();
    host == "localhost" || host.ends_with(".localhost")
}

/// Returns true if `host` is an IPv4 or IPv6 literal.
#[must_use]
pub fn is_ip_host(host: &str) -> bool {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.parse::<IpAddr>().is_ok()
}

/// Infer the cluster domain from the Portal host.
///
/// The Portal is expected to live one level below the cluster domain, so
/// the first label is dropped: `portal.example.com` -> `example.com`.
/// IP literals, loopback hosts and hosts without a multi-label parent never
/// yield a domain.
#[must_use]
pub fn cluster_domain(portal_host: &str) -> Option<String> {
    if is_ip_host(portal_host) || is_loopback_host(portal_host) {
        return None;
    }

    let host = portal_host.trim_end_matches('.').to_ascii_lowercase();
    let (_, parent) = host.split_once('.')?;

    is_dns_domain(parent).then(|| parent.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dns_label() {
        assert!(is_dns_label("node1"));
        assert!(is_dns_label("media-server-2"));
        assert!(!is_dns_label(""));
        assert!(!is_dns_label("-node"));
        assert!(!is_dns_label("node-"));
        assert!(!is_dns_label("Node"));
        assert!(!is_dns_label("node_1"));
        assert!(!is_dns_label(&"a".repeat(64)));
    }

    #[test]
    fn test_dns_domain() {
        assert!(is_dns_domain("example.com"));
        assert!(is_dns_domain("cluster.example.com."));
        assert!(!is_dns_domain("localhost"));
        assert!(!is_dns_domain("10.0.0.1"));
        assert!(!is_dns_domain("bad..example.com"));
        assert!(!is_dns_domain("under_score.example.com"));
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_dns_label("Media Server #2"), "media-server-2");
        assert_eq!(sanitize_dns_label("  --pi__node--  "), "pi-node");
        assert_eq!(sanitize_dns_label("!!!"), "");
        let long = sanitize_dns_label(&format!("{}-x", "a".repeat(62)));
        assert_eq!(long.len(), 62);
        assert!(is_dns_label(&long));
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Living_Room"), normalize_name("living-room"));
        assert_eq!(normalize_name("Living Room"), "living-room");
        assert_eq!(normalize_name("living.room"), "living-room");
    }

    #[test]
    fn test_loopback_hosts() {
        assert!(is_loopback_host("localhost"));
        assert!(is_loopback_host("LOCALHOST"));
        assert!(is_loopback_host("portal.localhost"));
        assert!(is_loopback_host("127.0.0.1"));
        assert!(is_loopback_host("127.8.9.10"));
        assert!(is_loopback_host("::1"));
        assert!(is_loopback_host("[::1]"));
        assert!(!is_loopback_host("10.0.0.1"));
        assert!(!is_loopback_host("portal.example.com"));
    }

    #[test]
    fn test_cluster_domain() {
        assert_eq!(
            cluster_domain("portal.example.com").as_deref(),
            Some("example.com")
        );
        assert_eq!(
            cluster_domain("Portal.Cluster.Example.com").as_deref(),
            Some("cluster.example.com")
        );
        assert_eq!(cluster_domain("example.com"), None);
        assert_eq!(cluster_domain("192.168.1.10"), None);
        assert_eq!(cluster_domain("[2001:db8::1]"), None);
        assert_eq!(cluster_domain("localhost"), None);
        assert_eq!(cluster_domain("portal.localhost"), None);
    }
}
