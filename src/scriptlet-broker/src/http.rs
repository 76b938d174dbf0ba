//! Outbound HTTP for the `http.*` capability.
//!
//! Host policy (scheme, allowlist, private-range denial) is enforced before
//! a single byte leaves the process, and DNS resolution is pinned: the host
//! is resolved once, the policy is re-checked against the resolved IPs, and
//! the request is sent to that pinned address rather than re-resolving at
//! connect time. Without this, a script could pass the allowlist check
//! against a public hostname and then have DNS answer differently (or
//! differently on a retried connection) to point at an internal address —
//! classic DNS-rebinding SSRF.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use url::{Host, Url};

use crate::error::BrokerError;
use crate::manifest::TenantManifest;
use crate::types::{Capability, HttpRequest};

#[derive(Debug, Clone)]
enum HostPattern {
    Exact(String),
    WildcardSuffix(String),
}

impl HostPattern {
    fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return None;
        }
        if let Some(suffix) = normalized.strip_prefix("*.") {
            return (!suffix.is_empty()).then(|| Self::WildcardSuffix(suffix.to_string()));
        }
        Some(Self::Exact(normalized))
    }

    fn matches(&self, host: &str) -> bool {
        match self {
            Self::Exact(value) => host == value,
            Self::WildcardSuffix(suffix) => {
                host.len() > suffix.len() + 1
                    && host.ends_with(suffix.as_str())
                    && host.as_bytes()[host.len() - suffix.len() - 1] == b'.'
            }
        }
    }
}

fn is_private_or_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => {
            addr.is_private()
                || addr.is_loopback()
                || addr.is_link_local()
                || addr.is_unspecified()
                || addr.is_multicast()
                || addr.is_broadcast()
        }
        IpAddr::V6(addr) => {
            addr.is_loopback()
                || addr.is_unique_local()
                || addr.is_unicast_link_local()
                || addr.is_unspecified()
                || addr.is_multicast()
        }
    }
}

struct ResolvedHost {
    host: Host<String>,
    port: u16,
    ips: Vec<IpAddr>,
}

fn resolve(manifest: &TenantManifest, url: &Url) -> Result<ResolvedHost, BrokerError> {
    let host = url.host().ok_or_else(|| BrokerError::Invalid("url missing host".to_string()))?;
    let host_label = match &host {
        Host::Domain(domain) => domain.to_ascii_lowercase(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    };

    let patterns: Vec<HostPattern> =
        manifest.allowed_http_hosts.iter().filter_map(|raw| HostPattern::parse(raw)).collect();
    if !patterns.iter().any(|pattern| pattern.matches(&host_label)) {
        return Err(BrokerError::HostNotAllowed(host_label));
    }

    let port = url
        .port_or_known_default()
        .ok_or_else(|| BrokerError::Invalid("url missing resolvable port".to_string()))?;
    let ips: Vec<IpAddr> = match &host {
        Host::Ipv4(ip) => vec![IpAddr::V4(*ip)],
        Host::Ipv6(ip) => vec![IpAddr::V6(*ip)],
        Host::Domain(domain) => (domain.as_str(), port)
            .to_socket_addrs()
            .map_err(|err| BrokerError::Http(format!("dns lookup failed: {err}")))?
            .map(|addr| addr.ip())
            .collect(),
    };
    if ips.is_empty() {
        return Err(BrokerError::Http(format!("host has no resolved addresses: {host_label}")));
    }
    if !manifest.allow_private_networks {
        for ip in &ips {
            if is_private_or_link_local(ip) {
                return Err(BrokerError::PrivateNetworkDenied(host_label));
            }
        }
    }

    let host = match host {
        Host::Domain(domain) => Host::Domain(domain.to_string()),
        Host::Ipv4(ip) => Host::Ipv4(ip),
        Host::Ipv6(ip) => Host::Ipv6(ip),
    };
    Ok(ResolvedHost { host, port, ips })
}

/// Validates and executes an outbound HTTP call on behalf of a script.
///
/// # Errors
///
/// Returns [`BrokerError`] if the scheme, host, or resolved address is
/// disallowed by `manifest`, if the request body exceeds
/// `manifest.max_http_body_bytes`, or if the request itself fails.
pub async fn handle(
    manifest: &TenantManifest,
    request: &HttpRequest,
) -> Result<serde_json::Value, BrokerError> {
    if !manifest.has_capability(Capability::Http) {
        return Err(BrokerError::CapabilityDenied("http".to_string()));
    }
    let url = Url::parse(&request.url).map_err(|err| BrokerError::Invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(BrokerError::SchemeNotAllowed(scheme.to_string())),
    }

    let resolved = resolve(manifest, &url)?;
    let pinned_addr = SocketAddr::new(resolved.ips[0], resolved.port);

    let mut builder = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(manifest.max_http_redirects as usize))
        .timeout(Duration::from_millis(manifest.http_timeout_ms));
    if let Host::Domain(domain) = &resolved.host {
        builder = builder.resolve(domain, pinned_addr);
    }
    let client = builder.build().map_err(|err| BrokerError::Http(err.to_string()))?;

    let method = request
        .method
        .parse::<reqwest::Method>()
        .map_err(|err| BrokerError::Invalid(err.to_string()))?;
    let mut req = client.request(method, url.as_str());
    for (name, value) in &request.headers {
        req = req.header(name, value);
    }
    if let Some(body) = &request.body {
        let encoded = serde_json::to_vec(body).map_err(|err| BrokerError::Invalid(err.to_string()))?;
        if encoded.len() > manifest.max_http_body_bytes {
            return Err(BrokerError::PayloadTooLarge {
                max_bytes: manifest.max_http_body_bytes,
                actual_bytes: encoded.len(),
            });
        }
        req = req.json(body);
    }

    let response = req.send().await.map_err(|err| BrokerError::Http(err.to_string()))?;
    let status = response.status().as_u16();
    let bytes = response.bytes().await.map_err(|err| BrokerError::Http(err.to_string()))?;
    if bytes.len() > manifest.max_http_body_bytes {
        return Err(BrokerError::PayloadTooLarge {
            max_bytes: manifest.max_http_body_bytes,
            actual_bytes: bytes.len(),
        });
    }
    let body_text = String::from_utf8_lossy(&bytes).into_owned();
    Ok(serde_json::json!({ "status": status, "body": body_text }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(allowed_hosts: &[&str], allow_private: bool) -> TenantManifest {
        TenantManifest {
            tenant_id: "tenant-1".to_string(),
            capabilities: vec![Capability::Http],
            allowed_tables: vec![],
            enable_write_operations: false,
            max_query_results: 0,
            allowed_http_hosts: allowed_hosts.iter().map(|h| (*h).to_string()).collect(),
            allow_private_networks: allow_private,
            max_http_body_bytes: 1024,
            http_timeout_ms: 1000,
            max_http_redirects: 0,
            allowed_event_names: vec![],
        }
    }

    #[test]
    fn host_pattern_exact_match() {
        assert!(HostPattern::parse("api.example.com").unwrap().matches("api.example.com"));
        assert!(!HostPattern::parse("api.example.com").unwrap().matches("evil.com"));
    }

    #[test]
    fn host_pattern_wildcard_suffix() {
        let pattern = HostPattern::parse("*.example.com").unwrap();
        assert!(pattern.matches("api.example.com"));
        assert!(!pattern.matches("example.com"));
        assert!(!pattern.matches("evilexample.com"));
    }

    #[tokio::test]
    async fn missing_http_capability_is_rejected() {
        let mut manifest = manifest(&["example.com"], false);
        manifest.capabilities.clear();
        let request =
            HttpRequest { url: "https://example.com/".to_string(), method: "GET".to_string(), headers: Default::default(), body: None };
        let err = handle(&manifest, &request).await.unwrap_err();
        assert!(matches!(err, BrokerError::CapabilityDenied(_)));
    }

    #[tokio::test]
    async fn disallowed_scheme_is_rejected() {
        let manifest = manifest(&["example.com"], false);
        let request =
            HttpRequest { url: "ftp://example.com/file".to_string(), method: "GET".to_string(), headers: Default::default(), body: None };
        let err = handle(&manifest, &request).await.unwrap_err();
        assert!(matches!(err, BrokerError::SchemeNotAllowed(_)));
    }

    #[tokio::test]
    async fn host_not_in_allowlist_is_rejected() {
        let manifest = manifest(&["example.com"], false);
        let request =
            HttpRequest { url: "https://evil.com/".to_string(), method: "GET".to_string(), headers: Default::default(), body: None };
        let err = handle(&manifest, &request).await.unwrap_err();
        assert!(matches!(err, BrokerError::HostNotAllowed(_)));
    }

    #[tokio::test]
    async fn loopback_ip_literal_is_rejected_without_private_networks_allowed() {
        let manifest = manifest(&["127.0.0.1"], false);
        let request =
            HttpRequest { url: "http://127.0.0.1/".to_string(), method: "GET".to_string(), headers: Default::default(), body: None };
        let err = handle(&manifest, &request).await.unwrap_err();
        assert!(matches!(err, BrokerError::PrivateNetworkDenied(_)));
    }
}
