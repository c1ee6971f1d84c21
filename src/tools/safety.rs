//! Outbound request checks applied before any network access.
//!
//! Redirect targets go through the same [`UrlPolicy::validate`] call as the
//! original URL, one hop at a time.

use crate::tools::ToolError;
use reqwest::Url;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// SSH, Telnet, SMTP, SMB and common database ports.
pub const BLOCKED_PORTS: &[u16] = &[22, 23, 25, 445, 3306, 5432, 6379, 27017];

#[derive(Debug, Clone, Copy, Default)]
pub struct UrlPolicy {
    allow_private: bool,
}

impl UrlPolicy {
    pub fn new(allow_private: bool) -> Self {
        Self { allow_private }
    }

    /// Strict policy used in production.
    pub fn strict() -> Self {
        Self::new(false)
    }

    /// Parse and check a URL. Hosts that fail to resolve are let through;
    /// the request itself will fail later.
    pub async fn validate(&self, raw: &str) -> Result<Url, ToolError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| ToolError::InvalidArguments(format!("invalid URL '{}': {}", raw, e)))?;
        self.check_static(&url)?;

        if self.allow_private {
            return Ok(url);
        }

        let host = host_of(&url)?;
        if let Ok(ip) = host.parse::<IpAddr>() {
            if is_disallowed_ip(ip) {
                return Err(ToolError::Blocked(format!(
                    "{} is a private or internal address",
                    host
                )));
            }
            return Ok(url);
        }

        let port = url.port_or_known_default().unwrap_or(80);
        match tokio::net::lookup_host((host.as_str(), port)).await {
            Ok(addrs) => {
                for addr in addrs {
                    if is_disallowed_ip(addr.ip()) {
                        return Err(ToolError::Blocked(format!(
                            "{} resolves to a private or internal address",
                            host
                        )));
                    }
                }
            }
            Err(e) => {
                tracing::debug!(host = %host, error = %e, "host did not resolve; allowing");
            }
        }

        Ok(url)
    }

    /// Checks that need no DNS: scheme, host presence, port and localhost names.
    fn check_static(&self, url: &Url) -> Result<(), ToolError> {
        let scheme = url.scheme();
        if !ALLOWED_SCHEMES.contains(&scheme) {
            return Err(ToolError::Blocked(format!(
                "scheme '{}' is not allowed, only http/https",
                scheme
            )));
        }

        let host = host_of(url)?;

        if let Some(port) = url.port() {
            if BLOCKED_PORTS.contains(&port) {
                return Err(ToolError::Blocked(format!("port {} is not allowed", port)));
            }
        }

        if !self.allow_private {
            let lower = host.to_ascii_lowercase();
            if lower == "localhost" || lower.ends_with(".localhost") {
                return Err(ToolError::Blocked("localhost access is not allowed".to_string()));
            }
        }

        Ok(())
    }
}

fn host_of(url: &Url) -> Result<String, ToolError> {
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .ok_or_else(|| ToolError::InvalidArguments("URL has no host".to_string()))
}

/// True for any address a research fetch must never reach.
pub fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_disallowed_v4(v4),
        IpAddr::V6(v6) => is_disallowed_v6(v6),
    }
}

fn is_disallowed_v4(ip: Ipv4Addr) -> bool {
    let o = ip.octets();
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        || ip.is_documentation()
        || o[0] == 0
        || o[0] >= 240
        || (o[0] == 100 && (o[1] & 0xc0) == 64)
        || (o[0] == 198 && (o[1] & 0xfe) == 18)
        || (o[0] == 192 && o[1] == 0 && o[2] == 0)
}

fn is_disallowed_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_disallowed_v4(v4);
    }
    let seg = ip.segments();
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || (seg[0] & 0xfe00) == 0xfc00
        || (seg[0] & 0xffc0) == 0xfe80
        || (seg[0] == 0x2001 && seg[1] == 0x0db8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_disallowed_ipv4() {
        for addr in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.1",
            "192.168.1.1",
            "169.254.169.254",
            "0.0.0.0",
            "0.1.2.3",
            "100.64.0.1",
            "224.0.0.1",
            "255.255.255.255",
            "240.0.0.1",
        ] {
            assert!(is_disallowed_ip(ip(addr)), "{} should be blocked", addr);
        }
        assert!(!is_disallowed_ip(ip("93.184.216.34")));
        assert!(!is_disallowed_ip(ip("100.128.0.1")));
    }

    #[test]
    fn test_disallowed_ipv6() {
        for addr in ["::1", "::", "fd00::1", "fe80::1", "::ffff:127.0.0.1", "ff02::1"] {
            assert!(is_disallowed_ip(ip(addr)), "{} should be blocked", addr);
        }
        assert!(!is_disallowed_ip(ip("2606:4700::1111")));
    }

    #[tokio::test]
    async fn test_rejects_scheme() {
        let err = UrlPolicy::strict().validate("file:///etc/passwd").await.unwrap_err();
        assert!(matches!(err, ToolError::Blocked(_)));
        let err = UrlPolicy::strict().validate("ftp://example.com/x").await.unwrap_err();
        assert!(err.to_string().contains("only http/https"));
    }

    #[tokio::test]
    async fn test_rejects_blocked_port_even_when_private_allowed() {
        let err = UrlPolicy::new(true)
            .validate("http://example.com:6379/")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Blocked: port 6379 is not allowed");
    }

    #[tokio::test]
    async fn test_rejects_local_targets() {
        let policy = UrlPolicy::strict();
        for url in [
            "http://localhost/admin",
            "http://api.localhost/",
            "http://127.0.0.1:8080/",
            "http://[::1]/",
            "http://169.254.169.254/latest/meta-data",
        ] {
            assert!(
                matches!(policy.validate(url).await, Err(ToolError::Blocked(_))),
                "{} should be blocked",
                url
            );
        }
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let err = UrlPolicy::strict().validate("not a url").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_allows_public_literal() {
        let url = UrlPolicy::strict()
            .validate("https://93.184.216.34/page")
            .await
            .unwrap();
        assert_eq!(url.path(), "/page");
    }
}
