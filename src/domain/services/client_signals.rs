//! Client Signals Service
//!
//! Pure helpers that read resolution signals off a request: the client
//! address, the host split into domain and port, and the crawler check.
//! Every caller that needs one of these goes through here so the rules stay
//! identical across the resolver, the request binder and the detection
//! endpoint.

use std::net::{IpAddr, SocketAddr};

pub struct ClientSignals;

impl ClientSignals {
    /// Determine the client address.
    ///
    /// The first comma-separated entry of `X-Forwarded-For` wins when the
    /// header is present; otherwise the direct connection address is used.
    /// An unparsable forwarded entry yields `None` rather than the proxy's
    /// own address.
    pub fn client_ip(forwarded_for: Option<&str>, remote: Option<IpAddr>) -> Option<IpAddr> {
        match forwarded_for.map(str::trim).filter(|v| !v.is_empty()) {
            Some(header) => {
                let first = header.split(',').next().unwrap_or_default().trim();
                first
                    .parse::<IpAddr>()
                    .ok()
                    .or_else(|| first.parse::<SocketAddr>().ok().map(|s| s.ip()))
            }
            None => remote,
        }
    }

    /// Split a Host header value into lowercase domain and port.
    ///
    /// The port is empty when none is given. Bracketed IPv6 literals keep
    /// their brackets.
    pub fn split_domain_port(host: &str) -> (String, String) {
        let host = host.trim().to_lowercase();
        if host.is_empty() {
            return (String::new(), String::new());
        }
        if host.ends_with(']') {
            return (host, String::new());
        }
        match host.rsplit_once(':') {
            Some((domain, port)) => {
                let domain = domain.strip_suffix('.').unwrap_or(domain);
                (domain.to_string(), port.to_string())
            }
            None => {
                let domain = host.strip_suffix('.').unwrap_or(&host);
                (domain.to_string(), String::new())
            }
        }
    }

    /// Coarse crawler heuristic: the user agent mentions "bot" or "spider".
    ///
    /// Misclassifies some legitimate agents. Keep every crawler decision
    /// behind this one predicate.
    pub fn is_crawler(user_agent: Option<&str>) -> bool {
        match user_agent {
            Some(agent) => {
                let agent = agent.to_lowercase();
                agent.contains("bot") || agent.contains("spider")
            }
            None => false,
        }
    }

    /// GET and HEAD are the only methods allowed to carry a site override.
    pub fn is_safe_method(method: &str) -> bool {
        method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("HEAD")
    }
}
