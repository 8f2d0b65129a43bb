//! Server endpoints and the multinode proxy URL form (spec §3
//! `ServerEndpoint`, §6 "JDBC URL form").

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::common::now_millis;
use crate::error::{OjpError, Result};

/// `{host, port, healthy, lastFailureAt}` (spec §3). Session bindings hold
/// an `Arc<ServerEndpoint>`, never a `host:port` string, so two endpoints
/// that happen to canonicalize to the same address are never confused —
/// `id` is assigned once per parsed endpoint and is what identity/equality
/// are based on.
pub struct ServerEndpoint {
    pub id: usize,
    pub host: String,
    pub port: u16,
    healthy: AtomicBool,
    last_failure_at: AtomicU64,
}

impl ServerEndpoint {
    pub fn new(id: usize, host: String, port: u16) -> Self {
        Self {
            id,
            host,
            port,
            healthy: AtomicBool::new(true),
            last_failure_at: AtomicU64::new(0),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::Release);
        self.last_failure_at.store(now_millis(), Ordering::Release);
    }

    pub fn mark_healthy(&self) {
        self.healthy.store(true, Ordering::Release);
    }

    pub fn last_failure_at(&self) -> u64 {
        self.last_failure_at.load(Ordering::Acquire)
    }
}

impl PartialEq for ServerEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for ServerEndpoint {}

impl std::hash::Hash for ServerEndpoint {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for ServerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} (healthy={})", self.host, self.port, self.is_healthy())
    }
}

/// Parses `jdbc:<proxy-scheme>[ep1:port,ep2:port,...]_<backend-url>` into
/// the bracketed endpoint list and the verbatim backend URL remainder
/// (spec §6).
pub fn parse_proxy_url(url: &str) -> Result<(Vec<(String, u16)>, String)> {
    let open = url.find('[').ok_or_else(|| OjpError::Unsupported("proxy url missing endpoint list '['".into()))?;
    let close = url[open..]
        .find(']')
        .map(|i| i + open)
        .ok_or_else(|| OjpError::Unsupported("proxy url missing closing ']'".into()))?;

    let list = &url[open + 1..close];
    let rest = &url[close + 1..];
    let backend_url = rest.strip_prefix('_').ok_or_else(|| OjpError::Unsupported("proxy url missing '_' before backend url".into()))?;

    let mut endpoints = Vec::new();
    for part in list.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (host, port) = part
            .rsplit_once(':')
            .ok_or_else(|| OjpError::Unsupported(format!("endpoint '{part}' missing port")))?;
        let port: u16 = port.parse().map_err(|_| OjpError::Unsupported(format!("endpoint '{part}' has non-numeric port")))?;
        endpoints.push((host.to_string(), port));
    }
    if endpoints.is_empty() {
        return Err(OjpError::Unsupported("proxy url has an empty endpoint list".into()));
    }

    Ok((endpoints, backend_url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multinode_proxy_url() {
        let (endpoints, backend) = parse_proxy_url("jdbc:ojp[ep1:1059,ep2:1059]_postgresql://db/app").unwrap();
        assert_eq!(endpoints, vec![("ep1".to_string(), 1059), ("ep2".to_string(), 1059)]);
        assert_eq!(backend, "postgresql://db/app");
    }

    #[test]
    fn single_endpoint_still_parses() {
        let (endpoints, backend) = parse_proxy_url("jdbc:ojp[localhost:1059]_postgresql://db/app").unwrap();
        assert_eq!(endpoints, vec![("localhost".to_string(), 1059)]);
        assert_eq!(backend, "postgresql://db/app");
    }

    #[test]
    fn missing_brackets_is_rejected() {
        assert!(parse_proxy_url("jdbc:ojp_postgresql://db/app").is_err());
    }
}
