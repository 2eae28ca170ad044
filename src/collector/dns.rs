//! Cached forward DNS resolution
//!
//! One shared cache per run. Lookups are best-effort: a failure returns
//! `None` and the record keeps its defaults.

use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::Mutex;

/// Hostname-to-IPv4 resolver with a mutex-guarded cache.
///
/// Concurrent misses for the same hostname may race; the last writer wins,
/// which is acceptable since results for a stable hostname agree.
pub struct DnsResolver {
    cache: Mutex<HashMap<String, String>>,
}

impl DnsResolver {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a hostname to its first IPv4 address.
    ///
    /// IP literals pass through unchanged and are never cached.
    pub async fn resolve(&self, host: &str) -> Option<String> {
        if host.parse::<IpAddr>().is_ok() {
            return Some(host.to_string());
        }

        {
            let cache = self.cache.lock().await;
            if let Some(ip) = cache.get(host) {
                return Some(ip.clone());
            }
        }

        let addrs = match tokio::net::lookup_host((host, 0u16)).await {
            Ok(addrs) => addrs,
            Err(e) => {
                log::debug!("DNS lookup failed for {host}: {e}");
                return None;
            }
        };
        let ip = addrs
            .filter(|addr| addr.is_ipv4())
            .map(|addr| addr.ip().to_string())
            .next()?;

        self.cache
            .lock()
            .await
            .insert(host.to_string(), ip.clone());
        Some(ip)
    }

    /// Number of cached entries
    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ip_literal_passthrough() {
        let resolver = DnsResolver::new();
        assert_eq!(
            resolver.resolve("1.2.3.4").await.as_deref(),
            Some("1.2.3.4")
        );
        assert_eq!(resolver.resolve("::1").await.as_deref(), Some("::1"));
        // literals never enter the cache
        assert_eq!(resolver.cached_len().await, 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_lookup() {
        let resolver = DnsResolver::new();
        resolver
            .cache
            .lock()
            .await
            .insert("cached.example".to_string(), "9.9.9.9".to_string());
        assert_eq!(
            resolver.resolve("cached.example").await.as_deref(),
            Some("9.9.9.9")
        );
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_none() {
        let resolver = DnsResolver::new();
        assert!(resolver
            .resolve("definitely-not-a-real-host.invalid")
            .await
            .is_none());
    }
}
