//! Collector configuration
//!
//! One explicit config value, built at startup and threaded through the
//! fetchers and the pipeline. Nothing reads configuration from ambient state.

use std::path::PathBuf;
use std::time::Duration;

/// Timeout for every HTTP request in seconds
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Maximum redirect hops followed per request
const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Upper bound on concurrent HTTP connections
const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Default user agent for HTTP requests
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0";

/// Telegram preview page, `{}` replaced by the channel name
const TELEGRAM_BASE_URL: &str = "https://t.me/s/{}";

/// Configuration for the whole collection run
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Timeout for each HTTP request
    pub http_timeout: Duration,
    /// Maximum redirect hops per request
    pub max_redirects: usize,
    /// Concurrent HTTP connection ceiling
    pub max_concurrent_requests: usize,
    /// User agent sent with every request
    pub user_agent: String,
    /// URL template for Telegram channel previews
    pub telegram_base_url: String,
    /// Channels fetched concurrently per batch
    pub telegram_batch_size: usize,
    /// Pause between channel batches
    pub telegram_batch_pause: Duration,
    /// Delay before the single per-channel retry
    pub telegram_retry_delay: Duration,
    /// Message containers inspected per channel page
    pub telegram_message_limit: usize,
    /// Extracted-token cap per channel
    pub max_configs_per_channel: usize,
    /// Whether subscription links are fetched at all
    pub enable_subscription_fetching: bool,
    /// Whether TCP reachability probing runs
    pub enable_connectivity_test: bool,
    /// Per-probe connect timeout
    pub connectivity_test_timeout: Duration,
    /// Concurrent probe ceiling
    pub connectivity_test_concurrency: usize,
    /// Deduped-set size above which a random sample is drawn before probing
    pub max_connectivity_tests: usize,
    /// Country GeoIP database, lookups disabled when absent
    pub country_mmdb_path: Option<PathBuf>,
    /// ASN GeoIP database, lookups disabled when absent
    pub asn_mmdb_path: Option<PathBuf>,
    /// Display labels for the decorative subscription header entries
    pub header_signatures: Vec<String>,
    /// Seed for sampling/shuffling, fresh entropy when unset
    pub rng_seed: Option<u64>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            telegram_base_url: TELEGRAM_BASE_URL.to_string(),
            telegram_batch_size: 15,
            telegram_batch_pause: Duration::from_secs(1),
            telegram_retry_delay: Duration::from_secs(2),
            telegram_message_limit: 75,
            max_configs_per_channel: 500,
            enable_subscription_fetching: true,
            enable_connectivity_test: false,
            connectivity_test_timeout: Duration::from_millis(2500),
            connectivity_test_concurrency: 100,
            max_connectivity_tests: 2500,
            country_mmdb_path: None,
            asn_mmdb_path: None,
            header_signatures: vec![
                "✨ Fast & Secure Proxy".to_string(),
                "🔰 Anti-Censorship | Filter Breaker".to_string(),
                "⚡ Powered by V2Ray Collector".to_string(),
                "🌐 Free Public Configs".to_string(),
            ],
            rng_seed: None,
        }
    }
}

impl CollectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connectivity_test(mut self, enabled: bool) -> Self {
        self.enable_connectivity_test = enabled;
        self
    }

    pub fn with_subscription_fetching(mut self, enabled: bool) -> Self {
        self.enable_subscription_fetching = enabled;
        self
    }

    pub fn with_max_connectivity_tests(mut self, max: usize) -> Self {
        self.max_connectivity_tests = max;
        self
    }

    pub fn with_country_mmdb(mut self, path: PathBuf) -> Self {
        self.country_mmdb_path = Some(path);
        self
    }

    pub fn with_asn_mmdb(mut self, path: PathBuf) -> Self {
        self.asn_mmdb_path = Some(path);
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Preview URL for a Telegram channel
    pub fn telegram_channel_url(&self, channel: &str) -> String {
        self.telegram_base_url.replacen("{}", channel, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CollectorConfig::default();
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.telegram_batch_size, 15);
        assert_eq!(config.max_connectivity_tests, 2500);
        assert!(!config.enable_connectivity_test);
        assert!(config.enable_subscription_fetching);
    }

    #[test]
    fn test_config_builder() {
        let config = CollectorConfig::new()
            .with_connectivity_test(true)
            .with_max_connectivity_tests(100)
            .with_rng_seed(7);
        assert!(config.enable_connectivity_test);
        assert_eq!(config.max_connectivity_tests, 100);
        assert_eq!(config.rng_seed, Some(7));
    }

    #[test]
    fn test_telegram_channel_url() {
        let config = CollectorConfig::default();
        assert_eq!(
            config.telegram_channel_url("proxy_channel"),
            "https://t.me/s/proxy_channel"
        );
    }
}
