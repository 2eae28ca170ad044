//! Shared per-run resources
//!
//! One context per run owns the HTTP client, the DNS cache and the GeoIP
//! readers. It is built once at startup and passed to the fetchers and the
//! pipeline; everything is released when the run ends.

use crate::collector::dns::DnsResolver;
use crate::collector::geo::GeoLocator;
use crate::config::CollectorConfig;
use crate::Result;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};

/// Resources shared by every stage of a collection run
pub struct PipelineContext {
    pub config: CollectorConfig,
    pub http: reqwest::Client,
    pub dns: DnsResolver,
    pub geo: GeoLocator,
}

impl PipelineContext {
    pub fn new(config: CollectorConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        // Some of the targeted hosts serve broken certificate chains; the
        // bodies are public link lists, so verification is waived.
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(20)
            .build()?;

        let geo = GeoLocator::open(
            config.country_mmdb_path.as_deref(),
            config.asn_mmdb_path.as_deref(),
        );

        Ok(Self {
            config,
            http,
            dns: DnsResolver::new(),
            geo,
        })
    }

    /// GET a URL as text.
    ///
    /// Soft-failure contract: network errors yield `(0, "")`, HTTP error
    /// statuses yield `(status, "")`; callers treat both as a skipped source.
    pub async fn get_text(&self, url: &str) -> (u16, String) {
        match self.http.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    return (status.as_u16(), String::new());
                }
                match response.text().await {
                    Ok(text) => (status.as_u16(), text),
                    Err(e) => {
                        log::debug!("Failed to read body from {url}: {e}");
                        (0, String::new())
                    }
                }
            }
            Err(e) => {
                log::debug!("Request to {url} failed: {e}");
                (0, String::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builds_from_default_config() {
        let ctx = PipelineContext::new(CollectorConfig::default()).unwrap();
        assert!(!ctx.geo.has_country_db());
        assert_eq!(ctx.config.telegram_batch_size, 15);
    }
}
