//! Subscription link fetching
//!
//! All links are fetched concurrently and consumed in completion order.
//! Bodies are commonly base64-wrapped; those are transparently decoded
//! before scanning.

use crate::collector::context::PipelineContext;
use crate::collector::encoding::b64_decode_tolerant;
use crate::collector::extractor::RawExtractor;
use crate::collector::models::ProtocolTag;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;

/// Fetches subscription link bodies and extracts raw tokens
pub struct SubscriptionFetcher<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> SubscriptionFetcher<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    /// Fetch every link and accumulate tokens per protocol tag.
    ///
    /// Responses are processed as they complete; downstream must not assume
    /// link ordering.
    pub async fn fetch_all(&self, links: &[String]) -> HashMap<ProtocolTag, Vec<String>> {
        let mut totals: HashMap<ProtocolTag, Vec<String>> = HashMap::new();
        let mut bodies = stream::iter(links.iter().map(|link| self.fetch_link(link)))
            .buffer_unordered(self.ctx.config.max_concurrent_requests.max(1));

        while let Some(content) = bodies.next().await {
            if content.is_empty() {
                continue;
            }
            for (tag, tokens) in RawExtractor::find_all(&content) {
                totals.entry(tag).or_default().extend(tokens);
            }
        }

        let count: usize = totals.values().map(Vec::len).sum();
        log::info!("Subscription fetching done: {count} tokens from {} links", links.len());
        totals
    }

    async fn fetch_link(&self, link: &str) -> String {
        let (_, content) = self.ctx.get_text(link).await;
        if content.is_empty() {
            return content;
        }
        if looks_base64_wrapped(&content) {
            if let Some(decoded) = b64_decode_tolerant(&content) {
                return decoded;
            }
        }
        content
    }
}

/// A body with no scheme marker near the start is assumed base64-wrapped
pub(crate) fn looks_base64_wrapped(content: &str) -> bool {
    let head: String = content.chars().take(50).collect();
    !head.contains("://") && content.len() > 20
}
