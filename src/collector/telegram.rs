//! Telegram channel preview scraping
//!
//! Channels are fetched in fixed-size batches with a politeness pause in
//! between; within a batch all requests run concurrently. Each channel page
//! is parsed for message containers and their bodies are scanned for raw
//! tokens.

use crate::collector::context::PipelineContext;
use crate::collector::extractor::RawExtractor;
use crate::collector::models::ProtocolTag;
use crate::collector::output::tehran_now;
use futures::future::join_all;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::HashMap;

/// Message container on a channel preview page
static MESSAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.tgme_widget_message").expect("Invalid message selector"));

/// Message body inside a container
static TEXT_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.tgme_widget_message_text").expect("Invalid message text selector")
});

/// Everything a scraping pass produced, for the pipeline and the run report
#[derive(Debug, Default)]
pub struct TelegramOutcome {
    /// Extracted tokens per channel, bucketed per protocol tag
    pub tokens_by_channel: HashMap<String, HashMap<ProtocolTag, Vec<String>>>,
    /// Channels that yielded at least one token, with their counts
    pub successful: Vec<(String, usize)>,
    /// Channels that failed both attempts
    pub failed: Vec<String>,
    /// Total channels attempted
    pub total: usize,
}

impl TelegramOutcome {
    /// Merge all per-channel buckets into one tag-keyed map
    pub fn merged_tokens(&self) -> HashMap<ProtocolTag, Vec<String>> {
        let mut merged: HashMap<ProtocolTag, Vec<String>> = HashMap::new();
        for buckets in self.tokens_by_channel.values() {
            for (tag, tokens) in buckets {
                merged.entry(*tag).or_default().extend(tokens.iter().cloned());
            }
        }
        merged
    }

    /// Plain-text run report for the reporting layer
    pub fn render_report(&self) -> String {
        let now = tehran_now().format("%Y-%m-%d %H:%M:%S");
        let mut report = format!("REPORT DATE: {now}\n");
        report.push_str(&format!(
            "Total: {} | Success: {} | Failed: {}\n\n",
            self.total,
            self.successful.len(),
            self.failed.len()
        ));
        for (channel, count) in &self.successful {
            report.push_str(&format!("{channel}: {count}\n"));
        }
        report
    }
}

/// Scrapes Telegram channel previews for raw proxy tokens
pub struct TelegramScraper<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> TelegramScraper<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    /// Scrape every channel, batch by batch
    pub async fn scrape_all(&self, channels: &[String]) -> TelegramOutcome {
        let config = &self.ctx.config;
        let mut outcome = TelegramOutcome {
            total: channels.len(),
            ..Default::default()
        };

        for batch in channels.chunks(config.telegram_batch_size.max(1)) {
            let results = join_all(
                batch
                    .iter()
                    .map(|channel| self.scrape_channel_with_retry(channel)),
            )
            .await;

            for (channel, result) in batch.iter().zip(results) {
                match result {
                    Some(buckets) => {
                        let count: usize = buckets.values().map(Vec::len).sum();
                        if count > 0 {
                            outcome.successful.push((channel.clone(), count));
                            outcome.tokens_by_channel.insert(channel.clone(), buckets);
                        }
                    }
                    None => outcome.failed.push(channel.clone()),
                }
            }

            tokio::time::sleep(config.telegram_batch_pause).await;
        }

        log::info!(
            "Telegram scraping done: {} ok, {} failed of {}",
            outcome.successful.len(),
            outcome.failed.len(),
            outcome.total
        );
        outcome
    }

    /// One fetch plus a single delayed retry; `None` marks the channel failed
    async fn scrape_channel_with_retry(
        &self,
        channel: &str,
    ) -> Option<HashMap<ProtocolTag, Vec<String>>> {
        let config = &self.ctx.config;
        let url = config.telegram_channel_url(channel);

        for attempt in 0..2 {
            if attempt > 0 {
                tokio::time::sleep(config.telegram_retry_delay).await;
            }
            let (status, html) = self.ctx.get_text(&url).await;
            if status == 200 && !html.is_empty() {
                return Some(extract_from_page(
                    &html,
                    config.telegram_message_limit,
                    config.max_configs_per_channel,
                ));
            }
            log::debug!("Channel {channel} attempt {} failed (status {status})", attempt + 1);
        }
        None
    }
}

/// Pull raw tokens out of a channel preview page.
///
/// At most `message_limit` containers are inspected and extraction stops once
/// `token_cap` tokens have accumulated.
pub fn extract_from_page(
    html: &str,
    message_limit: usize,
    token_cap: usize,
) -> HashMap<ProtocolTag, Vec<String>> {
    let document = Html::parse_document(html);
    let mut buckets: HashMap<ProtocolTag, Vec<String>> = HashMap::new();
    let mut count = 0usize;

    for message in document.select(&MESSAGE_SELECTOR).take(message_limit) {
        if let Some(text_div) = message.select(&TEXT_SELECTOR).next() {
            let text = text_div
                .text()
                .map(str::trim)
                .filter(|piece| !piece.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            for (tag, tokens) in RawExtractor::find_all(&text) {
                count += tokens.len();
                buckets.entry(tag).or_default().extend(tokens);
            }
        }
        if count >= token_cap {
            break;
        }
    }

    buckets
}
