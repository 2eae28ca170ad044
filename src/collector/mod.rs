//! Collector module for aggregating proxy configs
//!
//! This module provides functionality for:
//! - Extracting raw proxy URI tokens from scraped text
//! - Decoding the four supported URI dialects into canonical records
//! - Fetching sources (Telegram channel previews, subscription links)
//! - Deduplicating, enriching and reachability-probing the records
//! - Re-encoding the survivors into downstream formats

pub mod checker;
pub mod context;
pub mod dns;
pub mod encoding;
pub mod extractor;
pub mod geo;
pub mod models;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod subscription;
pub mod telegram;

pub use checker::ConnectivityChecker;
pub use context::PipelineContext;
pub use dns::DnsResolver;
pub use extractor::RawExtractor;
pub use geo::GeoLocator;
pub use models::{DedupKey, Protocol, ProtocolOptions, ProtocolTag, ProxyRecord};
pub use parser::LinkParser;
pub use pipeline::{merge_token_maps, AggregationPipeline, RunStats};
pub use subscription::SubscriptionFetcher;
pub use telegram::{TelegramOutcome, TelegramScraper};
