//! V2Ray Collector - Proxy Config Aggregator
//!
//! Collects V2Ray proxy configs (VMess, VLess, Shadowsocks, Hysteria2) from
//! Telegram channel previews and subscription links, normalizes them into one
//! canonical record type, deduplicates, enriches with DNS/GeoIP data,
//! optionally probes TCP reachability and re-encodes the survivors.

pub mod collector;
pub mod config;

pub use collector::*;
pub use config::CollectorConfig;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
