//! Aggregation pipeline
//!
//! Strictly sequential stages over the merged raw-token map:
//! decode -> dedup -> (sample) -> enrich -> (probe) -> format -> order.
//! Randomness is injected so sampling and shuffling are reproducible under
//! test.

use crate::collector::checker::ConnectivityChecker;
use crate::collector::context::PipelineContext;
use crate::collector::models::{country_flag, DedupKey, Protocol, ProtocolTag, ProxyRecord};
use crate::collector::parser::LinkParser;
use crate::collector::telegram::TelegramOutcome;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};

/// Sort sentinel for records that were never probed
const UNPROBED_PING: u64 = u64::MAX;

/// Aggregate counts handed to the reporting layer
#[derive(Debug, Default)]
pub struct RunStats {
    pub total: usize,
    pub per_protocol: HashMap<Protocol, usize>,
    pub per_country: HashMap<String, usize>,
    pub successful_channels: Vec<(String, usize)>,
    pub failed_channels: Vec<String>,
}

impl RunStats {
    pub fn compute(records: &[ProxyRecord], telegram: &TelegramOutcome) -> Self {
        let mut per_protocol: HashMap<Protocol, usize> = HashMap::new();
        let mut per_country: HashMap<String, usize> = HashMap::new();
        for record in records {
            *per_protocol.entry(record.protocol).or_default() += 1;
            *per_country.entry(record.country.clone()).or_default() += 1;
        }
        Self {
            total: records.len(),
            per_protocol,
            per_country,
            successful_channels: telegram.successful.clone(),
            failed_channels: telegram.failed.clone(),
        }
    }
}

/// Merge one tag-keyed token map into another
pub fn merge_token_maps(
    into: &mut HashMap<ProtocolTag, Vec<String>>,
    from: HashMap<ProtocolTag, Vec<String>>,
) {
    for (tag, tokens) in from {
        into.entry(tag).or_default().extend(tokens);
    }
}

/// Runs the aggregation stages over the merged raw tokens
pub struct AggregationPipeline<'a> {
    ctx: &'a PipelineContext,
    rng: StdRng,
}

impl<'a> AggregationPipeline<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        let rng = match ctx.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { ctx, rng }
    }

    /// Run every stage and return the final ordered record list
    pub async fn run(&mut self, raw: HashMap<ProtocolTag, Vec<String>>) -> Vec<ProxyRecord> {
        let config = &self.ctx.config;
        let mut unique = Self::decode_and_dedupe(&raw);
        log::info!("Unique configs after parsing: {}", unique.len());

        // Sampling before enrichment bounds the DNS/geo and probing cost.
        if config.enable_connectivity_test && unique.len() > config.max_connectivity_tests {
            log::info!(
                "Sampling {} configs from {}",
                config.max_connectivity_tests,
                unique.len()
            );
            Self::sample_keys(&mut unique, config.max_connectivity_tests, &mut self.rng);
        }

        self.enrich(&mut unique).await;

        if config.enable_connectivity_test {
            self.probe(&mut unique).await;
        }

        let mut records: Vec<ProxyRecord> = unique.into_values().collect();
        for record in &mut records {
            record.remarks = format_remark(record);
        }

        Self::order(records, config.enable_connectivity_test, &mut self.rng)
    }

    /// Decode every raw token; successfully decoded records go into a keyed
    /// map where later inserts overwrite earlier ones
    pub fn decode_and_dedupe(
        raw: &HashMap<ProtocolTag, Vec<String>>,
    ) -> HashMap<DedupKey, ProxyRecord> {
        let mut unique = HashMap::new();
        for (tag, tokens) in raw {
            for token in tokens {
                if let Some(record) = LinkParser::parse(token, *tag) {
                    unique.insert(record.dedup_key(), record);
                }
            }
        }
        unique
    }

    /// Uniform sample without replacement of exactly `max` keys
    fn sample_keys(
        unique: &mut HashMap<DedupKey, ProxyRecord>,
        max: usize,
        rng: &mut StdRng,
    ) {
        let keys: Vec<DedupKey> = unique.keys().cloned().collect();
        let keep: HashSet<DedupKey> = keys.choose_multiple(rng, max).cloned().collect();
        unique.retain(|key, _| keep.contains(key));
    }

    /// Resolve every distinct host once, then stamp IP, country and ASN onto
    /// the records
    async fn enrich(&self, unique: &mut HashMap<DedupKey, ProxyRecord>) {
        let hosts: HashSet<String> = unique.values().map(|r| r.host.clone()).collect();
        log::info!("Resolving DNS for {} hosts", hosts.len());

        let resolved = join_all(hosts.into_iter().map(|host| async move {
            let ip = self.ctx.dns.resolve(&host).await;
            (host, ip)
        }))
        .await;
        let dns_map: HashMap<String, Option<String>> = resolved.into_iter().collect();

        for record in unique.values_mut() {
            record.resolved_ip = dns_map.get(&record.host).cloned().flatten();
            if let Some(ip) = record.resolved_ip.clone() {
                let (country, asn_org) = self.ctx.geo.info(&ip);
                record.country = country;
                record.asn_org = asn_org;
            }
        }
    }

    /// Probe every record and drop the unreachable ones
    async fn probe(&self, unique: &mut HashMap<DedupKey, ProxyRecord>) {
        let config = &self.ctx.config;
        let checker = ConnectivityChecker::new(
            config.connectivity_test_timeout,
            config.connectivity_test_concurrency,
        );

        let keys: Vec<DedupKey> = unique.keys().cloned().collect();
        let targets: Vec<(usize, String, u16)> = keys
            .iter()
            .enumerate()
            .filter_map(|(index, key)| {
                unique.get(key).map(|record| {
                    let target = record
                        .resolved_ip
                        .clone()
                        .unwrap_or_else(|| record.host.clone());
                    (index, target, record.port)
                })
            })
            .collect();

        for (index, ping) in checker.probe_all(targets).await {
            if let Some(ping) = ping {
                if let Some(record) = unique.get_mut(&keys[index]) {
                    record.ping_ms = Some(ping);
                }
            }
        }

        unique.retain(|_, record| record.ping_ms.is_some());
        log::info!("Active configs after probing: {}", unique.len());
    }

    /// Shuffle, then (when probing ran) stably sort ascending by ping so
    /// equal pings keep their shuffled relative order
    fn order(
        mut records: Vec<ProxyRecord>,
        probing_enabled: bool,
        rng: &mut StdRng,
    ) -> Vec<ProxyRecord> {
        records.shuffle(rng);
        if probing_enabled {
            records.sort_by_key(|record| record.ping_ms.unwrap_or(UNPROBED_PING));
        }
        records
    }
}

/// Deterministic remarks: `"<country> <flag> ┃ <PROTO>-<NET>-<SEC>[ - <asn>] ┃ <ip|N/A>"`
pub fn format_remark(record: &ProxyRecord) -> String {
    let network = if record.network.is_empty() {
        "TCP".to_string()
    } else {
        record.network.to_uppercase()
    };
    let asn = record
        .asn_org
        .as_ref()
        .map(|org| format!(" - {org}"))
        .unwrap_or_default();
    let ip = record.resolved_ip.as_deref().unwrap_or("N/A");
    format!(
        "{} {} ┃ {}-{}-{}{} ┃ {}",
        record.country,
        country_flag(&record.country),
        record.protocol.label(),
        network,
        record.security_label(),
        asn,
        ip
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::models::ProtocolOptions;

    fn record(host: &str, port: u16, identifier: &str) -> ProxyRecord {
        ProxyRecord {
            protocol: Protocol::Vless,
            host: host.to_string(),
            port,
            identifier: identifier.to_string(),
            remarks: "raw".to_string(),
            network: "tcp".to_string(),
            security: "tls".to_string(),
            path: None,
            sni: None,
            fingerprint: None,
            options: ProtocolOptions::Vless {
                flow: None,
                public_key: None,
                short_id: None,
                host_header: None,
                mode: None,
            },
            source_tag: ProtocolTag::Vless,
            resolved_ip: None,
            country: "XX".to_string(),
            asn_org: None,
            ping_ms: None,
        }
    }

    #[test]
    fn test_dedupe_last_wins() {
        let raw = HashMap::from([(
            ProtocolTag::Vless,
            vec![
                "vless://u@h.example:443?type=tcp&security=tls#First".to_string(),
                "vless://u@h.example:443?type=ws&security=tls#Second".to_string(),
            ],
        )]);
        let unique = AggregationPipeline::decode_and_dedupe(&raw);
        assert_eq!(unique.len(), 1);
        let survivor = unique.values().next().unwrap();
        assert_eq!(survivor.remarks, "Second");
        assert_eq!(survivor.network, "ws");
    }

    #[test]
    fn test_dedupe_drops_malformed_tokens() {
        let raw = HashMap::from([
            (
                ProtocolTag::Shadowsocks,
                vec![
                    "ss://nonsenseNoAt:443".to_string(),
                    "ss://YWVzLTI1Ni1nY206cGFzcw==@1.2.3.4:8388#ok".to_string(),
                ],
            ),
            (ProtocolTag::Vmess, vec!["vmess://%%%garbage%%%".to_string()]),
        ]);
        let unique = AggregationPipeline::decode_and_dedupe(&raw);
        assert_eq!(unique.len(), 1);
    }

    #[test]
    fn test_distinct_keys_survive_together() {
        let raw = HashMap::from([(
            ProtocolTag::Vless,
            vec![
                "vless://u@h.example:443?type=tcp#a".to_string(),
                "vless://u@h.example:444?type=tcp#b".to_string(),
                "vless://v@h.example:443?type=tcp#c".to_string(),
            ],
        )]);
        let unique = AggregationPipeline::decode_and_dedupe(&raw);
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_sampling_exactness() {
        let mut unique: HashMap<DedupKey, ProxyRecord> = HashMap::new();
        for port in 1..=20u16 {
            let r = record("h.example", port, "u");
            unique.insert(r.dedup_key(), r);
        }
        let before: HashSet<DedupKey> = unique.keys().cloned().collect();

        let mut rng = StdRng::seed_from_u64(7);
        AggregationPipeline::sample_keys(&mut unique, 5, &mut rng);
        assert_eq!(unique.len(), 5);
        for key in unique.keys() {
            assert!(before.contains(key));
        }
    }

    #[test]
    fn test_order_sorts_by_ping_with_missing_last() {
        let mut records = Vec::new();
        for (port, ping) in [(1u16, Some(50)), (2, None), (3, Some(10)), (4, Some(50))] {
            let mut r = record("h.example", port, "u");
            r.ping_ms = ping;
            records.push(r);
        }
        let mut rng = StdRng::seed_from_u64(1);
        let ordered = AggregationPipeline::order(records, true, &mut rng);

        let pings: Vec<Option<u64>> = ordered.iter().map(|r| r.ping_ms).collect();
        assert_eq!(pings[0], Some(10));
        assert_eq!(pings[3], None);
        let sentinel: Vec<u64> = pings.iter().map(|p| p.unwrap_or(u64::MAX)).collect();
        let mut sorted = sentinel.clone();
        sorted.sort();
        assert_eq!(sentinel, sorted);
    }

    #[test]
    fn test_order_without_probing_only_shuffles() {
        let records: Vec<ProxyRecord> =
            (1..=30u16).map(|port| record("h.example", port, "u")).collect();
        let original_ports: Vec<u16> = records.iter().map(|r| r.port).collect();

        let mut rng = StdRng::seed_from_u64(2);
        let shuffled = AggregationPipeline::order(records.clone(), false, &mut rng);
        let shuffled_ports: Vec<u16> = shuffled.iter().map(|r| r.port).collect();

        // same multiset, and with 30 elements a seeded shuffle moves something
        let mut a = original_ports.clone();
        let mut b = shuffled_ports.clone();
        a.sort();
        b.sort();
        assert_eq!(a, b);
        assert_ne!(original_ports, shuffled_ports);

        // reproducible under the same seed
        let mut rng_again = StdRng::seed_from_u64(2);
        let again = AggregationPipeline::order(records, false, &mut rng_again);
        let again_ports: Vec<u16> = again.iter().map(|r| r.port).collect();
        assert_eq!(shuffled_ports, again_ports);
    }

    #[tokio::test]
    async fn test_probe_filter_drops_unreachable_records() {
        use crate::config::CollectorConfig;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_port = listener.local_addr().unwrap().port();
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed_port = closed.local_addr().unwrap().port();
        drop(closed);

        let config = CollectorConfig::new().with_connectivity_test(true);
        let ctx = PipelineContext::new(config).unwrap();
        let pipeline = AggregationPipeline::new(&ctx);

        let mut unique: HashMap<DedupKey, ProxyRecord> = HashMap::new();
        for port in [open_port, closed_port] {
            let r = record("127.0.0.1", port, "u");
            unique.insert(r.dedup_key(), r);
        }
        pipeline.probe(&mut unique).await;

        assert_eq!(unique.len(), 1);
        let survivor = unique.values().next().unwrap();
        assert_eq!(survivor.port, open_port);
        assert!(survivor.ping_ms.is_some());
    }

    #[test]
    fn test_format_remark() {
        let mut r = record("h.example", 443, "u");
        r.country = "DE".to_string();
        r.resolved_ip = Some("1.2.3.4".to_string());
        r.asn_org = Some("Hetzner".to_string());
        assert_eq!(
            format_remark(&r),
            "DE 🇩🇪 ┃ VLESS-TCP-TLS - Hetzner ┃ 1.2.3.4"
        );
    }

    #[test]
    fn test_format_remark_defaults() {
        let mut r = record("h.example", 443, "u");
        r.security = "none".to_string();
        r.network = String::new();
        assert_eq!(format_remark(&r), "XX 🏳️ ┃ VLESS-TCP-NTLS ┃ N/A");
    }

    #[test]
    fn test_merge_token_maps() {
        let mut into = HashMap::from([(ProtocolTag::Vmess, vec!["vmess://a".to_string()])]);
        let from = HashMap::from([
            (ProtocolTag::Vmess, vec!["vmess://b".to_string()]),
            (ProtocolTag::Hysteria2, vec!["hy2://c".to_string()]),
        ]);
        merge_token_maps(&mut into, from);
        assert_eq!(into[&ProtocolTag::Vmess].len(), 2);
        assert_eq!(into[&ProtocolTag::Hysteria2].len(), 1);
    }

    #[test]
    fn test_stats_compute() {
        let mut a = record("h.example", 1, "u");
        a.country = "DE".to_string();
        let mut b = record("h.example", 2, "u");
        b.country = "DE".to_string();
        let mut c = record("h.example", 3, "u");
        c.protocol = Protocol::Vmess;

        let telegram = TelegramOutcome {
            successful: vec![("chan".to_string(), 3)],
            failed: vec!["gone".to_string()],
            total: 2,
            ..Default::default()
        };
        let stats = RunStats::compute(&[a, b, c], &telegram);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.per_protocol[&Protocol::Vless], 2);
        assert_eq!(stats.per_protocol[&Protocol::Vmess], 1);
        assert_eq!(stats.per_country[&"DE".to_string()], 2);
        assert_eq!(stats.per_country[&"XX".to_string()], 1);
        assert_eq!(stats.successful_channels.len(), 1);
        assert_eq!(stats.failed_channels.len(), 1);
    }
}
