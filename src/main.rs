use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use v2ray_collector::collector::{
    merge_token_maps, output, AggregationPipeline, PipelineContext, ProtocolTag, ProxyRecord,
    RunStats, SubscriptionFetcher, TelegramOutcome, TelegramScraper,
};
use v2ray_collector::config::CollectorConfig;

/// Aggregates V2Ray proxy configs from Telegram channels and subscription
/// links, verifies them and republishes the survivors
#[derive(Parser)]
#[command(name = "v2ray-collector")]
#[command(about = "Collects, verifies and republishes V2Ray proxy configs")]
struct Cli {
    /// Directory holding the channel list, link list and GeoIP databases
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Directory the outputs are written to
    #[arg(short, long, default_value = "sub")]
    output_dir: PathBuf,

    /// Remote JSON array of subscription link URLs; the local file is the
    /// fallback when this is unset or unreachable
    #[arg(long)]
    links_url: Option<String>,

    /// Probe TCP reachability and drop unreachable configs
    #[arg(long)]
    test_connectivity: bool,

    /// Probe at most this many configs (random sample above it)
    #[arg(long, default_value = "2500")]
    max_tests: usize,

    /// Skip subscription link fetching
    #[arg(long)]
    no_subscriptions: bool,

    /// Seed for sampling and shuffling, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = CollectorConfig::new()
        .with_connectivity_test(cli.test_connectivity)
        .with_subscription_fetching(!cli.no_subscriptions)
        .with_max_connectivity_tests(cli.max_tests);
    if let Some(seed) = cli.seed {
        config = config.with_rng_seed(seed);
    }
    let country_mmdb = cli.data_dir.join("GeoLite2-Country.mmdb");
    if country_mmdb.exists() {
        config = config.with_country_mmdb(country_mmdb);
    } else {
        warn!("No country GeoIP database found, country lookups disabled");
    }
    let asn_mmdb = cli.data_dir.join("GeoLite2-ASN.mmdb");
    if asn_mmdb.exists() {
        config = config.with_asn_mmdb(asn_mmdb);
    }

    let ctx = PipelineContext::new(config)?;
    tokio::fs::create_dir_all(&cli.data_dir).await?;

    let channels = load_channels(&cli.data_dir.join("telegram_channels.json")).await;
    info!("Loaded {} Telegram channels", channels.len());
    let links = load_subscription_links(
        &ctx,
        cli.links_url.as_deref(),
        &cli.data_dir.join("subscription_links.json"),
    )
    .await;
    info!("Loaded {} subscription links", links.len());

    let telegram = TelegramScraper::new(&ctx).scrape_all(&channels).await;
    tokio::fs::write(
        cli.data_dir.join("telegram_report.log"),
        telegram.render_report(),
    )
    .await?;

    let mut all_raw: HashMap<ProtocolTag, Vec<String>> = telegram.merged_tokens();
    if ctx.config.enable_subscription_fetching {
        let subs = SubscriptionFetcher::new(&ctx).fetch_all(&links).await;
        merge_token_maps(&mut all_raw, subs);
    }

    if all_raw.values().all(Vec::is_empty) {
        error!("No configs found, nothing to do");
        return Ok(());
    }

    let records = AggregationPipeline::new(&ctx).run(all_raw).await;
    let stats = RunStats::compute(&records, &telegram);

    write_outputs(&cli.output_dir, &records, &ctx.config.header_signatures).await?;
    log_summary(&stats, &telegram);

    Ok(())
}

/// Channel names from a local JSON array; absent or broken file means no
/// Telegram scraping
async fn load_channels(path: &Path) -> Vec<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Failed to parse {}: {e}", path.display());
            Vec::new()
        }),
        Err(_) => Vec::new(),
    }
}

/// Subscription links, remote-first with the local file as fallback. A
/// successful remote fetch refreshes the local backup.
async fn load_subscription_links(
    ctx: &PipelineContext,
    remote_url: Option<&str>,
    local_path: &Path,
) -> Vec<String> {
    if let Some(url) = remote_url {
        let (status, content) = ctx.get_text(url).await;
        if status == 200 && !content.is_empty() {
            if let Ok(links) = serde_json::from_str::<Vec<String>>(&content) {
                if let Err(e) = tokio::fs::write(local_path, &content).await {
                    warn!("Failed to refresh {}: {e}", local_path.display());
                }
                return links;
            }
            warn!("Remote link list is not a JSON array of strings");
        } else {
            warn!("Failed to fetch remote link list (status {status})");
        }
    }

    match tokio::fs::read_to_string(local_path).await {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

/// Write every output document. Runs only after the pipeline succeeded, so a
/// failed run never touches previously published output.
async fn write_outputs(
    output_dir: &Path,
    records: &[ProxyRecord],
    signatures: &[String],
) -> Result<()> {
    info!("Saving outputs to {}", output_dir.display());
    for sub_dir in ["subscribe", "protocols", "countries", "clash", "singbox"] {
        tokio::fs::create_dir_all(output_dir.join(sub_dir)).await?;
    }

    tokio::fs::write(
        output_dir.join("subscribe").join("base64.txt"),
        output::subscription_content(records, signatures),
    )
    .await?;
    tokio::fs::write(
        output_dir.join("all_configs.txt"),
        output::raw_uri_list(records),
    )
    .await?;
    tokio::fs::write(
        output_dir.join("clash").join("meta.yaml"),
        output::to_clash_yaml(records),
    )
    .await?;
    tokio::fs::write(
        output_dir.join("singbox").join("config.json"),
        output::to_singbox_json(records),
    )
    .await?;

    let mut by_protocol: HashMap<&str, Vec<&ProxyRecord>> = HashMap::new();
    let mut by_country: HashMap<&str, Vec<&ProxyRecord>> = HashMap::new();
    for record in records {
        by_protocol.entry(record.protocol.as_str()).or_default().push(record);
        if record.country != "XX" {
            by_country.entry(record.country.as_str()).or_default().push(record);
        }
    }
    for (name, group) in by_protocol {
        let listing = group.iter().map(|r| r.to_uri()).collect::<Vec<_>>().join("\n");
        tokio::fs::write(output_dir.join("protocols").join(format!("{name}.txt")), listing).await?;
    }
    for (name, group) in by_country {
        let listing = group.iter().map(|r| r.to_uri()).collect::<Vec<_>>().join("\n");
        tokio::fs::write(output_dir.join("countries").join(format!("{name}.txt")), listing).await?;
    }

    Ok(())
}

fn log_summary(stats: &RunStats, telegram: &TelegramOutcome) {
    info!("Total unique configs: {}", stats.total);
    let mut protocols: Vec<_> = stats.per_protocol.iter().collect();
    protocols.sort_by(|a, b| b.1.cmp(a.1));
    for (protocol, count) in protocols {
        info!("  {}: {count}", protocol.label());
    }
    let mut countries: Vec<_> = stats
        .per_country
        .iter()
        .filter(|(country, _)| country.as_str() != "XX")
        .collect();
    countries.sort_by(|a, b| b.1.cmp(a.1));
    for (country, count) in countries.into_iter().take(5) {
        info!("  {country}: {count}");
    }
    info!(
        "Channels: {} ok, {} failed",
        telegram.successful.len(),
        telegram.failed.len()
    );
}
