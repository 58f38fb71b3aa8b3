use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ipscan::asn_db::AsnDatabase;
use ipscan::browser::BrowserDiscovery;
use ipscan::config::AppConfig;
use ipscan::dns::DnsResolver;
use ipscan::net_info::{CidrSource, NetworkInfoLookup};
use ipscan::orchestrator::Orchestrator;
use ipscan::store::SnapshotStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    let seeds = read_seed_list(&config.paths.seed_list)?;
    info!("loaded {} seed domain(s) from {}", seeds.len(), config.paths.seed_list.display());

    let asn_db = Arc::new(AsnDatabase::new(&config.paths.asn_data_dir, config.asn.match_policy));
    let resolver = DnsResolver::from_system_conf(Duration::from_secs(config.dns.timeout_secs))
        .context("failed to build DNS resolver")?;
    let lookup = NetworkInfoLookup::new(Box::new(resolver), CidrSource::Local(asn_db));
    let discovery = BrowserDiscovery::new(&config.browser);
    let store = SnapshotStore::open(&config.paths.snapshot_file)?;

    let mut orchestrator = Orchestrator::new(lookup, Box::new(discovery), store);
    let summary = orchestrator.run(&seeds).await?;

    info!("run complete: {summary}");
    info!("{} domain(s) in snapshot {}", orchestrator.store().len(), config.paths.snapshot_file.display());

    Ok(())
}

/// Read the newline-delimited seed list. A missing file is a startup error;
/// blank lines and surrounding whitespace are ignored.
fn read_seed_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed domain list {}", path.display()))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
