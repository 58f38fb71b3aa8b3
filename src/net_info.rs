//! Full ownership report assembly for a domain.
//!
//! Composes a `Resolver` with a `CidrSource`: resolve the domain, then map
//! every returned address to its owning block. A domain that resolves to
//! nothing produces an empty report; an address no source can place gets an
//! empty record under its key.

use anyhow::Result;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::info;

use crate::asn_db::AsnDatabase;
use crate::dns::Resolver;
use crate::rdap::RdapClient;
use crate::store::{OwnershipRecord, OwnershipReport};

/// Where per-IP ownership records come from. The local index is the default;
/// RDAP is the swappable alternative strategy.
pub enum CidrSource {
    Local(Arc<AsnDatabase>),
    Rdap(RdapClient),
}

impl CidrSource {
    async fn lookup(&self, ip: Ipv4Addr) -> Result<Option<OwnershipRecord>> {
        match self {
            CidrSource::Local(db) => db.lookup(ip),
            CidrSource::Rdap(client) => Ok(client.lookup(ip).await),
        }
    }

    /// Force any one-time initialization so a broken data source fails the
    /// run before the first domain instead of partway through it.
    pub fn warm(&self) -> Result<()> {
        match self {
            CidrSource::Local(db) => db.ensure_built(),
            CidrSource::Rdap(_) => Ok(()),
        }
    }
}

pub struct NetworkInfoLookup {
    resolver: Box<dyn Resolver>,
    source: CidrSource,
}

impl NetworkInfoLookup {
    pub fn new(resolver: Box<dyn Resolver>, source: CidrSource) -> Self {
        Self { resolver, source }
    }

    pub fn warm(&self) -> Result<()> {
        self.source.warm()
    }

    /// Resolve `domain` and attach an ownership record to every address.
    pub async fn lookup(&self, domain: &str) -> Result<OwnershipReport> {
        info!("enriching {domain}");

        let ips = self.resolver.resolve(domain).await?;
        let mut report = OwnershipReport::new();

        for ip in ips {
            let record = self.source.lookup(ip).await?.unwrap_or_default();
            report.insert(ip.to_string(), record);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn_db::MatchPolicy;
    use async_trait::async_trait;
    use std::collections::{BTreeSet, HashMap};
    use tempfile::TempDir;

    struct StaticResolver(HashMap<String, Vec<Ipv4Addr>>);

    #[async_trait]
    impl Resolver for StaticResolver {
        async fn resolve(&self, domain: &str) -> Result<BTreeSet<Ipv4Addr>> {
            Ok(self.0.get(domain).cloned().unwrap_or_default().into_iter().collect())
        }
    }

    fn asn_fixture() -> (TempDir, Arc<AsnDatabase>) {
        let dir = TempDir::new().unwrap();
        let as_dir = dir.path().join("AS64500");
        std::fs::create_dir_all(&as_dir).unwrap();
        let record = serde_json::json!({
            "asn": 64500,
            "handle": "Example-Net",
            "description": "Example network",
            "subnets": { "ipv4": ["203.0.113.0/24"] }
        });
        std::fs::write(as_dir.join("aggregated.json"), record.to_string()).unwrap();
        let db = Arc::new(AsnDatabase::new(dir.path(), MatchPolicy::LongestPrefix));
        (dir, db)
    }

    #[tokio::test]
    async fn test_resolution_passthrough() {
        let (_dir, db) = asn_fixture();
        let resolver = StaticResolver(HashMap::from([(
            "example.com".to_string(),
            vec!["93.184.216.34".parse().unwrap()],
        )]));
        let lookup = NetworkInfoLookup::new(Box::new(resolver), CidrSource::Local(db));

        let report = lookup.lookup("example.com").await.unwrap();
        assert_eq!(report.len(), 1);
        assert!(report.contains_key("93.184.216.34"));
    }

    #[tokio::test]
    async fn test_covered_address_gets_block_record() {
        let (_dir, db) = asn_fixture();
        let resolver = StaticResolver(HashMap::from([(
            "example.com".to_string(),
            vec!["203.0.113.77".parse().unwrap()],
        )]));
        let lookup = NetworkInfoLookup::new(Box::new(resolver), CidrSource::Local(db));

        let report = lookup.lookup("example.com").await.unwrap();
        let record = &report["203.0.113.77"];
        assert_eq!(record.cidr, "203.0.113.0/24");
        assert_eq!(record.asn, "64500");
    }

    #[tokio::test]
    async fn test_uncovered_address_gets_empty_record() {
        let (_dir, db) = asn_fixture();
        let resolver = StaticResolver(HashMap::from([(
            "example.com".to_string(),
            vec!["198.51.100.1".parse().unwrap()],
        )]));
        let lookup = NetworkInfoLookup::new(Box::new(resolver), CidrSource::Local(db));

        let report = lookup.lookup("example.com").await.unwrap();
        assert!(report["198.51.100.1"].is_unknown());
    }

    #[tokio::test]
    async fn test_unresolvable_domain_gets_empty_report() {
        let (_dir, db) = asn_fixture();
        let resolver = StaticResolver(HashMap::new());
        let lookup = NetworkInfoLookup::new(Box::new(resolver), CidrSource::Local(db));

        let report = lookup.lookup("unresolvable.example").await.unwrap();
        assert!(report.is_empty());
    }
}
