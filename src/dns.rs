//! Domain-to-IPv4 resolution.
//!
//! Resolution failures are absorbed here: a domain that does not resolve
//! (NXDOMAIN, timeout, server error) yields an empty set and a log line,
//! never an error. No retries are performed.

use anyhow::Result;
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, warn};

/// Resolve a domain name to the IPv4 addresses currently advertised for it.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, domain: &str) -> Result<BTreeSet<Ipv4Addr>>;
}

/// System-configured resolver with an explicit per-query timeout.
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
}

impl DnsResolver {
    /// Build from the host's resolver configuration (/etc/resolv.conf or the
    /// platform equivalent), bounding each query by `timeout`.
    pub fn from_system_conf(timeout: Duration) -> Result<Self> {
        let (config, mut opts) = hickory_resolver::system_conf::read_system_conf()?;
        configure_opts(&mut opts, timeout);
        Ok(Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        })
    }

    /// Build against an explicit upstream configuration.
    pub fn with_config(config: ResolverConfig, timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        configure_opts(&mut opts, timeout);
        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

fn configure_opts(opts: &mut ResolverOpts, timeout: Duration) {
    opts.timeout = timeout;
    // One shot per query; a flaky domain is recorded as unresolved and the
    // scan moves on.
    opts.attempts = 1;
}

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(&self, domain: &str) -> Result<BTreeSet<Ipv4Addr>> {
        debug!("resolving {domain}");

        match self.resolver.ipv4_lookup(domain).await {
            Ok(lookup) => {
                let ips: BTreeSet<Ipv4Addr> = lookup.iter().map(|a| a.0).collect();
                debug!("{domain} resolved to {} address(es)", ips.len());
                Ok(ips)
            }
            Err(e) => {
                warn!("failed to resolve {domain}: {e}");
                Ok(BTreeSet::new())
            }
        }
    }
}
