//! Local CIDR/ASN ownership index.
//!
//! The index is built from a directory holding one subdirectory per
//! autonomous system, each with an `aggregated.json` record naming the AS
//! and the IPv4 blocks it announces. Containment queries go through
//! per-prefix-length tables of masked network addresses, so a lookup probes
//! at most 33 tables instead of scanning every block.
//!
//! The build happens once, on first use, and the finished index is read-only
//! for the rest of the run.

use anyhow::{bail, Context, Result};
use ipnetwork::Ipv4Network;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::store::OwnershipRecord;

/// Per-AS record file name inside each AS subdirectory
pub const AGGREGATED_FILENAME: &str = "aggregated.json";

/// How a containment query picks among overlapping blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// Most specific covering block wins. Ties go to the first-loaded block.
    #[default]
    LongestPrefix,
    /// First covering block in load order wins, matching the historical
    /// linear-scan behavior. Load order is AS directory names, sorted.
    FirstLoaded,
}

/// On-disk shape of an aggregated AS record (asn-ip repository format).
#[derive(Debug, Deserialize)]
struct AggregatedRecord {
    asn: u32,
    #[serde(default)]
    handle: String,
    #[serde(default)]
    description: String,
    subnets: SubnetList,
}

#[derive(Debug, Deserialize)]
struct SubnetList {
    #[serde(default)]
    ipv4: Vec<String>,
}

/// One announced block with its owning-AS metadata, in load order.
#[derive(Debug, Clone)]
struct BlockEntry {
    network: Ipv4Network,
    net_name: String,
    asn: u32,
    asn_description: String,
}

impl BlockEntry {
    fn to_record(&self) -> OwnershipRecord {
        OwnershipRecord {
            cidr: format!("{}/{}", self.network.network(), self.network.prefix()),
            net_name: self.net_name.clone(),
            // The aggregated records carry no country information
            country: String::new(),
            asn: self.asn.to_string(),
            asn_description: self.asn_description.clone(),
        }
    }
}

struct PrefixIndex {
    blocks: Vec<BlockEntry>,
    /// `tables[len]` maps a network address masked to `len` bits onto the
    /// index of the first-loaded block announcing exactly that prefix.
    tables: Vec<HashMap<u32, usize>>,
}

fn mask_to(addr: u32, len: usize) -> u32 {
    if len == 0 {
        0
    } else {
        addr & (u32::MAX << (32 - len))
    }
}

impl PrefixIndex {
    fn build(data_dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(data_dir)
            .with_context(|| format!("failed to read ASN data directory {}", data_dir.display()))?;

        // Sorted directory names give a deterministic load order, which the
        // first-loaded match policy depends on.
        let mut as_dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        as_dirs.sort();

        let mut blocks: Vec<BlockEntry> = Vec::new();
        let mut tables: Vec<HashMap<u32, usize>> = (0..=32).map(|_| HashMap::new()).collect();
        let mut skipped_records = 0usize;

        for as_dir in &as_dirs {
            let record_path = as_dir.join(AGGREGATED_FILENAME);
            let record: AggregatedRecord = match std::fs::read_to_string(&record_path)
                .map_err(anyhow::Error::from)
                .and_then(|content| serde_json::from_str(&content).map_err(anyhow::Error::from))
            {
                Ok(record) => record,
                Err(e) => {
                    // One bad vendor file must not take down a long scan
                    warn!("skipping AS record {}: {e}", record_path.display());
                    skipped_records += 1;
                    continue;
                }
            };

            for subnet in &record.subnets.ipv4 {
                let network: Ipv4Network = match subnet.parse() {
                    Ok(network) => network,
                    Err(e) => {
                        warn!(
                            "skipping block {subnet} announced by AS{}: {e}",
                            record.asn
                        );
                        continue;
                    }
                };

                let idx = blocks.len();
                blocks.push(BlockEntry {
                    network,
                    net_name: record.handle.clone(),
                    asn: record.asn,
                    asn_description: record.description.clone(),
                });

                let len = network.prefix() as usize;
                let key = mask_to(u32::from(network.network()), len);
                tables[len].entry(key).or_insert(idx);
            }
        }

        if blocks.is_empty() {
            bail!(
                "no address block records loaded from {} ({} AS directories, {} skipped)",
                data_dir.display(),
                as_dirs.len(),
                skipped_records
            );
        }

        debug!(
            "address block index built: {} blocks from {} AS directories ({} skipped)",
            blocks.len(),
            as_dirs.len(),
            skipped_records
        );

        Ok(Self { blocks, tables })
    }

    fn lookup(&self, ip: Ipv4Addr, policy: MatchPolicy) -> Option<&BlockEntry> {
        let addr = u32::from(ip);
        match policy {
            MatchPolicy::LongestPrefix => (0..=32usize).rev().find_map(|len| {
                self.tables[len]
                    .get(&mask_to(addr, len))
                    .map(|&idx| &self.blocks[idx])
            }),
            MatchPolicy::FirstLoaded => (0..=32usize)
                .filter_map(|len| self.tables[len].get(&mask_to(addr, len)).copied())
                .min()
                .map(|idx| &self.blocks[idx]),
        }
    }
}

/// Read-only address-block ownership index, built lazily on first lookup.
pub struct AsnDatabase {
    data_dir: PathBuf,
    policy: MatchPolicy,
    index: OnceCell<PrefixIndex>,
}

impl AsnDatabase {
    pub fn new(data_dir: &Path, policy: MatchPolicy) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            policy,
            index: OnceCell::new(),
        }
    }

    /// Force the one-time index build. Callers that need a broken data
    /// directory surfaced before any domain is processed call this up front;
    /// otherwise the first `lookup` triggers the same build.
    pub fn ensure_built(&self) -> Result<()> {
        self.index
            .get_or_try_init(|| PrefixIndex::build(&self.data_dir))
            .map(|_| ())
    }

    /// Find the address block owning `ip`. A miss is an `Ok(None)` with a
    /// warning log; only a failed index build is an error.
    pub fn lookup(&self, ip: Ipv4Addr) -> Result<Option<OwnershipRecord>> {
        let index = self
            .index
            .get_or_try_init(|| PrefixIndex::build(&self.data_dir))?;

        match index.lookup(ip, self.policy) {
            Some(block) => {
                debug!("{ip} is announced by AS{} ({})", block.asn, block.net_name);
                Ok(Some(block.to_record()))
            }
            None => {
                warn!("no address block covers {ip}");
                Ok(None)
            }
        }
    }
}
