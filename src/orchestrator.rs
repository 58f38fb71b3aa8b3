//! The enrichment work loop.
//!
//! Seeds are processed strictly in input order, one at a time. A seed whose
//! stored report already has ownership data is skipped; everything else is
//! looked up, browsed, and merged, and the whole snapshot is rewritten once
//! the seed completes. A failure inside one seed abandons that seed (its
//! persist is skipped) and the loop moves on. Entries already merged in
//! memory are not rolled back and ride along with the next successful
//! persist.

use anyhow::Result;
use std::fmt;
use tracing::{error, info};

use crate::browser::Discovery;
use crate::net_info::NetworkInfoLookup;
use crate::store::SnapshotStore;

/// Per-run outcome counters, reported once the loop finishes.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Seeds fully processed and persisted this run
    pub completed: usize,
    /// Seeds skipped because a prior run already produced ownership data
    pub skipped: usize,
    /// Seeds abandoned mid-processing
    pub failed: usize,
    /// Browser-observed hostnames enriched for the first time this run
    pub discovered_hosts: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} completed, {} skipped, {} failed, {} new host(s) discovered via browsing",
            self.completed, self.skipped, self.failed, self.discovered_hosts
        )
    }
}

pub struct Orchestrator {
    lookup: NetworkInfoLookup,
    discovery: Box<dyn Discovery>,
    store: SnapshotStore,
}

impl Orchestrator {
    pub fn new(lookup: NetworkInfoLookup, discovery: Box<dyn Discovery>, store: SnapshotStore) -> Self {
        Self {
            lookup,
            discovery,
            store,
        }
    }

    /// Drive every seed through lookup, discovery, and persistence.
    ///
    /// Only an ownership-index build failure aborts the run; everything
    /// below that boundary is absorbed into per-seed outcomes.
    pub async fn run(&mut self, seeds: &[String]) -> Result<RunSummary> {
        // Surface a broken data directory now, not during the first seed
        self.lookup.warm()?;

        let mut summary = RunSummary::default();

        for seed in seeds {
            let seed = seed.trim();
            if seed.is_empty() {
                continue;
            }

            // A seed with real ownership data is done. A seed present with
            // an empty report gets another chance: its earlier run saw no
            // addresses, which may have been transient.
            if self.store.has_ownership(seed) {
                info!("already enriched, skipping {seed}");
                summary.skipped += 1;
                continue;
            }

            match self.process_seed(seed).await {
                Ok(new_hosts) => {
                    summary.discovered_hosts += new_hosts;
                    match self.store.persist() {
                        Ok(()) => summary.completed += 1,
                        Err(e) => {
                            error!("failed to persist snapshot after {seed}: {e:#}");
                            summary.failed += 1;
                        }
                    }
                }
                Err(e) => {
                    error!("failed to process {seed}: {e:#}");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Enrich one seed: its own ownership report, then a browse of its
    /// origin, then a report for every observed hostname the store has never
    /// seen as a key. Returns how many new hostnames were enriched.
    async fn process_seed(&mut self, seed: &str) -> Result<usize> {
        let report = self.lookup.lookup(seed).await?;
        self.store.insert(seed.to_string(), report);

        let observed = self.discovery.discover(&format!("http://{seed}")).await?;

        let mut new_hosts = 0;
        for host in observed {
            // Presence as a key is enough here, even for empty entries.
            // Discovered hosts are best-effort extras, not seeds, and do not
            // get the retry-on-empty treatment.
            if self.store.contains_domain(&host) {
                continue;
            }

            let report = self.lookup.lookup(&host).await?;
            self.store.insert(host, report);
            new_hosts += 1;
        }

        Ok(new_hosts)
    }

    /// The in-memory store, for inspection after a run.
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }
}
