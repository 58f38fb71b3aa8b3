//! Ownership records and the durable enrichment snapshot.
//!
//! The snapshot is the unit of durable state: a mapping from domain name to
//! that domain's ownership report, loaded once at startup and rewritten in
//! full after every completed seed domain. A crash therefore loses at most
//! the work on the domain being processed, never a prior checkpoint.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Network-ownership metadata for a single IP address. Every field may be an
/// empty string when unknown; a full miss serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cidr: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub net_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub country: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub asn: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub asn_description: String,
}

impl OwnershipRecord {
    /// True when no lookup produced any metadata for the address.
    pub fn is_unknown(&self) -> bool {
        self.cidr.is_empty()
            && self.net_name.is_empty()
            && self.country.is_empty()
            && self.asn.is_empty()
            && self.asn_description.is_empty()
    }
}

/// IP address (string form) to ownership record for one domain.
pub type OwnershipReport = BTreeMap<String, OwnershipRecord>;

/// Domain name to ownership report, backed by a single JSON file.
pub struct SnapshotStore {
    path: PathBuf,
    domains: BTreeMap<String, OwnershipReport>,
}

impl SnapshotStore {
    /// Open the store, loading the existing snapshot when one is present.
    /// A snapshot that exists but cannot be parsed is a startup error.
    pub fn open(path: &Path) -> Result<Self> {
        let domains = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read snapshot {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse snapshot {}", path.display()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            domains,
        })
    }

    /// True when the domain is present as a key, regardless of whether its
    /// report is empty.
    pub fn contains_domain(&self, domain: &str) -> bool {
        self.domains.contains_key(domain)
    }

    /// True when the domain has a report with at least one IP entry. Domains
    /// with an empty report are deliberately not counted: they get another
    /// chance on the next run.
    pub fn has_ownership(&self, domain: &str) -> bool {
        self.domains.get(domain).is_some_and(|r| !r.is_empty())
    }

    pub fn get(&self, domain: &str) -> Option<&OwnershipReport> {
        self.domains.get(domain)
    }

    pub fn insert(&mut self, domain: String, report: OwnershipReport) {
        self.domains.insert(domain, report);
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Write the full snapshot to disk using write-temp, fsync, rename so an
    /// interrupted write never clobbers the previous checkpoint.
    pub fn persist(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.domains)?;

        let temp_path = self.path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&temp_path)
                .with_context(|| format!("failed to create {}", temp_path.display()))?;
            std::io::Write::write_all(&mut file, content.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("failed to replace snapshot {}", self.path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(cidr: &str, asn: &str) -> OwnershipRecord {
        OwnershipRecord {
            cidr: cidr.to_string(),
            net_name: "Example-Net".to_string(),
            country: String::new(),
            asn: asn.to_string(),
            asn_description: "Example network".to_string(),
        }
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cidrs.json");

        let mut store = SnapshotStore::open(&path).unwrap();
        let mut report = OwnershipReport::new();
        report.insert("203.0.113.77".to_string(), record("203.0.113.0/24", "64500"));
        store.insert("example.com".to_string(), report);
        store.insert("empty.example".to_string(), OwnershipReport::new());
        store.persist().unwrap();

        let reloaded = SnapshotStore::open(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.get("example.com").unwrap()["203.0.113.77"].cidr,
            "203.0.113.0/24"
        );
        assert!(reloaded.get("empty.example").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_record_serializes_as_empty_object() {
        let mut report = OwnershipReport::new();
        report.insert("198.51.100.1".to_string(), OwnershipRecord::default());

        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(json, r#"{"198.51.100.1":{}}"#);
    }

    #[test]
    fn test_empty_object_deserializes_to_unknown_record() {
        let report: OwnershipReport = serde_json::from_str(r#"{"198.51.100.1":{}}"#).unwrap();
        assert!(report["198.51.100.1"].is_unknown());
    }

    #[test]
    fn test_ownership_vs_presence() {
        let dir = TempDir::new().unwrap();
        let mut store = SnapshotStore::open(&dir.path().join("cidrs.json")).unwrap();

        store.insert("empty.example".to_string(), OwnershipReport::new());
        let mut report = OwnershipReport::new();
        report.insert("203.0.113.77".to_string(), record("203.0.113.0/24", "64500"));
        store.insert("full.example".to_string(), report);

        // Presence-as-key: both are known domains
        assert!(store.contains_domain("empty.example"));
        assert!(store.contains_domain("full.example"));
        assert!(!store.contains_domain("unknown.example"));

        // Ownership: only the domain with at least one IP entry counts
        assert!(!store.has_ownership("empty.example"));
        assert!(store.has_ownership("full.example"));
        assert!(!store.has_ownership("unknown.example"));
    }

    #[test]
    fn test_missing_snapshot_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(&dir.path().join("cidrs.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cidrs.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(SnapshotStore::open(&path).is_err());
    }

    #[test]
    fn test_persist_overwrites_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cidrs.json");

        let mut store = SnapshotStore::open(&path).unwrap();
        store.insert("first.example".to_string(), OwnershipReport::new());
        store.persist().unwrap();

        store.insert("second.example".to_string(), OwnershipReport::new());
        store.persist().unwrap();

        let reloaded = SnapshotStore::open(&path).unwrap();
        assert!(reloaded.contains_domain("first.example"));
        assert!(reloaded.contains_domain("second.example"));
    }
}
