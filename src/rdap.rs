//! RDAP-based ownership lookup, the swappable fallback to the local index.
//!
//! Queries a public RDAP bootstrap service for the network object covering
//! an IP address. Service failures degrade to "no record" and a log line;
//! nothing here aborts a scan.

use reqwest;
use serde_json::Value;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RdapConfig;
use crate::store::OwnershipRecord;

pub struct RdapClient {
    client: reqwest::Client,
    base_url: String,
}

impl RdapClient {
    pub fn new(config: &RdapConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client for RDAP");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Look up the ownership record for `ip`. Any failure (unreachable
    /// service, HTTP error, malformed body) is logged and mapped to `None`.
    pub async fn lookup(&self, ip: Ipv4Addr) -> Option<OwnershipRecord> {
        match self.query(ip).await {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("RDAP lookup failed for {ip}: {e}");
                None
            }
        }
    }

    async fn query(&self, ip: Ipv4Addr) -> anyhow::Result<OwnershipRecord> {
        let url = format!("{}/ip/{}", self.base_url, ip);
        debug!("RDAP query: {url}");

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: Value = response.json().await?;

        Ok(parse_network_object(&body))
    }
}

/// Map an RDAP IP network object onto the snapshot record shape. Absent
/// fields stay empty rather than failing the lookup.
fn parse_network_object(body: &Value) -> OwnershipRecord {
    // The cidr0 extension carries the covering prefix; ARIN, RIPE and APNIC
    // all serve it for IPv4 networks.
    let cidr = body
        .get("cidr0_cidrs")
        .and_then(Value::as_array)
        .and_then(|cidrs| cidrs.first())
        .and_then(|entry| {
            let prefix = entry.get("v4prefix")?.as_str()?;
            let length = entry.get("length")?.as_u64()?;
            Some(format!("{prefix}/{length}"))
        })
        .unwrap_or_default();

    let net_name = body
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let country = body
        .get("country")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    // ARIN's originas0 extension; other registries usually omit origin ASNs
    let asn = body
        .get("arin_originas0_originautnums")
        .and_then(Value::as_array)
        .and_then(|nums| nums.first())
        .and_then(Value::as_u64)
        .map(|n| n.to_string())
        .unwrap_or_default();

    // RDAP network objects carry no free-text AS description
    OwnershipRecord {
        cidr,
        net_name,
        country,
        asn,
        asn_description: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_network_object() {
        let body = serde_json::json!({
            "objectClassName": "ip network",
            "handle": "NET-203-0-113-0-1",
            "name": "EXAMPLE-NET",
            "country": "US",
            "startAddress": "203.0.113.0",
            "endAddress": "203.0.113.255",
            "cidr0_cidrs": [{ "v4prefix": "203.0.113.0", "length": 24 }],
            "arin_originas0_originautnums": [64500]
        });

        let record = parse_network_object(&body);
        assert_eq!(record.cidr, "203.0.113.0/24");
        assert_eq!(record.net_name, "EXAMPLE-NET");
        assert_eq!(record.country, "US");
        assert_eq!(record.asn, "64500");
        assert_eq!(record.asn_description, "");
    }

    #[test]
    fn test_parse_sparse_network_object() {
        let body = serde_json::json!({
            "objectClassName": "ip network",
            "name": "SPARSE-NET"
        });

        let record = parse_network_object(&body);
        assert_eq!(record.net_name, "SPARSE-NET");
        assert_eq!(record.cidr, "");
        assert_eq!(record.country, "");
        assert_eq!(record.asn, "");
    }

    #[test]
    fn test_parse_garbage_body_yields_unknown_record() {
        let record = parse_network_object(&serde_json::json!("unexpected"));
        assert!(record.is_unknown());
    }
}
