//! Browser-driven third-party host discovery.
//!
//! Loads a domain's origin in an isolated headless Chrome session and
//! records the hostname of every request the page issues, whatever the
//! resource type. Observed hostnames are pushed onto a shared
//! queue by the request observer and drained once the navigation-plus-grace
//! window closes. The session is torn down on every exit path; discovery
//! failures degrade to whatever was captured before the failure.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::BrowserConfig;

/// Observe the distinct hostnames a page contacts while loading `url`.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn discover(&self, url: &str) -> Result<HashSet<String>>;
}

pub struct BrowserDiscovery {
    navigation_timeout: Duration,
    grace_period: Duration,
    chrome_path: Option<PathBuf>,
    headers: HashMap<String, String>,
}

impl BrowserDiscovery {
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            navigation_timeout: Duration::from_millis(config.navigation_timeout_ms),
            grace_period: Duration::from_millis(config.grace_period_ms),
            chrome_path: config.chrome_path.clone(),
            headers: config.headers.clone(),
        }
    }
}

#[async_trait]
impl Discovery for BrowserDiscovery {
    async fn discover(&self, url: &str) -> Result<HashSet<String>> {
        let url = url.to_string();
        let navigation_timeout = self.navigation_timeout;
        let grace_period = self.grace_period;
        let chrome_path = self.chrome_path.clone();
        let headers = self.headers.clone();

        let handle = tokio::task::spawn_blocking(move || {
            collect_request_hosts(
                &url,
                navigation_timeout,
                grace_period,
                chrome_path.as_deref(),
                &headers,
            )
        });

        match handle.await {
            Ok(hosts) => Ok(hosts),
            Err(e) => {
                warn!("browser task panicked: {e}");
                Ok(HashSet::new())
            }
        }
    }
}

/// Run one browser session against `url` and return every hostname observed.
/// Session failures are logged here; the caller always gets a set, possibly
/// empty, possibly partial.
fn collect_request_hosts(
    url: &str,
    navigation_timeout: Duration,
    grace_period: Duration,
    chrome_path: Option<&Path>,
    headers: &HashMap<String, String>,
) -> HashSet<String> {
    let captured = Arc::new(Mutex::new(Vec::<String>::new()));

    if let Err(e) = run_session(
        url,
        navigation_timeout,
        grace_period,
        chrome_path,
        headers,
        captured.clone(),
    ) {
        warn!("browser session failed for {url}: {e}");
    }

    let hosts: HashSet<String> = captured.lock().unwrap().drain(..).collect();
    info!("{url} -> {} unique host(s) observed", hosts.len());
    hosts
}

fn run_session(
    url: &str,
    navigation_timeout: Duration,
    grace_period: Duration,
    chrome_path: Option<&Path>,
    headers: &HashMap<String, String>,
    captured: Arc<Mutex<Vec<String>>>,
) -> Result<()> {
    let browser = launch_browser(chrome_path)?;
    let tab = browser
        .new_tab()
        .map_err(|e| anyhow!("Failed to create tab: {e}"))?;

    tab.set_default_timeout(navigation_timeout);

    if !headers.is_empty() {
        let header_refs: HashMap<&str, &str> = headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        if let Err(e) = tab.set_extra_http_headers(header_refs) {
            warn!("failed to set request headers for {url}: {e}");
        }
    }

    tab.register_response_handling(
        "request-hosts",
        Box::new(move |event_params, _fetch_body| {
            let request_url = &event_params.response.url;
            debug!("request observed: {request_url}");
            if let Some(host) = host_of(request_url) {
                if let Ok(mut hosts) = captured.lock() {
                    hosts.push(host);
                }
            }
        }),
    )
    .map_err(|e| anyhow!("Failed to register request observer: {e}"))?;

    // Navigation errors and timeouts are routine on slow or hostile pages;
    // keep whatever was captured and proceed to the grace wait.
    match tab.navigate_to(url).and_then(|t| t.wait_until_navigated()) {
        Ok(_) => debug!("navigation settled for {url}"),
        Err(e) => warn!("navigation failed or timed out for {url}: {e}"),
    }

    // Straggler window: late beacons and deferred scripts fire after the
    // network has nominally settled.
    std::thread::sleep(grace_period);

    let _ = tab.deregister_response_handling("request-hosts");
    Ok(())
    // browser drops here on every path, reaping the Chrome process
}

/// Launch a headless Chrome instance. Disables the sandbox when running
/// inside a container (detected via /.dockerenv).
fn launch_browser(chrome_path: Option<&Path>) -> Result<headless_chrome::Browser> {
    let is_container = Path::new("/.dockerenv").exists();

    let mut builder = headless_chrome::LaunchOptions::default_builder();
    builder.sandbox(!is_container);
    if let Some(path) = chrome_path {
        builder.path(Some(path.to_path_buf()));
    }

    let options = builder
        .build()
        .map_err(|e| anyhow!("Failed to build Chrome launch options: {e}"))?;
    headless_chrome::Browser::new(options)
        .map_err(|e| anyhow!("Failed to launch headless Chrome: {e}"))
}

/// Hostname portion of a request URL, if it has one.
fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of_absolute_urls() {
        assert_eq!(
            host_of("https://cdn.example/assets/app.js"),
            Some("cdn.example".to_string())
        );
        assert_eq!(
            host_of("http://tracker.example:8080/pixel?id=1"),
            Some("tracker.example".to_string())
        );
    }

    #[test]
    fn test_host_of_rejects_schemes_without_hosts() {
        assert_eq!(host_of("data:text/html,hello"), None);
        assert_eq!(host_of("about:blank"), None);
    }

    #[test]
    fn test_host_of_rejects_relative_urls() {
        assert_eq!(host_of("/assets/app.js"), None);
        assert_eq!(host_of("not a url"), None);
    }

    #[test]
    fn test_repeated_hosts_collapse_to_one() {
        let captured = vec![
            "https://cdn.example/a.js".to_string(),
            "https://cdn.example/b.css".to_string(),
            "https://pixel.example/t?x=1".to_string(),
        ];
        let hosts: HashSet<String> = captured.iter().filter_map(|u| host_of(u)).collect();
        assert_eq!(hosts.len(), 2);
        assert!(hosts.contains("cdn.example"));
        assert!(hosts.contains("pixel.example"));
    }

    #[test]
    fn test_config_timings_are_applied() {
        let config = BrowserConfig {
            navigation_timeout_ms: 1_000,
            grace_period_ms: 250,
            chrome_path: None,
            headers: HashMap::new(),
        };
        let discovery = BrowserDiscovery::new(&config);
        assert_eq!(discovery.navigation_timeout, Duration::from_millis(1_000));
        assert_eq!(discovery.grace_period, Duration::from_millis(250));
    }
}
