//! Boot-time denylist loading.
//!
//! Sources are fetched once when the process starts. A source that fails is
//! logged and skipped, so a dead list never keeps the pixel from serving.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::{info, warn};
use tracking_core::referrer::host_from_list_line;
use tracking_core::Blacklist;

/// Hostnames inside the visible text of an HTML page.
static HTML_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b((?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,24})\b")
        .expect("invalid host pattern")
});

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("invalid tag pattern"));

/// Where spam-referrer hosts come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlacklistConfig {
    /// Plain-text lists, one host per line.
    pub sources: Vec<String>,
    /// HTML pages listing hosts in their text.
    pub html_sources: Vec<String>,
    /// Local file in the plain-text format.
    pub file: Option<String>,
    pub fetch_timeout_secs: u64,
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            html_sources: Vec::new(),
            file: None,
            fetch_timeout_secs: 10,
        }
    }
}

/// Hosts of a plain-text list.
pub fn parse_text_list(body: &str) -> Vec<String> {
    body.lines().filter_map(host_from_list_line).collect()
}

/// Hosts mentioned in the text of an HTML page. Markup is dropped first so
/// attribute values and tag names do not leak in.
pub fn parse_html_list(body: &str) -> Vec<String> {
    let text = HTML_TAG.replace_all(body, " ");
    HTML_HOST
        .captures_iter(&text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect()
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<String, reqwest::Error> {
    client.get(url).send().await?.error_for_status()?.text().await
}

/// Fetches every configured source and builds the denylist.
pub async fn load_blacklist(config: &BlacklistConfig) -> Blacklist {
    let mut hosts: Vec<String> = Vec::new();

    if let Some(path) = &config.file {
        match tokio::fs::read_to_string(path).await {
            Ok(body) => {
                let found = parse_text_list(&body);
                info!(path = %path, hosts = found.len(), "Loaded denylist file");
                hosts.extend(found);
            }
            Err(e) => warn!(path = %path, error = %e, "Failed to read denylist file"),
        }
    }

    if !config.sources.is_empty() || !config.html_sources.is_empty() {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
        {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "Failed to build HTTP client, skipping remote denylists");
                None
            }
        };

        if let Some(client) = client {
            let text = config.sources.iter().map(|u| (u, false));
            let html = config.html_sources.iter().map(|u| (u, true));

            for (url, is_html) in text.chain(html) {
                match fetch(&client, url).await {
                    Ok(body) => {
                        let found = if is_html {
                            parse_html_list(&body)
                        } else {
                            parse_text_list(&body)
                        };
                        info!(url = %url, hosts = found.len(), "Fetched denylist");
                        hosts.extend(found);
                    }
                    Err(e) => warn!(url = %url, error = %e, "Failed to fetch denylist"),
                }
            }
        }
    }

    let blacklist = Blacklist::new(hosts);
    metrics().blacklist_hosts.set(blacklist.len() as u64);
    info!(hosts = blacklist.len(), "Denylist ready");
    blacklist
}
