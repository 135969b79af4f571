//! Referrer and page URL normalization, plus the spam-referrer denylist.
//!
//! Query strings are reduced to a signature of their sorted parameter names,
//! so `/user?id=5&utm_source=ads` becomes `/user?{id,utm_source}`. Campaign
//! shapes stay visible while values such as click ids are never stored.

use std::collections::{BTreeSet, HashSet};

use url::Url;

/// Base used to resolve relative inputs such as `/path?q=1`.
const RELATIVE_BASE: &str = "http://relative.invalid/";

/// Normalizes a page or referrer URL.
///
/// Absolute URLs keep their origin, relative ones render as path and
/// signature only. Unparseable input passes through unchanged and an empty
/// referrer stays empty (direct traffic).
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    match Url::parse(trimmed) {
        Ok(url) => match url.host_str() {
            Some(host) => {
                let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
                format!("{}://{}{}{}", url.scheme(), host, port, page_identifier(&url))
            }
            None => trimmed.to_string(),
        },
        Err(url::ParseError::RelativeUrlWithoutBase) if trimmed.starts_with('/') => {
            match Url::parse(RELATIVE_BASE).and_then(|base| base.join(trimmed)) {
                Ok(url) => page_identifier(&url),
                Err(_) => trimmed.to_string(),
            }
        }
        Err(_) => trimmed.to_string(),
    }
}

/// Path plus query signature of a parsed URL, used as the page identifier.
pub fn page_identifier(url: &Url) -> String {
    let path = url.path().trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path };

    match query_signature(url) {
        Some(signature) => format!("{path}?{signature}"),
        None => path.to_string(),
    }
}

/// `{a,b}` from the distinct parameter names, or `None` without a query.
fn query_signature(url: &Url) -> Option<String> {
    let names: BTreeSet<String> = url
        .query_pairs()
        .map(|(name, _)| name.into_owned())
        .filter(|name| !name.is_empty())
        .collect();

    if names.is_empty() {
        return None;
    }

    Some(format!(
        "{{{}}}",
        names.into_iter().collect::<Vec<_>>().join(",")
    ))
}

/// Lowercase host of an absolute URL.
pub fn referrer_host(raw: &str) -> Option<String> {
    Url::parse(raw.trim())
        .ok()?
        .host_str()
        .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
}

/// Extracts a host from one denylist line.
///
/// Lines may be bare hosts or URLs; blank lines and `#` comments yield `None`.
pub fn host_from_list_line(line: &str) -> Option<String> {
    let line = line.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return None;
    }
    if line.contains("://") {
        return referrer_host(line);
    }

    let host = line
        .split(['/', ' ', '\t'])
        .next()
        .unwrap_or("")
        .trim_end_matches('.')
        .to_ascii_lowercase();

    if host.contains('.') {
        Some(host)
    } else {
        None
    }
}

/// Immutable set of spam-referrer hosts.
///
/// Built once at startup and shared behind an `Arc`; lookups never fail, an
/// unknown host is simply not blacklisted.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    hosts: HashSet<String>,
}

impl Blacklist {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().trim_end_matches('.').to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Exact, case-insensitive host lookup.
    pub fn is_blacklisted(&self, host: &str) -> bool {
        let host = host.trim().trim_end_matches('.');
        if host.bytes().any(|b| b.is_ascii_uppercase()) {
            self.hosts.contains(&host.to_ascii_lowercase())
        } else {
            self.hosts.contains(host)
        }
    }

    /// Looks up the host of a referrer URL. Direct traffic and URLs without a
    /// host are never blacklisted.
    pub fn is_referrer_blacklisted(&self, referrer: &str) -> bool {
        referrer_host(referrer)
            .map(|host| self.is_blacklisted(&host))
            .unwrap_or(false)
    }
}

impl FromIterator<String> for Blacklist {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self::new(iter)
    }
}
