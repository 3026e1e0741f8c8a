//! Monitored-site matching.
//!
//! A pattern is either a host fragment (`tiktok.com`, also accepted as a
//! fragment of the full URL) or a wildcard of the form `*.domain`, which
//! matches `domain` itself and any of its subdomains.

use serde::{Deserialize, Serialize};
use url::Url;

/// Sites monitored when configuration provides none.
pub const DEFAULT_MONITORED_SITES: [&str; 3] = ["tiktok.com", "snapchat.com", "roblox.com"];

const WILDCARD_PREFIX: &str = "*.";

/// Ordered list of monitored-site patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitoredSiteSet(Vec<String>);

impl MonitoredSiteSet {
    /// Build from configured patterns, dropping blank entries.
    /// Falls back to [`DEFAULT_MONITORED_SITES`] when nothing usable remains.
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        if patterns.is_empty() {
            Self::default()
        } else {
            Self(patterns)
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.0
    }

    pub fn matches(&self, url: &str) -> bool {
        matches(url, &self.0)
    }
}

impl Default for MonitoredSiteSet {
    fn default() -> Self {
        Self(DEFAULT_MONITORED_SITES.iter().map(|s| s.to_string()).collect())
    }
}

/// Decide whether `url` belongs to one of the monitored `patterns`.
///
/// An empty pattern list never matches. When `url` cannot be parsed the
/// check degrades to a plain substring test against the raw string.
pub fn matches<S: AsRef<str>>(url: &str, patterns: &[S]) -> bool {
    if patterns.is_empty() {
        return false;
    }

    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return patterns.iter().any(|p| url.contains(p.as_ref())),
    };
    let host = parsed.host_str().unwrap_or("");

    patterns.iter().any(|pattern| {
        let pattern = pattern.as_ref();
        match pattern.strip_prefix(WILDCARD_PREFIX) {
            Some(suffix) => host_in_domain(host, suffix),
            None => host.contains(pattern) || url.contains(pattern),
        }
    })
}

fn host_in_domain(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
