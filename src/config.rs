//! Client configuration

/// Calendars a new timestamp is submitted to
const DEFAULT_CALENDARS: &[&str] = &[
    "https://alice.btc.calendar.opentimestamps.org",
    "https://bob.btc.calendar.opentimestamps.org",
    "https://finney.calendar.eternitywall.com",
    "https://ots.btc.catallaxy.com",
];

/// Calendars upgrade may contact; `*.` matches any subdomain
const DEFAULT_WHITELIST: &[&str] = &[
    "https://*.calendar.opentimestamps.org",
    "https://*.calendar.eternitywall.com",
    "https://*.calendar.catallaxy.com",
    "https://ots.btc.catallaxy.com",
];

const DEFAULT_EXPLORER_URL: &str = "https://blockstream.info/api";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MIN_CALENDAR_RESPONSES: usize = 1;

fn owned(urls: &[&str]) -> Vec<String> {
    urls.iter().map(|s| (*s).to_string()).collect()
}

/// OpenTimestamps client configuration
#[derive(Debug, Clone)]
pub struct OtsConfig {
    /// Calendar server URLs (submitted to in order)
    pub calendar_urls: Vec<String>,

    /// Esplora API base URL used for verification
    pub explorer_url: String,

    /// Calendars trusted for upgrade, besides `calendar_urls`
    pub whitelist: Vec<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Calendars that must accept a digest for stamping to succeed
    pub min_calendar_responses: usize,
}

impl Default for OtsConfig {
    fn default() -> Self {
        Self {
            calendar_urls: owned(DEFAULT_CALENDARS),
            explorer_url: DEFAULT_EXPLORER_URL.to_string(),
            whitelist: owned(DEFAULT_WHITELIST),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            min_calendar_responses: DEFAULT_MIN_CALENDAR_RESPONSES,
        }
    }
}

impl OtsConfig {
    /// Create with custom calendar URLs
    #[must_use]
    pub fn with_calendars(urls: Vec<String>) -> Self {
        Self {
            calendar_urls: urls,
            ..Self::default()
        }
    }

    /// Create config from environment variables
    ///
    /// Environment variables:
    /// - `OTS_CALENDAR_URLS`: Comma-separated list of calendar URLs
    /// - `OTS_EXPLORER_URL`: Esplora API base URL
    /// - `OTS_WHITELIST`: Comma-separated upgrade whitelist
    /// - `OTS_TIMEOUT_SECS`: HTTP timeout in seconds (default: 30)
    /// - `OTS_MIN_CALENDAR_RESPONSES`: Calendars required to stamp (default: 1)
    #[must_use]
    pub fn from_env() -> Self {
        let calendar_urls = list_var("OTS_CALENDAR_URLS").unwrap_or_else(|| owned(DEFAULT_CALENDARS));
        let whitelist = list_var("OTS_WHITELIST").unwrap_or_else(|| owned(DEFAULT_WHITELIST));

        let explorer_url = std::env::var("OTS_EXPLORER_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_EXPLORER_URL.to_string());

        let timeout_secs = std::env::var("OTS_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let min_calendar_responses = std::env::var("OTS_MIN_CALENDAR_RESPONSES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MIN_CALENDAR_RESPONSES);

        Self {
            calendar_urls,
            explorer_url,
            whitelist,
            timeout_secs,
            min_calendar_responses,
        }
    }

    /// Whether upgrade may contact `url`
    ///
    /// Configured calendars are always trusted. Whitelist entries match
    /// exactly, or as `scheme://*.domain` for any subdomain of `domain`.
    #[must_use]
    pub fn is_whitelisted(&self, url: &str) -> bool {
        let url = url.trim_end_matches('/');

        self.calendar_urls
            .iter()
            .any(|c| c.trim_end_matches('/') == url)
            || self.whitelist.iter().any(|pattern| url_matches(pattern, url))
    }
}

fn list_var(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|s| {
        s.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

fn url_matches(pattern: &str, url: &str) -> bool {
    let pattern = pattern.trim_end_matches('/');

    let Some((scheme, host_pattern)) = pattern.split_once("://") else {
        return pattern == url;
    };
    let Some(host) = url.strip_prefix(scheme).and_then(|rest| rest.strip_prefix("://")) else {
        return false;
    };

    match host_pattern.strip_prefix("*.") {
        Some(domain) => host
            .strip_suffix(domain)
            .and_then(|sub| sub.strip_suffix('.'))
            .is_some_and(|sub| !sub.is_empty() && !sub.contains('/')),
        None => host == host_pattern,
    }
}
