//! Request classification.
//!
//! Turns raw header values into bounded, normalized dimension values. Every
//! value produced here is lowercase and restricted to a small character set
//! before it can become a hash field.

use regex::Regex;
use std::sync::LazyLock;
use woothee::parser::Parser;

use crate::limits::{
    MAX_ACCEPT_LANGUAGE_LEN, MAX_PATH_LEN, MAX_REFERRER_HOST_LEN, MAX_REFERRER_LEN,
    MAX_USER_AGENT_LEN, MAX_UTM_LEN,
};

/// Referrer value for requests without a usable Referer header.
pub const DIRECT_REFERRER: &str = "direct";

/// Referrer value for same-site navigation.
pub const INTERNAL_REFERRER: &str = "internal";

/// Placeholder for values that could not be classified.
pub const UNKNOWN: &str = "unknown";

/// Headers trusted to carry an ISO country code, in priority order.
pub const TRUSTED_COUNTRY_HEADERS: &[&str] = &[
    "cf-ipcountry",
    "x-vercel-ip-country",
    "cloudfront-viewer-country",
];

static BOT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)bot|crawl|spider|slurp|archiver|curl|wget|httpclient|python-requests|python-urllib|go-http-client|java/|okhttp|axios|node-fetch|libwww|scrapy|headless|phantomjs|selenium|puppeteer|playwright|lighthouse|pagespeed|pingdom|uptime|monitor|facebookexternalhit|embedly|preview|validator",
    )
    .unwrap_or_else(|e| panic!("bot pattern: {}", e))
});

static TABLET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ipad|tablet|kindle|silk/|playbook|nexus (7|9|10)|sm-t\d")
        .unwrap_or_else(|e| panic!("tablet pattern: {}", e))
});

static MOBILE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)mobi|iphone|ipod|android|blackberry|bb10|opera mini|iemobile|windows phone")
        .unwrap_or_else(|e| panic!("mobile pattern: {}", e))
});

/// Browser families, checked in order. Edge and Opera carry "Chrome/" and
/// Chrome carries "Safari/", so the order matters.
static BROWSER_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("edge", r"(?i)edg(e|a|ios)?/"),
        ("opera", r"(?i)opr/|opera"),
        ("samsung", r"(?i)samsungbrowser/"),
        ("chrome", r"(?i)chrome/|crios/|chromium/"),
        ("firefox", r"(?i)firefox/|fxios/"),
        ("safari", r"(?i)safari/|version/[\d.]+ mobile"),
    ]
    .into_iter()
    .map(|(family, pattern)| {
        let re = Regex::new(pattern).unwrap_or_else(|e| panic!("browser pattern: {}", e));
        (family, re)
    })
    .collect()
});

/// OS families, checked in order (Android before Linux, iOS before macOS).
static OS_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("windows", r"(?i)windows"),
        ("android", r"(?i)android"),
        ("ios", r"(?i)iphone|ipad|ipod|\bios\b"),
        ("macos", r"(?i)mac os x|macintosh"),
        ("chromeos", r"(?i)cros"),
        ("linux", r"(?i)linux|x11"),
    ]
    .into_iter()
    .map(|(family, pattern)| {
        let re = Regex::new(pattern).unwrap_or_else(|e| panic!("os pattern: {}", e));
        (family, re)
    })
    .collect()
});

static COUNTRY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}$").unwrap_or_else(|e| panic!("country pattern: {}", e)));

/// Device class derived from the user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
        }
    }
}

/// Result of classifying a user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentClass {
    pub is_bot: bool,
    pub device: DeviceClass,
    pub browser: &'static str,
    pub os: &'static str,
}

/// User-agent classifier.
///
/// Uses ordered patterns for browser/OS/device families, and the woothee
/// parser as a second opinion on crawlers.
pub struct Classifier {
    parser: Parser,
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    /// Classifies a raw User-Agent header value.
    pub fn user_agent(&self, raw: &str) -> UserAgentClass {
        let ua = truncate_chars(raw.trim(), MAX_USER_AGENT_LEN);

        UserAgentClass {
            is_bot: self.is_bot(ua),
            device: device_class(ua),
            browser: browser_family(ua),
            os: os_family(ua),
        }
    }

    /// Bot heuristic. Empty user agents come from tools, not browsers.
    pub fn is_bot(&self, ua: &str) -> bool {
        if ua.is_empty() || BOT_PATTERN.is_match(ua) {
            return true;
        }
        self.parser
            .parse(ua)
            .map(|result| result.category == "crawler")
            .unwrap_or(false)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Device class: tablet > mobile > desktop.
pub fn device_class(ua: &str) -> DeviceClass {
    let lower = ua.to_ascii_lowercase();
    // Android tablets omit "Mobile" from their user agent
    if TABLET_PATTERN.is_match(ua) || (lower.contains("android") && !lower.contains("mobile")) {
        DeviceClass::Tablet
    } else if MOBILE_PATTERN.is_match(ua) {
        DeviceClass::Mobile
    } else {
        DeviceClass::Desktop
    }
}

/// Browser family without version.
pub fn browser_family(ua: &str) -> &'static str {
    BROWSER_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(ua))
        .map(|(family, _)| *family)
        .unwrap_or("other")
}

/// Operating system family without version.
pub fn os_family(ua: &str) -> &'static str {
    OS_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(ua))
        .map(|(family, _)| *family)
        .unwrap_or("other")
}

/// Primary 2-letter subtag of the first Accept-Language entry.
pub fn primary_language(accept_language: &str) -> Option<String> {
    let header = truncate_chars(accept_language, MAX_ACCEPT_LANGUAGE_LEN);
    let first = header.split(',').next()?.split(';').next()?.trim();
    let primary = first.split(['-', '_']).next()?;

    if primary.len() == 2 && primary.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(primary.to_ascii_lowercase())
    } else {
        None
    }
}

/// Bare host of a Referer header; scheme, port, path and query are dropped.
///
/// Same-site referrers (matching `site_host`) become [`INTERNAL_REFERRER`],
/// missing or unparseable ones [`DIRECT_REFERRER`].
pub fn referrer_host(referer: Option<&str>, site_host: Option<&str>) -> String {
    let Some(raw) = referer.map(str::trim).filter(|r| !r.is_empty()) else {
        return DIRECT_REFERRER.to_string();
    };
    if raw.len() > MAX_REFERRER_LEN {
        return DIRECT_REFERRER.to_string();
    }

    let host = match url::Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
            parsed.host_str().map(|h| h.to_ascii_lowercase())
        }
        _ => None,
    };

    let Some(host) = host else {
        return DIRECT_REFERRER.to_string();
    };
    let host = sanitize(&host, MAX_REFERRER_HOST_LEN, |c| {
        c.is_ascii_alphanumeric() || c == '.' || c == '-'
    });
    if host.is_empty() {
        return DIRECT_REFERRER.to_string();
    }

    let is_internal = site_host
        .map(|site| strip_www(&host) == strip_www(&site.to_ascii_lowercase()))
        .unwrap_or(false);
    if is_internal {
        INTERNAL_REFERRER.to_string()
    } else {
        host
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Country code from a trusted edge header value; anything but `^[A-Z]{2}$`
/// is dropped. Returned lowercase for use as a dimension value.
pub fn country_code(header_value: Option<&str>) -> Option<String> {
    let value = header_value?.trim();
    if COUNTRY_PATTERN.is_match(value) {
        Some(value.to_ascii_lowercase())
    } else {
        None
    }
}

/// Outcome of path validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathCheck {
    Valid(String),
    /// Missing, relative, excluded or empty after sanitizing.
    Invalid(&'static str),
}

/// Validates and sanitizes a page path.
///
/// Query string and fragment are removed, the remainder is lowercased and
/// restricted to URL-safe characters, then truncated.
pub fn check_path(raw: Option<&str>, excluded_prefixes: &[String]) -> PathCheck {
    let Some(raw) = raw.map(str::trim).filter(|p| !p.is_empty()) else {
        return PathCheck::Invalid("missing path");
    };
    if !raw.starts_with('/') || raw.starts_with("//") {
        return PathCheck::Invalid("path must start with a single '/'");
    }

    let without_query = raw.split(['?', '#']).next().unwrap_or("/");
    let lower = without_query.to_ascii_lowercase();
    let sanitized = sanitize(&lower, MAX_PATH_LEN, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | '~' | '%')
    });
    if sanitized.is_empty() || !sanitized.starts_with('/') || sanitized.starts_with("//") {
        return PathCheck::Invalid("path empty after sanitizing");
    }

    // Exclusion applies to the value that would be recorded
    if excluded_prefixes
        .iter()
        .any(|prefix| has_path_prefix(&sanitized, &prefix.to_ascii_lowercase()))
    {
        return PathCheck::Invalid("excluded path prefix");
    }
    PathCheck::Valid(sanitized)
}

/// `/admin` excludes `/admin` and `/admin/...` but not `/administrator`.
fn has_path_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}

/// Sanitizes a UTM value; `None` when nothing usable remains.
pub fn utm_value(raw: Option<&str>) -> Option<String> {
    let lower = raw?.trim().to_ascii_lowercase();
    let value = sanitize(&lower, MAX_UTM_LEN, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
    });
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Keeps characters accepted by `allowed`, then truncates to `max_len`.
fn sanitize(value: &str, max_len: usize, allowed: impl Fn(char) -> bool) -> String {
    value.chars().filter(|&c| allowed(c)).take(max_len).collect()
}

fn truncate_chars(value: &str, max_len: usize) -> &str {
    match value.char_indices().nth(max_len) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}
