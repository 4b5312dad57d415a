//! Identity keys and normalization for scraped listings.
//!
//! Key tiers, most to least reliable: a product code parsed out of the
//! canonical link (`pid:`), the canonical link itself (`url:`), and finally
//! normalized name + color text (`text:`).

use regex::Regex;
use std::fmt;
use std::sync::{Arc, LazyLock};
use unicode_normalization::UnicodeNormalization;
use url::Url;

use crate::config::IdentityConfig;
use crate::models::{IdentityKey, ListingRecord, NormalizedPrice};
use crate::utils::error::{AppError, Result};

/// Matches a trailing `-p-<code>` or `/p-<code>` path segment.
pub const DEFAULT_PRODUCT_ID_PATTERN: &str = r"(?:^|[/-])p-([A-Za-z0-9]+)$";

/// Leading labels dropped from text fields, in normalized form.
const BOILERPLATE_LABELS: &[&str] = &["顏色:", "颜色:", "color:", "colour:"];

const TEXT_KEY_SEPARATOR: char = '|';

static DEFAULT_STRATEGY: LazyLock<RegexProductId> = LazyLock::new(RegexProductId::default);

/// NFKC, lowercase, whitespace collapsed, boilerplate labels removed.
///
/// Idempotent: feeding the output back in returns it unchanged.
pub fn normalize_text(s: &str) -> String {
    let folded = fold(s);
    let mut out = folded.split_whitespace().collect::<Vec<_>>().join(" ");

    while let Some(rest) = BOILERPLATE_LABELS.iter().find_map(|label| out.strip_prefix(label)) {
        out = rest.trim_start().to_string();
    }

    out
}

fn fold(s: &str) -> String {
    let mut folded = s.nfkc().collect::<String>().to_lowercase();
    // lowercasing may surface new compatibility forms; settle both steps
    loop {
        let next = folded.nfkc().collect::<String>().to_lowercase();
        if next == folded {
            return folded;
        }
        folded = next;
    }
}

/// Keeps ASCII digits in order and drops everything else.
///
/// `normalize_price("NT$ 12,300")` is `12300`; `None` gives an empty price.
pub fn normalize_price<'a>(raw: impl Into<Option<&'a str>>) -> NormalizedPrice {
    let digits: String = raw
        .into()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    NormalizedPrice::new(digits)
}

/// Absolute, lowercase-host, query-free, fragment-free, no trailing slash.
///
/// `//host/..` and `/path` forms become `https://` URLs (the latter against
/// `base`). Anything that cannot be read as an http(s) URL comes back as given.
pub fn canonicalize_link(raw: &str, base: &Url) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let parsed = if let Some(rest) = trimmed.strip_prefix("//") {
        Url::parse(&format!("https://{}", rest))
    } else if trimmed.starts_with('/') {
        base.join(trimmed).map(|mut url| {
            let _ = url.set_scheme("https");
            url
        })
    } else {
        Url::parse(trimmed)
    };

    let url = match parsed {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        _ => return raw.to_string(),
    };

    let Some(host) = url.host_str() else {
        return raw.to_string();
    };

    let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
    let path = url.path().trim_end_matches('/');

    format!("{}://{}{}{}", url.scheme(), host.to_lowercase(), port, path)
}

/// Product code from `link` using the default `-p-<code>` rule.
pub fn extract_product_id(link: &str) -> String {
    DEFAULT_STRATEGY.extract(link).unwrap_or_default()
}

/// Site-specific rule for pulling a product code out of a canonical link.
pub trait ProductIdStrategy: Send + Sync + fmt::Debug {
    fn extract(&self, canonical_link: &str) -> Option<String>;
}

/// Applies a regex to the link path; the first capture group is the code.
#[derive(Debug, Clone)]
pub struct RegexProductId {
    pattern: Regex,
}

impl RegexProductId {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| AppError::Parse {
            message: format!("invalid product id pattern: {}", e),
        })?;

        if pattern.captures_len() < 2 {
            return Err(AppError::Parse {
                message: "product id pattern needs a capture group".to_string(),
            });
        }

        Ok(Self { pattern })
    }
}

impl Default for RegexProductId {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_PRODUCT_ID_PATTERN).unwrap(),
        }
    }
}

impl ProductIdStrategy for RegexProductId {
    fn extract(&self, canonical_link: &str) -> Option<String> {
        let path = link_path(canonical_link);
        let path = path.trim_end_matches('/');

        self.pattern
            .captures(path)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|code| !code.is_empty())
    }
}

/// Never yields a code, so keys start at the `url:` tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProductId;

impl ProductIdStrategy for NoProductId {
    fn extract(&self, _canonical_link: &str) -> Option<String> {
        None
    }
}

fn link_path(link: &str) -> String {
    match Url::parse(link) {
        Ok(url) => url.path().to_string(),
        Err(_) => link
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

/// Base origin plus product-id rule; builds identity keys for one site.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    base: Url,
    strategy: Arc<dyn ProductIdStrategy>,
}

impl IdentityResolver {
    pub fn new(base: Url, strategy: impl ProductIdStrategy + 'static) -> Self {
        Self {
            base,
            strategy: Arc::new(strategy),
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Result<Self> {
        let base = Url::parse(&config.base_origin)
            .map_err(|e| AppError::config(format!("invalid base origin '{}': {}", config.base_origin, e)))?;

        if config.product_id_pattern.is_empty() {
            Ok(Self::new(base, NoProductId))
        } else {
            Ok(Self::new(base, RegexProductId::new(&config.product_id_pattern)?))
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn canonicalize_link(&self, link: &str) -> String {
        canonicalize_link(link, &self.base)
    }

    pub fn extract_product_id(&self, link: &str) -> String {
        let canonical = self.canonicalize_link(link);
        self.strategy.extract(&canonical).unwrap_or_default()
    }

    pub fn make_identity_key(&self, link: &str, name: &str, color: &str) -> IdentityKey {
        let canonical = self.canonicalize_link(link);

        if let Some(pid) = self.strategy.extract(&canonical) {
            return IdentityKey::new(format!("pid:{}", pid));
        }

        if !canonical.is_empty() {
            return IdentityKey::new(format!("url:{}", canonical));
        }

        IdentityKey::new(format!(
            "text:{}{}{}",
            normalize_text(name),
            TEXT_KEY_SEPARATOR,
            normalize_text(color)
        ))
    }

    pub fn key_for(&self, record: &ListingRecord) -> IdentityKey {
        self.make_identity_key(record.link(), record.name(), record.color())
    }
}
