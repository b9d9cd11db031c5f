//! Locator normalization and extraction.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Short-link patterns whose query string only carries tracking data.
static SHORT_LINK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"^https?://vm\.tiktok\.com/\w+/").ok(),
        Regex::new(r"^https?://vt\.tiktok\.com/\w+/").ok(),
        Regex::new(r"^https?://www\.tiktok\.com/@[\w.]+/(photo|video)/\d+").ok(),
        Regex::new(r"^https?://www\.tiktok\.com/t/\w+/").ok(),
        Regex::new(r"^https?://youtu\.be/[\w-]+").ok(),
        Regex::new(r"^https?://(www\.)?instagram\.com/(p|reel|reels)/[\w-]+").ok(),
    ]
    .into_iter()
    .flatten()
    .collect()
});

/// Redirect wrappers: host and the query parameter holding the target.
const REDIRECT_WRAPPERS: &[(&str, &str)] = &[
    ("l.facebook.com", "u"),
    ("lm.facebook.com", "u"),
    ("www.google.com", "q"),
    ("href.li", ""),
    ("l.instagram.com", "u"),
    ("t.umblr.com", "z"),
];

/// Locators found in free text.
static URL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"]+|www\.[^\s<>"]+"#).ok());

/// Normalizes a locator before resolution.
///
/// Adds a scheme to bare `www.` links, unwraps known redirect wrappers and
/// strips the query string from known short-link patterns.
#[must_use]
pub fn normalize_locator(locator: &str) -> String {
    let trimmed = locator.trim();
    let with_scheme = if trimmed.starts_with("www.") {
        format!("https://{trimmed}")
    } else {
        trimmed.to_string()
    };

    let unwrapped = unwrap_redirect(&with_scheme).unwrap_or(with_scheme);

    if SHORT_LINK_PATTERNS.iter().any(|p| p.is_match(&unwrapped)) {
        return unwrapped
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string();
    }
    unwrapped
}

/// Extracts every locator from free text, normalized, in order of appearance.
#[must_use]
pub fn extract_locators(text: &str) -> Vec<String> {
    URL_PATTERN.as_ref().map_or_else(Vec::new, |pattern| {
        pattern
            .find_iter(text)
            .map(|m| normalize_locator(m.as_str().trim_end_matches(['.', ',', ')', ']'])))
            .collect()
    })
}

fn unwrap_redirect(locator: &str) -> Option<String> {
    let url = Url::parse(locator).ok()?;
    let host = url.host_str()?;
    let (_, param) = REDIRECT_WRAPPERS.iter().find(|(h, _)| *h == host)?;

    let target = if param.is_empty() {
        url.query().map(str::to_string)
    } else {
        url.query_pairs()
            .find(|(key, _)| key == param)
            .map(|(_, value)| value.into_owned())
    }?;

    // Only unwrap to another absolute http(s) URL.
    let parsed = Url::parse(&target).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
}
