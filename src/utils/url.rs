//! URL normalization, slug rendering, and effective-domain extraction.
//!
//! The normalized string form is the deduplication key across the whole
//! pipeline: lowercased scheme and host, no fragment, canonical
//! percent-encoding, and an explicit `/` for an empty path.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]").unwrap());
static TRAILING_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_([A-Za-z0-9]{1,4})$").unwrap());

/// Normalize a possibly-relative URL against a base.
///
/// Returns `None` for mailto links and for anything that does not resolve to
/// an http(s) URL. The fragment is stripped and an empty path becomes `/`.
pub fn normalize(raw: &str, base: Option<&Url>) -> Option<Url> {
    if raw.starts_with("mailto:") {
        return None;
    }

    // Undo the HTML encoding anchors commonly carry.
    let text = raw.replace("&amp;", "&");

    let mut url = match base {
        Some(base) => base.join(&text).ok()?,
        None => Url::parse(&text).ok()?,
    };

    if !url.scheme().starts_with("http") {
        return None;
    }

    url.set_fragment(None);
    if url.path().is_empty() {
        url.set_path("/");
    }

    Some(url)
}

/// Normalized string form of an absolute URL, the deduplication key.
pub fn normalize_str(raw: &str) -> Option<String> {
    normalize(raw, None).map(|u| u.to_string())
}

/// Render a URL as a filename slug.
///
/// Every non-alphanumeric character becomes `_`; a final short run is
/// rewritten to `.ext` to re-synthesize the extension.
pub fn slugify(url: &str) -> String {
    let slug = NON_ALNUM.replace_all(url, "_").into_owned();
    TRAILING_EXT.replace(&slug, ".$1").into_owned()
}

/// Effective domain of a hostname, used as the per-host politeness key.
///
/// Last two labels, extended to three for two-label country registrations
/// such as `co.uk`.
pub fn domain_from_hostname(hostname: &str) -> String {
    const SECOND_LEVEL: [&str; 6] = ["ac", "co", "com", "gov", "net", "org"];

    let labels: Vec<&str> = hostname.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }

    let tld = labels[labels.len() - 1];
    let second = labels[labels.len() - 2];
    let take = if tld.len() == 2 && SECOND_LEVEL.contains(&second) {
        3
    } else {
        2
    };
    labels[labels.len() - take..].join(".")
}
