//! Filename pattern expansion for downloaded files.
//!
//! Supported directives: `%{h}` for the full MD5 hex of the body, `%{h:N}`
//! for its first N hex digits, and `%{s}` for a slug rendering of the source
//! URL. Everything else passes through literally.

use std::sync::LazyLock;

use md5::{Digest, Md5};
use regex::{Captures, Regex};

use crate::utils::url::slugify;

static HASH_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%\{h(?::(\d+))?\}").unwrap());

/// MD5 hex digest of a payload.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Expand a filename pattern for a downloaded payload.
///
/// A `%{h:N}` directive with N outside 1..=32 is left unexpanded.
pub fn derive_filename(pattern: &str, data: &[u8], url: &str) -> String {
    let digest = md5_hex(data);

    let with_hash = HASH_DIRECTIVE.replace_all(pattern, |caps: &Captures| {
        match caps.get(1) {
            None => digest.clone(),
            Some(n) => match n.as_str().parse::<usize>() {
                Ok(n) if n >= 1 && n <= digest.len() => digest[..n].to_string(),
                _ => caps[0].to_string(),
            },
        }
    });

    with_hash.replace("%{s}", &slugify(url))
}
