//! Language guessing through an external spell checker.
//!
//! Runs `aspell` once per candidate dictionary over a text sample and picks
//! the dictionary producing the smallest positive number of unknown words.
//! A zero count signals a failed run, not a perfect match. The dictionary
//! list is fetched once per process and cached.

use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::debug;

const ASPELL_BINARY: &str = "/usr/bin/aspell";
const ASPELL_TIMEOUT: Duration = Duration::from_secs(30);

/// Dictionary codes look like `en` or `sv_SE`.
static DICTIONARY_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(_[A-Z]{2})?$").unwrap());

static ASPELL_LANGUAGES: OnceCell<Vec<String>> = OnceCell::const_new();

/// The installed aspell dictionaries, fetched once per process.
pub async fn aspell_languages() -> &'static [String] {
    ASPELL_LANGUAGES
        .get_or_init(|| async {
            let output = Command::new(ASPELL_BINARY)
                .arg("dicts")
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .output();
            match tokio::time::timeout(ASPELL_TIMEOUT, output).await {
                Ok(Ok(output)) => String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .map(str::trim)
                    .filter(|line| DICTIONARY_CODE.is_match(line))
                    .map(str::to_string)
                    .collect(),
                _ => {
                    debug!("aspell dictionary listing failed");
                    Vec::new()
                }
            }
        })
        .await
}

/// Number of words of `text` unknown to one dictionary, or `None` when the
/// run failed.
async fn run_aspell(text: &str, dictionary: &str) -> Option<usize> {
    let mut child = Command::new(ASPELL_BINARY)
        .args(["-d", dictionary, "list"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    let mut stdin = child.stdin.take()?;
    let sample = text.as_bytes().to_vec();
    tokio::spawn(async move {
        let _ = stdin.write_all(&sample).await;
        // Dropping stdin closes the write channel.
    });

    let output = tokio::time::timeout(ASPELL_TIMEOUT, child.wait_with_output())
        .await
        .ok()?
        .ok()?;
    Some(
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.is_empty())
            .count(),
    )
}

/// Guess the language of a text sample.
///
/// Returns the dictionary code with the fewest unknown words, or `None` when
/// every run failed.
pub async fn guess_language(text: &str) -> Option<String> {
    let mut best: Option<(usize, String)> = None;
    for dictionary in aspell_languages().await {
        let Some(count) = run_aspell(text, dictionary).await else {
            continue;
        };
        // Zero unknown words is an error indicator, not a perfect score.
        if count == 0 {
            continue;
        }
        if best.as_ref().map(|(c, _)| count < *c).unwrap_or(true) {
            best = Some((count, dictionary.clone()));
        }
    }
    best.map(|(_, dictionary)| dictionary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictionary_code_filter() {
        assert!(DICTIONARY_CODE.is_match("en"));
        assert!(DICTIONARY_CODE.is_match("sv_SE"));
        assert!(!DICTIONARY_CODE.is_match("en-variant_0"));
        assert!(!DICTIONARY_CODE.is_match("english"));
        assert!(!DICTIONARY_CODE.is_match("EN"));
    }
}
