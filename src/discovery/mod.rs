//! Candidate discovery: components that find URLs worth downloading.
//!
//! A discoverer emits [`CandidateHit`] events for URLs matching the
//! configured filename filters, up to a requested hit count, and writes
//! progress fragments to the report log.

mod filesystem;
mod log_replay;
mod search;
mod webcrawler;

pub use filesystem::FileSystemScan;
pub use log_replay::LogReplayFinder;
pub use search::{SearchEngine, SearchProvider};
pub use webcrawler::WebCrawler;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::mpsc;

/// A URL matching at least one filter, handed to the download stage.
#[derive(Debug, Clone)]
pub struct CandidateHit {
    pub url: String,
}

/// A filename filter: a glob label compiled to an anchored regex, plus the
/// number of hits it has produced so far.
#[derive(Debug)]
pub struct Filter {
    pub label: String,
    pub regex: Regex,
    pub found_hits: usize,
}

impl Filter {
    /// Compile a glob label such as `*.pdf`.
    ///
    /// `.` is escaped, `?` matches a single character, and `*` matches any
    /// run not crossing a path separator, quote, or space. The result is
    /// anchored to the final path segment with an optional query tail.
    pub fn new(label: &str) -> anyhow::Result<Self> {
        let translated = label
            .replace('.', "\\.")
            .replace('?', ".")
            .replace('*', "[^/ \"']*");
        let regex = Regex::new(&format!("(^|/)({})([?].+)?$", translated))?;
        Ok(Self {
            label: label.to_string(),
            regex,
            found_hits: 0,
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }
}

/// Result of testing a URL against the filter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    /// No filter matched.
    NoMatch,
    /// A filter matched and its counter was incremented.
    Counted,
    /// A filter matched but had already reached its quota.
    QuotaFull,
}

/// The filter list shared by a discoverer, with quota bookkeeping.
#[derive(Debug, Default)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new(labels: &[String]) -> anyhow::Result<Self> {
        let filters = labels
            .iter()
            .map(|l| Filter::new(l))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { filters })
    }

    /// Try to record a hit against the first matching filter.
    ///
    /// Counters are monotone and never exceed the quota: once a filter is
    /// full, further matches are reported as [`HitOutcome::QuotaFull`] and
    /// not counted.
    pub fn try_hit(&mut self, url: &str, quota: usize) -> HitOutcome {
        for filter in &mut self.filters {
            if filter.matches(url) {
                if filter.found_hits >= quota {
                    return HitOutcome::QuotaFull;
                }
                filter.found_hits += 1;
                return HitOutcome::Counted;
            }
        }
        HitOutcome::NoMatch
    }

    /// True once every filter has reached the requested quota.
    pub fn quota_met(&self, quota: usize) -> bool {
        self.filters.iter().all(|f| f.found_hits >= quota)
    }

    /// True if any filter label mentions the given extension text.
    pub fn any_label_contains(&self, needle: &str) -> bool {
        self.filters.iter().any(|f| f.label.contains(needle))
    }

    pub fn reset_counters(&mut self) {
        for filter in &mut self.filters {
            filter.found_hits = 0;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    /// The regex patterns, joined for the opening report fragment.
    pub fn joined_patterns(&self) -> String {
        self.filters
            .iter()
            .map(|f| f.regex.as_str())
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Filename regex used when replaying prior-run logs: the glob labels
    /// joined into one alternation with `*` widened to `.*`.
    pub fn replay_regex(&self) -> anyhow::Result<Regex> {
        let joined = self
            .filters
            .iter()
            .map(|f| f.label.replace('.', "[.]").replace('*', ".*"))
            .collect::<Vec<_>>()
            .join("|");
        Ok(Regex::new(&format!("(^|/)({})$", joined))?)
    }
}

/// A source of candidate URLs.
#[async_trait]
pub trait Discoverer: Send {
    /// Run the search until the quota is met or the source is exhausted.
    async fn start_search(&mut self, quota: usize);
}

/// Emit one hit: report fragment plus the downstream event.
pub(crate) async fn emit_hit(
    hits: &mpsc::Sender<CandidateHit>,
    log: &crate::report::LogSink,
    url: &str,
) {
    log.report(format!(
        "<filefinder event=\"hit\" href=\"{}\" />\n",
        crate::utils::xml::xmlify(url)
    ))
    .await;
    let _ = hits
        .send(CandidateHit {
            url: url.to_string(),
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_translation() {
        let filter = Filter::new("*.pdf").unwrap();
        assert!(filter.matches("http://example.com/a/report.pdf"));
        assert!(filter.matches("http://example.com/report.pdf?version=2"));
        assert!(filter.matches("report.pdf"));
        assert!(!filter.matches("http://example.com/report.pdfx"));
        assert!(!filter.matches("http://example.com/report.doc"));
        // `*` must not cross a path separator.
        assert!(!filter.matches("http://example.com/dir.pdf/page.html"));
    }

    #[test]
    fn test_filter_question_mark() {
        let filter = Filter::new("file?.doc").unwrap();
        assert!(filter.matches("http://h/file1.doc"));
        assert!(!filter.matches("http://h/file12.doc"));
    }

    #[test]
    fn test_quota_accounting() {
        let mut set = FilterSet::new(&["*.pdf".to_string(), "*.doc".to_string()]).unwrap();
        assert_eq!(set.try_hit("http://h/a.pdf", 1), HitOutcome::Counted);
        assert_eq!(set.try_hit("http://h/a.txt", 1), HitOutcome::NoMatch);
        assert!(!set.quota_met(1));
        assert_eq!(set.try_hit("http://h/b.doc", 1), HitOutcome::Counted);
        assert!(set.quota_met(1));
        assert!(!set.quota_met(2));
        // Counters stop at the quota.
        assert_eq!(set.try_hit("http://h/c.pdf", 1), HitOutcome::QuotaFull);
        assert_eq!(set.iter().next().unwrap().found_hits, 1);
    }

    #[test]
    fn test_replay_regex() {
        let set = FilterSet::new(&["*.pdf".to_string()]).unwrap();
        let re = set.replay_regex().unwrap();
        assert!(re.is_match("http://h/dir/file.pdf"));
        assert!(!re.is_match("http://h/file.pdf?query"));
    }
}
