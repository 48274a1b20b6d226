//! Breadth-first web crawler discovery.
//!
//! Maintains a FIFO frontier and a known-URL set keyed by the normalized
//! URL form. Pages are fetched with bounded parallelism; anchors of HTML
//! responses are tested against the filename filters, follow-up links are
//! enqueued when they stay under the configured base URL. A visited-page
//! cap guarantees termination.

use std::collections::{HashSet, VecDeque};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::redirect::Policy;
use scraper::{Html, Selector};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use url::Url;

use super::{emit_hit, CandidateHit, Discoverer, FilterSet, HitOutcome};
use crate::report::LogSink;
use crate::utils::url::normalize;
use crate::utils::xml::xmlify;

/// Global cap on concurrently fetched pages.
const MAX_PARALLEL_FETCHES: usize = 16;
/// Hard upper bound on visited pages, regardless of configuration.
const MAX_VISITED_PAGES: usize = 32768;

/// Extensions the crawler never follows: images and multimedia, matched on
/// the last four characters of the URL.
const IMAGE_EXTENSIONS: [&str; 6] = [".jpg", "jpeg", ".png", ".gif", ".eps", ".bmp"];
const MULTIMEDIA_EXTENSIONS: [&str; 7] = [".avi", "mpeg", ".mpg", ".mp4", ".mp3", ".wmv", ".wma"];

/// A follow-up link is worth crawling when it looks like a page: a known
/// dynamic/markup extension or a final segment without a short extension.
static PAGE_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)([.]([sp]?htm[l]?|jsp|asp[x]?|php)|[^.]{5,})([?].+)?$"#).unwrap()
});

/// Outcome of one page fetch, processed on the crawler task.
enum FetchOutcome {
    Response {
        url: Url,
        status: u16,
        location: Option<String>,
        body: Vec<u8>,
    },
    Timeout {
        url: Url,
    },
    HostNotFound {
        url: Url,
    },
    Failed {
        url: Url,
        tls: bool,
        message: String,
    },
}

pub struct WebCrawler {
    client: reqwest::Client,
    filters: FilterSet,
    base_url: Url,
    base_host: String,
    start_url: Url,
    required_content: Option<String>,
    max_visited_pages: usize,
    hits: mpsc::Sender<CandidateHit>,
    log: LogSink,
    known_urls: HashSet<String>,
    queued_urls: VecDeque<String>,
    visited_pages: usize,
}

impl WebCrawler {
    pub fn new(
        filters: FilterSet,
        base_url: Url,
        start_url: Url,
        required_content: Option<String>,
        max_visited_pages: usize,
        hits: mpsc::Sender<CandidateHit>,
        log: LogSink,
    ) -> anyhow::Result<Self> {
        // Redirects are followed by enqueueing the target; certificate
        // problems are logged and ignored, this is a scanner not a trust
        // boundary.
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .danger_accept_invalid_certs(true)
            .gzip(true)
            .brotli(true)
            .build()?;

        let base_host = base_url.host_str().unwrap_or_default().to_string();
        Ok(Self {
            client,
            filters,
            base_url,
            base_host,
            start_url,
            required_content,
            max_visited_pages: max_visited_pages.min(MAX_VISITED_PAGES),
            hits,
            log,
            known_urls: HashSet::new(),
            queued_urls: VecDeque::new(),
            visited_pages: 0,
        })
    }

    fn can_start_more(&self, quota: usize) -> bool {
        !self.queued_urls.is_empty()
            && !self.filters.quota_met(quota)
            && self.visited_pages < self.max_visited_pages
    }

    /// Launch queued fetches up to the parallelism cap. Each fetch carries a
    /// deadline that grows with the current load.
    fn launch_fetches(&mut self, jobs: &mut JoinSet<FetchOutcome>, quota: usize) {
        while jobs.len() < MAX_PARALLEL_FETCHES && self.can_start_more(quota) {
            let Some(url_str) = self.queued_urls.pop_front() else {
                break;
            };
            self.visited_pages += 1;
            debug!(
                "crawling page {} ({} visited)",
                url_str, self.visited_pages
            );

            let Ok(url) = Url::parse(&url_str) else {
                continue;
            };
            let timeout = Duration::from_secs(10 + jobs.len() as u64);
            let client = self.client.clone();
            jobs.spawn(fetch_page(client, url, timeout));
        }
    }

    async fn process(&mut self, outcome: FetchOutcome, quota: usize) {
        match outcome {
            FetchOutcome::Response {
                url,
                status,
                location,
                body,
            } => {
                // Redirect targets are new frontier entries.
                if (300..400).contains(&status) {
                    let Some(location) = location else {
                        return;
                    };
                    if let Some(redirect) = normalize(&location, Some(&url)) {
                        let target = redirect.to_string();
                        if self.known_urls.insert(target.clone()) {
                            self.queued_urls.push_back(target);
                        }
                    }
                    return;
                }

                if status >= 400 {
                    self.log
                        .report(format!(
                            "<webcrawler detailed=\"HTTP error\" status=\"error\" code=\"{}\" url=\"{}\" />\n",
                            status,
                            xmlify(url.as_str())
                        ))
                        .await;
                    return;
                }

                self.process_body(&url, &body, quota).await;
            }
            FetchOutcome::Timeout { url } => {
                self.log
                    .report(format!(
                        "<download message=\"timeout\" status=\"error\" url=\"{}\" />\n",
                        xmlify(url.as_str())
                    ))
                    .await;
            }
            FetchOutcome::HostNotFound { url } => {
                // Retry once with the leading "www." toggled; if the toggled
                // form is already known, this was the retry.
                if let Some(retry) = toggle_www(&url) {
                    let target = retry.to_string();
                    if self.known_urls.insert(target.clone()) {
                        self.queued_urls.push_back(target);
                        return;
                    }
                }
                self.log
                    .report(format!(
                        "<webcrawler detailed=\"Host not found\" status=\"error\" code=\"3\" url=\"{}\" />\n",
                        xmlify(url.as_str())
                    ))
                    .await;
            }
            FetchOutcome::Failed { url, tls, message } => {
                if tls {
                    warn!("ignoring TLS error for {}: {}", url, message);
                    self.log
                        .report(format!(
                            "<webcrawler detailed=\"SSL/TLS: {}\" status=\"warning\" />\n",
                            xmlify(&message)
                        ))
                        .await;
                }
                self.log
                    .report(format!(
                        "<webcrawler detailed=\"{}\" status=\"error\" code=\"99\" url=\"{}\" />\n",
                        xmlify(&message),
                        xmlify(url.as_str())
                    ))
                    .await;
            }
        }
    }

    async fn process_body(&mut self, url: &Url, body: &[u8], quota: usize) {
        let text = String::from_utf8_lossy(body);
        let head = text.chars().take(256).collect::<String>().to_lowercase();

        let required_ok = self
            .required_content
            .as_ref()
            .map(|needle| text.contains(needle.as_str()))
            .unwrap_or(true);

        if head.contains("<html") && required_ok {
            self.log
                .report(format!(
                    "<webcrawler status=\"success\" url=\"{}\" />\n",
                    xmlify(url.as_str())
                ))
                .await;
            self.scan_anchors(url, &text, quota).await;
        } else if text.starts_with("%PDF-1.") {
            // The URL itself points at a PDF; keep it when a filter is
            // looking for PDFs even though the URL string did not match.
            let url_str = url.to_string();
            if self.filters.any_label_contains(".pdf")
                && self.filters.try_hit(&url_str, quota) != HitOutcome::QuotaFull
            {
                self.log
                    .report(format!(
                        "<webcrawler detailed=\"Found URL pointing to PDF\" status=\"success\" url=\"{}\" />\n",
                        xmlify(&url_str)
                    ))
                    .await;
                emit_hit(&self.hits, &self.log, &url_str).await;
            } else {
                self.log
                    .report(format!(
                        "<webcrawler detailed=\"Not an HTML page, but PDF instead\" status=\"error\" url=\"{}\" />\n",
                        xmlify(&url_str)
                    ))
                    .await;
            }
        } else {
            self.log
                .report(format!(
                    "<webcrawler detailed=\"Not an HTML page\" status=\"error\" url=\"{}\" />\n",
                    xmlify(url.as_str())
                ))
                .await;
        }
    }

    /// Scan every anchor of an HTML page: hits are collected first and
    /// emitted after the scan so frontier growth keeps BFS order.
    async fn scan_anchors(&mut self, page_url: &Url, text: &str, quota: usize) {
        let hrefs: Vec<String> = {
            let document = Html::parse_document(text);
            let selector = Selector::parse("a[href]").expect("static selector");
            document
                .select(&selector)
                .filter_map(|e| e.value().attr("href"))
                .map(str::to_string)
                .collect()
        };

        let mut page_hits: Vec<String> = Vec::new();

        for href in hrefs {
            let Some(link) = normalize(&href, Some(page_url)) else {
                continue;
            };
            let link_str = link.to_string();

            if self.known_urls.contains(&link_str) {
                continue;
            }
            // Extension checks work on the last four characters.
            let mut tail: Vec<char> = link_str.chars().rev().take(4).collect();
            tail.reverse();
            let tail = tail.into_iter().collect::<String>().to_lowercase();
            if IMAGE_EXTENSIONS.contains(&tail.as_str())
                || MULTIMEDIA_EXTENSIONS.contains(&tail.as_str())
            {
                continue;
            }
            // Stay on the configured host (and its subdomains).
            if !link
                .host_str()
                .map(|h| h.ends_with(&self.base_host))
                .unwrap_or(false)
            {
                continue;
            }

            self.known_urls.insert(link_str.clone());

            match self.filters.try_hit(&link_str, quota) {
                HitOutcome::Counted => {
                    self.log
                        .report(format!(
                            "<webcrawler detailed=\"Found regexp match\" status=\"success\" url=\"{}\" href=\"{}\" />\n",
                            xmlify(page_url.as_str()),
                            xmlify(&link_str)
                        ))
                        .await;
                    page_hits.push(link_str);
                }
                HitOutcome::QuotaFull => {}
                HitOutcome::NoMatch => {
                    if is_sub_address(&link, &self.base_url) && PAGE_LIKE.is_match(&link_str) {
                        self.queued_urls.push_back(link_str);
                    }
                }
            }
        }

        for hit in page_hits {
            emit_hit(&self.hits, &self.log, &hit).await;
        }
    }

    async fn report_summary(&self, quota: usize) {
        let mut summary = format!(
            "<webcrawler maxvisitedpages=\"{}\" numexpectedhits=\"{}\" numknownurls=\"{}\" numvisitedpages=\"{}\">\n",
            self.max_visited_pages,
            quota,
            self.known_urls.len(),
            self.visited_pages
        );
        for filter in self.filters.iter() {
            summary.push_str(&format!(
                "<filter numfoundhits=\"{}\" pattern=\"{}\" />\n",
                filter.found_hits,
                xmlify(&filter.label)
            ));
        }
        summary.push_str("</webcrawler>\n");
        self.log.report(summary).await;
    }
}

#[async_trait::async_trait]
impl Discoverer for WebCrawler {
    async fn start_search(&mut self, quota: usize) {
        self.visited_pages = 0;
        self.filters.reset_counters();
        self.known_urls.clear();
        self.queued_urls.clear();
        let start = self.start_url.to_string();
        self.known_urls.insert(start.clone());
        self.queued_urls.push_back(start);

        self.log
            .report(format!(
                "<webcrawler numexpectedhits=\"{}\"><filepattern>{}</filepattern></webcrawler>\n",
                quota,
                xmlify(&self.filters.joined_patterns())
            ))
            .await;

        let mut jobs: JoinSet<FetchOutcome> = JoinSet::new();
        loop {
            self.launch_fetches(&mut jobs, quota);
            let Some(result) = jobs.join_next().await else {
                break;
            };
            match result {
                Ok(outcome) => self.process(outcome, quota).await,
                Err(e) => warn!("fetch task failed: {}", e),
            }
        }

        self.report_summary(quota).await;
    }
}

async fn fetch_page(client: reqwest::Client, url: Url, deadline: Duration) -> FetchOutcome {
    let request = client.get(url.clone()).timeout(deadline).send();
    match request.await {
        Ok(response) => {
            let status = response.status().as_u16();
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            match response.bytes().await {
                Ok(body) => FetchOutcome::Response {
                    url,
                    status,
                    location,
                    body: body.to_vec(),
                },
                Err(e) if e.is_timeout() => FetchOutcome::Timeout { url },
                Err(e) => FetchOutcome::Failed {
                    url,
                    tls: is_tls_error(&e),
                    message: e.to_string(),
                },
            }
        }
        Err(e) if e.is_timeout() => FetchOutcome::Timeout { url },
        Err(e) if is_dns_failure(&e) => FetchOutcome::HostNotFound { url },
        Err(e) => FetchOutcome::Failed {
            url,
            tls: is_tls_error(&e),
            message: e.to_string(),
        },
    }
}

fn is_dns_failure(error: &reqwest::Error) -> bool {
    if !error.is_connect() {
        return false;
    }
    let detail = format!("{:?}", error).to_lowercase();
    detail.contains("dns") || detail.contains("lookup")
}

fn is_tls_error(error: &reqwest::Error) -> bool {
    let detail = format!("{:?}", error).to_lowercase();
    detail.contains("certificate") || detail.contains("tls") || detail.contains("ssl")
}

/// Toggle the leading `www.` of a URL's host.
fn toggle_www(url: &Url) -> Option<Url> {
    let host = url.host_str()?;
    let toggled = match host.strip_prefix("www.") {
        Some(stripped) => stripped.to_string(),
        None => format!("www.{}", host),
    };
    let mut retry = url.clone();
    retry.set_host(Some(&toggled)).ok()?;
    Some(retry)
}

/// Whether `query` lives under `base`.
///
/// Same host and path prefix; additionally, when the base path is at most
/// one character, a query host merely carrying `.basehost` as a substring is
/// accepted. That admits odd hosts such as `evil.base.test` for base
/// `base.test/` and is kept for log compatibility.
fn is_sub_address(query: &Url, base: &Url) -> bool {
    let (Some(query_host), Some(base_host)) = (query.host_str(), base.host_str()) else {
        return false;
    };
    let host_ok = query_host == base_host
        || (base.path().len() <= 1 && query_host.contains(&format!(".{}", base_host)));
    host_ok && query.path().starts_with(base.path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_www() {
        let url = Url::parse("http://example.test/a").unwrap();
        assert_eq!(
            toggle_www(&url).unwrap().to_string(),
            "http://www.example.test/a"
        );
        let url = Url::parse("http://www.example.test/a").unwrap();
        assert_eq!(
            toggle_www(&url).unwrap().to_string(),
            "http://example.test/a"
        );
    }

    #[test]
    fn test_is_sub_address() {
        let base = Url::parse("http://base.test/").unwrap();
        assert!(is_sub_address(
            &Url::parse("http://base.test/sub/page.html").unwrap(),
            &base
        ));
        assert!(is_sub_address(
            &Url::parse("http://www.base.test/x").unwrap(),
            &base
        ));
        // Suffix-containment quirk, preserved deliberately.
        assert!(is_sub_address(
            &Url::parse("http://evil.base.test/x").unwrap(),
            &base
        ));

        let deep = Url::parse("http://base.test/docs/").unwrap();
        assert!(!is_sub_address(
            &Url::parse("http://other.base.test/docs/x").unwrap(),
            &deep
        ));
        assert!(!is_sub_address(
            &Url::parse("http://base.test/other/").unwrap(),
            &deep
        ));
    }

    #[test]
    fn test_page_like() {
        assert!(PAGE_LIKE.is_match("http://h.test/page.html"));
        assert!(PAGE_LIKE.is_match("http://h.test/page.jsp?x=1"));
        assert!(PAGE_LIKE.is_match("http://h.test/directory"));
        assert!(!PAGE_LIKE.is_match("http://h.test/a.doc"));
        assert!(!PAGE_LIKE.is_match("http://h.test/a.xls"));
    }
}
