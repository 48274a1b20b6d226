//! Search-engine discovery.
//!
//! Issues paged queries against a web search engine and emits result URLs
//! matching the filters until the quota is reached or a page comes back
//! without new results.

use std::collections::HashSet;
use std::time::Duration;

use scraper::{Html, Selector};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{emit_hit, CandidateHit, Discoverer, FilterSet, HitOutcome};
use crate::report::LogSink;
use crate::utils::url::normalize;
use crate::utils::xml::xmlify;

const PAGE_SIZE: usize = 10;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Supported search backends. Each one is a query-URL builder over the same
/// paged fetch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchProvider {
    Bing,
    Google,
}

impl SearchProvider {
    fn tag(&self) -> &'static str {
        match self {
            SearchProvider::Bing => "bing",
            SearchProvider::Google => "google",
        }
    }

    /// Query URL for a zero-based result page.
    fn page_url(&self, term: &str, page: usize) -> String {
        let query = urlencoding::encode(term);
        match self {
            SearchProvider::Bing => format!(
                "https://www.bing.com/search?q={}&first={}",
                query,
                page * PAGE_SIZE + 1
            ),
            SearchProvider::Google => format!(
                "https://www.google.com/search?q={}&start={}",
                query,
                page * PAGE_SIZE
            ),
        }
    }
}

pub struct SearchEngine {
    client: reqwest::Client,
    provider: SearchProvider,
    search_term: String,
    filters: FilterSet,
    hits: mpsc::Sender<CandidateHit>,
    log: LogSink,
}

impl SearchEngine {
    pub fn new(
        provider: SearchProvider,
        search_term: String,
        filters: FilterSet,
        hits: mpsc::Sender<CandidateHit>,
        log: LogSink,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self {
            client,
            provider,
            search_term,
            filters,
            hits,
            log,
        })
    }

    /// Result links of one search page, in document order.
    fn extract_results(html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let selector = Selector::parse("a[href]").expect("static selector");
        document
            .select(&selector)
            .filter_map(|e| e.value().attr("href"))
            .filter(|href| href.starts_with("http"))
            .map(str::to_string)
            .collect()
    }
}

#[async_trait::async_trait]
impl Discoverer for SearchEngine {
    async fn start_search(&mut self, quota: usize) {
        let mut known: HashSet<String> = HashSet::new();
        let mut found = 0usize;
        let mut page = 0usize;

        while found < quota {
            let page_url = self.provider.page_url(&self.search_term, page);
            debug!("search page {}: {}", page, page_url);

            let html = match self.client.get(&page_url).send().await {
                Ok(response) => match response.text().await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("search result read failed: {}", e);
                        break;
                    }
                },
                Err(e) => {
                    self.log
                        .report(format!(
                            "<searchengine engine=\"{}\" detailed=\"{}\" status=\"error\" />\n",
                            self.provider.tag(),
                            xmlify(&e.to_string())
                        ))
                        .await;
                    break;
                }
            };

            let mut new_this_page = 0usize;
            for link in Self::extract_results(&html) {
                let Some(url) = normalize(&link, None) else {
                    continue;
                };
                let url_str = url.to_string();
                if !known.insert(url_str.clone()) {
                    continue;
                }
                new_this_page += 1;
                if self.filters.try_hit(&url_str, quota) == HitOutcome::Counted {
                    emit_hit(&self.hits, &self.log, &url_str).await;
                    found += 1;
                    if found >= quota {
                        break;
                    }
                }
            }

            // A page without new results means the engine ran dry.
            if new_this_page == 0 {
                break;
            }
            page += 1;
        }

        self.log
            .report(format!(
                "<searchengine engine=\"{}\" numresults=\"{}\" />\n",
                self.provider.tag(),
                found
            ))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_urls() {
        assert_eq!(
            SearchProvider::Bing.page_url("filetype:pdf site:example.com", 0),
            "https://www.bing.com/search?q=filetype%3Apdf%20site%3Aexample.com&first=1"
        );
        assert_eq!(
            SearchProvider::Google.page_url("x y", 2),
            "https://www.google.com/search?q=x%20y&start=20"
        );
    }

    #[test]
    fn test_extract_results() {
        let html = r#"<html><body>
            <a href="https://example.com/doc.pdf">one</a>
            <a href="/relative">skip</a>
            <a href="https://example.com/page">two</a>
        </body></html>"#;
        let links = SearchEngine::extract_results(html);
        assert_eq!(
            links,
            vec![
                "https://example.com/doc.pdf".to_string(),
                "https://example.com/page".to_string()
            ]
        );
    }
}
