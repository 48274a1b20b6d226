//! HTTP downloader with global and per-host parallelism caps.
//!
//! Pending URLs wait in a FIFO queue; a job starts whenever global capacity
//! and the per-host cap for its effective domain permit. Filenames are
//! derived from the configured pattern, so a payload's name is a pure
//! function of its bytes and source URL.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use url::Url;

use super::{derive_filename, DownloadedFile, Downloader};
use crate::report::LogSink;
use crate::utils::url::{domain_from_hostname, normalize};
use crate::utils::xml::xmlify;

/// Global cap on in-flight downloads.
const MAX_PARALLEL_DOWNLOADS: usize = 16;
/// Cap on in-flight downloads per effective domain.
const MAX_PARALLEL_PER_HOST: usize = 4;

struct JobResult {
    url: String,
    domain: String,
    filename: Option<String>,
    bytes: usize,
    error: Option<JobError>,
}

#[derive(Debug, thiserror::Error)]
enum JobError {
    #[error("timeout")]
    Timeout,
    #[error("{0}")]
    Network(String),
    #[error("write failed: {0}")]
    Write(String),
}

pub struct UrlDownloader {
    client: reqwest::Client,
    file_pattern: String,
    max_downloads: usize,
    downloads: mpsc::Sender<DownloadedFile>,
    log: LogSink,
    queue: VecDeque<String>,
    known_urls: HashSet<String>,
    jobs: JoinSet<JobResult>,
    running_per_domain: HashMap<String, usize>,
    domain_count: BTreeMap<String, usize>,
    successful: usize,
    failed: usize,
}

impl UrlDownloader {
    pub fn new(
        file_pattern: String,
        max_downloads: usize,
        downloads: mpsc::Sender<DownloadedFile>,
        log: LogSink,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self {
            client,
            file_pattern,
            max_downloads,
            downloads,
            log,
            queue: VecDeque::new(),
            known_urls: HashSet::new(),
            jobs: JoinSet::new(),
            running_per_domain: HashMap::new(),
            domain_count: BTreeMap::new(),
            successful: 0,
            failed: 0,
        })
    }

    fn effective_domain(url: &str) -> String {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(domain_from_hostname))
            .unwrap_or_default()
    }

    /// Start queued jobs while both capacity limits permit.
    fn pump(&mut self) {
        let mut deferred: VecDeque<String> = VecDeque::new();

        while self.jobs.len() < MAX_PARALLEL_DOWNLOADS
            && self.successful + self.jobs.len() < self.max_downloads
        {
            let Some(url) = self.queue.pop_front() else {
                break;
            };
            let domain = Self::effective_domain(&url);
            let running = self.running_per_domain.get(&domain).copied().unwrap_or(0);
            if running >= MAX_PARALLEL_PER_HOST {
                // Host is saturated; keep the URL for a later round.
                deferred.push_back(url);
                continue;
            }

            *self.running_per_domain.entry(domain.clone()).or_insert(0) += 1;
            let timeout = Duration::from_secs(10 + self.jobs.len() as u64);
            let client = self.client.clone();
            let pattern = self.file_pattern.clone();
            self.jobs
                .spawn(run_job(client, url, domain, pattern, timeout));
        }

        // Deferred URLs go back to the front, preserving arrival order.
        for url in deferred.into_iter().rev() {
            self.queue.push_front(url);
        }
    }

    async fn process(&mut self, result: JobResult) {
        if let Some(count) = self.running_per_domain.get_mut(&result.domain) {
            *count = count.saturating_sub(1);
        }

        match result.error {
            None => {
                let filename = result.filename.expect("success carries a filename");
                self.successful += 1;
                *self.domain_count.entry(result.domain).or_insert(0) += 1;
                self.log
                    .report(format!(
                        "<download url=\"{}\" filename=\"{}\" status=\"success\" size=\"{}\" />\n",
                        xmlify(&result.url),
                        xmlify(&filename),
                        result.bytes
                    ))
                    .await;
                let _ = self
                    .downloads
                    .send(DownloadedFile {
                        url: result.url,
                        path: PathBuf::from(filename),
                    })
                    .await;
            }
            Some(JobError::Timeout) => {
                self.failed += 1;
                self.log
                    .report(format!(
                        "<download message=\"timeout\" status=\"error\" url=\"{}\" />\n",
                        xmlify(&result.url)
                    ))
                    .await;
            }
            Some(error) => {
                self.failed += 1;
                self.log
                    .report(format!(
                        "<download detailed=\"{}\" status=\"error\" url=\"{}\" />\n",
                        xmlify(&error.to_string()),
                        xmlify(&result.url)
                    ))
                    .await;
            }
        }
    }

    /// Opportunistically fold in finished jobs without blocking.
    async fn reap_finished(&mut self) {
        while let Some(result) = self.jobs.try_join_next() {
            match result {
                Ok(result) => self.process(result).await,
                Err(e) => warn!("download task failed: {}", e),
            }
        }
    }
}

#[async_trait::async_trait]
impl Downloader for UrlDownloader {
    async fn download(&mut self, url: &str) {
        let Some(normalized) = normalize(url, None).map(|u| u.to_string()) else {
            debug!("dropping unparsable URL {}", url);
            return;
        };

        if !self.known_urls.insert(normalized.clone()) {
            self.log
                .report(format!(
                    "<download detailed=\"duplicate\" status=\"error\" url=\"{}\" />\n",
                    xmlify(&normalized)
                ))
                .await;
            return;
        }

        self.queue.push_back(normalized);
        self.reap_finished().await;
        self.pump();
    }

    async fn drain(&mut self) {
        loop {
            self.pump();
            if self.jobs.is_empty() {
                break;
            }
            match self.jobs.join_next().await {
                Some(Ok(result)) => self.process(result).await,
                Some(Err(e)) => warn!("download task failed: {}", e),
                None => break,
            }
        }

        // The download cap may cut the rest of the queue; no URL vanishes
        // silently.
        while let Some(url) = self.queue.pop_front() {
            self.failed += 1;
            self.log
                .report(format!(
                    "<download detailed=\"download limit reached\" status=\"error\" url=\"{}\" />\n",
                    xmlify(&url)
                ))
                .await;
        }
    }

    async fn final_report(&mut self) {
        let mut summary = format!(
            "<downloader numsuccess=\"{}\" numfailed=\"{}\">\n",
            self.successful, self.failed
        );
        for (domain, count) in &self.domain_count {
            summary.push_str(&format!(
                "<domaincount domain=\"{}\" count=\"{}\" />\n",
                xmlify(domain),
                count
            ));
        }
        summary.push_str("</downloader>\n");
        self.log.report(summary).await;
    }
}

async fn run_job(
    client: reqwest::Client,
    url: String,
    domain: String,
    pattern: String,
    deadline: Duration,
) -> JobResult {
    let mut result = JobResult {
        url: url.clone(),
        domain,
        filename: None,
        bytes: 0,
        error: None,
    };

    let response = match client.get(&url).timeout(deadline).send().await {
        Ok(response) => response,
        Err(e) => {
            result.error = Some(if e.is_timeout() {
                JobError::Timeout
            } else {
                JobError::Network(e.to_string())
            });
            return result;
        }
    };

    if !response.status().is_success() {
        result.error = Some(JobError::Network(format!("HTTP {}", response.status())));
        return result;
    }

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            result.error = Some(if e.is_timeout() {
                JobError::Timeout
            } else {
                JobError::Network(e.to_string())
            });
            return result;
        }
    };

    let filename = derive_filename(&pattern, &body, &url);
    if let Some(parent) = Path::new(&filename).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                result.error = Some(JobError::Write(e.to_string()));
                return result;
            }
        }
    }
    if let Err(e) = tokio::fs::write(&filename, &body).await {
        result.error = Some(JobError::Write(e.to_string()));
        return result;
    }

    result.bytes = body.len();
    result.filename = Some(filename);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::LogCollector;

    #[tokio::test]
    async fn test_duplicate_urls_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("log.xml");
        let (collector, sink) = LogCollector::new(log_path.clone(), "urldownloader");
        let (download_tx, mut download_rx) = mpsc::channel(8);
        let mut downloader = UrlDownloader::new(
            dir.path().join("out/%{h}").display().to_string(),
            usize::MAX,
            download_tx,
            sink,
        )
        .unwrap();
        let collector_handle = tokio::spawn(collector.run());

        downloader.download("http://example.invalid/a.pdf").await;
        // Same URL in a different spelling normalizes to the same key.
        downloader.download("HTTP://EXAMPLE.invalid/a.pdf").await;
        downloader.drain().await;
        downloader.final_report().await;
        drop(downloader);

        assert!(download_rx.recv().await.is_none());
        collector_handle.await.unwrap().unwrap();

        let log = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(log.matches("detailed=\"duplicate\"").count(), 1);
        // The one real attempt failed on the unresolvable host.
        assert!(log.contains("numsuccess=\"0\""));
        assert!(log.contains("numfailed=\"1\""));
    }

    #[test]
    fn test_effective_domain() {
        assert_eq!(
            UrlDownloader::effective_domain("http://cdn.files.example.com/a.pdf"),
            "example.com"
        );
        assert_eq!(
            UrlDownloader::effective_domain("http://www.example.co.uk/a.pdf"),
            "example.co.uk"
        );
    }
}
