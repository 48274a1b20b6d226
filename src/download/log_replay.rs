//! Replays successful downloads out of a previous run's log.
//!
//! Scans the prior XML log for `<download url=… filename=… status="success">`
//! entries and re-emits the pairs whose filenames match the current filters,
//! without any network traffic. Incoming download requests are ignored.

use std::path::PathBuf;

use quick_xml::events::Event;
use quick_xml::Reader;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{DownloadedFile, Downloader};
use crate::discovery::FilterSet;
use crate::report::LogSink;

pub struct LogReplayDownloader {
    log_file: PathBuf,
    filters: FilterSet,
    downloads: mpsc::Sender<DownloadedFile>,
    log: LogSink,
    count: usize,
}

impl LogReplayDownloader {
    pub fn new(
        log_file: PathBuf,
        filters: FilterSet,
        downloads: mpsc::Sender<DownloadedFile>,
        log: LogSink,
    ) -> Self {
        Self {
            log_file,
            filters,
            downloads,
            log,
            count: 0,
        }
    }

    /// Successful `(url, filename)` pairs recorded in the log.
    fn collect_downloads(text: &str) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);
        loop {
            match reader.read_event() {
                Ok(Event::Empty(ref tag)) | Ok(Event::Start(ref tag))
                    if tag.name().as_ref() == b"download" =>
                {
                    let mut url = None;
                    let mut filename = None;
                    let mut success = false;
                    for attribute in tag.attributes().flatten() {
                        let value = attribute.unescape_value().ok().map(|v| v.into_owned());
                        match attribute.key.as_ref() {
                            b"url" => url = value,
                            b"filename" => filename = value,
                            b"status" => success = value.as_deref() == Some("success"),
                            _ => {}
                        }
                    }
                    if success {
                        if let (Some(url), Some(filename)) = (url, filename) {
                            pairs.push((url, filename));
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    debug!("log parse stopped: {}", e);
                    break;
                }
                _ => {}
            }
        }
        pairs
    }

    /// Parse the prior log and re-emit matching downloads.
    pub async fn replay(&mut self) {
        let text = match tokio::fs::read_to_string(&self.log_file).await {
            Ok(text) => text,
            Err(e) => {
                warn!("cannot read log {}: {}", self.log_file.display(), e);
                return;
            }
        };

        let filename_regex = match self.filters.replay_regex() {
            Ok(regex) => regex,
            Err(e) => {
                warn!("bad replay filter: {}", e);
                return;
            }
        };

        for (url, filename) in Self::collect_downloads(&text) {
            if filename_regex.is_match(&filename) {
                self.count += 1;
                let _ = self
                    .downloads
                    .send(DownloadedFile {
                        url,
                        path: PathBuf::from(filename),
                    })
                    .await;
            }
        }
    }
}

#[async_trait::async_trait]
impl Downloader for LogReplayDownloader {
    async fn download(&mut self, url: &str) {
        warn!("log replay ignores download request for {}", url);
    }

    async fn drain(&mut self) {
        self.replay().await;
    }

    async fn final_report(&mut self) {
        self.log
            .report(format!(
                "<downloader type=\"fromlogfiledownloader\" count=\"{}\" />\n",
                self.count
            ))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::LogCollector;

    #[tokio::test]
    async fn test_replay_successful_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let old_log = dir.path().join("old.xml");
        std::fs::write(
            &old_log,
            concat!(
                "<log>\n",
                "<download url=\"http://h.test/a.pdf\" filename=\"out/a.pdf\" status=\"success\" />\n",
                "<download url=\"http://h.test/b.pdf\" filename=\"out/b.pdf\" status=\"error\" />\n",
                "<download url=\"http://h.test/c.txt\" filename=\"out/c.txt\" status=\"success\" />\n",
                "</log>\n"
            ),
        )
        .unwrap();

        let (collector, sink) = LogCollector::new(dir.path().join("new.xml"), "replaydownloader");
        let (dl_tx, mut dl_rx) = mpsc::channel(8);
        let filters = FilterSet::new(&["*.pdf".to_string()]).unwrap();
        let mut downloader = LogReplayDownloader::new(old_log, filters, dl_tx, sink);
        let collector_handle = tokio::spawn(collector.run());

        downloader.replay().await;
        downloader.final_report().await;
        drop(downloader);

        let event = dl_rx.recv().await.unwrap();
        assert_eq!(event.url, "http://h.test/a.pdf");
        assert!(dl_rx.recv().await.is_none());
        collector_handle.await.unwrap().unwrap();
    }
}
