//! Pass-through downloader for local files.
//!
//! Accepts `file://` URLs or plain paths, verifies the file is readable,
//! and emits the `downloaded` event without touching, copying, or moving
//! anything.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::debug;

use super::{DownloadedFile, Downloader};
use crate::report::LogSink;
use crate::utils::xml::xmlify;

pub struct FakeDownloader {
    downloads: mpsc::Sender<DownloadedFile>,
    log: LogSink,
    local_files: usize,
    errors: usize,
}

impl FakeDownloader {
    pub fn new(downloads: mpsc::Sender<DownloadedFile>, log: LogSink) -> Self {
        Self {
            downloads,
            log,
            local_files: 0,
            errors: 0,
        }
    }

    fn local_path(url: &str) -> PathBuf {
        match url.strip_prefix("file://") {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(url),
        }
    }
}

#[async_trait::async_trait]
impl Downloader for FakeDownloader {
    async fn download(&mut self, url: &str) {
        let path = Self::local_path(url);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                self.local_files += 1;
                self.log
                    .report(format!(
                        "<download url=\"{}\" filename=\"{}\" status=\"success\" size=\"{}\" />\n",
                        xmlify(url),
                        xmlify(&path.display().to_string()),
                        meta.len()
                    ))
                    .await;
                let _ = self
                    .downloads
                    .send(DownloadedFile {
                        url: url.to_string(),
                        path,
                    })
                    .await;
            }
            _ => {
                debug!("local file not readable: {}", url);
                self.errors += 1;
                self.log
                    .report(format!(
                        "<download detailed=\"not a readable local file\" status=\"error\" url=\"{}\" />\n",
                        xmlify(url)
                    ))
                    .await;
            }
        }
    }

    async fn final_report(&mut self) {
        self.log
            .report(format!(
                "<fakedownloader numlocalfiles=\"{}\" numerrors=\"{}\" />\n",
                self.local_files, self.errors
            ))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::LogCollector;

    #[tokio::test]
    async fn test_pass_through_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.pdf");
        std::fs::write(&file, b"%PDF-1.4").unwrap();

        let (collector, sink) = LogCollector::new(dir.path().join("log.xml"), "fakedownloader");
        let (dl_tx, mut dl_rx) = mpsc::channel(8);
        let mut downloader = FakeDownloader::new(dl_tx, sink);
        let collector_handle = tokio::spawn(collector.run());

        downloader.download(&file.display().to_string()).await;
        downloader
            .download(&dir.path().join("missing.pdf").display().to_string())
            .await;
        downloader.final_report().await;
        drop(downloader);

        let event = dl_rx.recv().await.unwrap();
        assert_eq!(event.path, file);
        assert!(dl_rx.recv().await.is_none());
        collector_handle.await.unwrap().unwrap();
    }
}
