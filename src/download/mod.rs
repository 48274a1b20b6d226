//! Acquisition: components that turn candidate URLs into local files.

mod fake;
mod filename;
mod log_replay;
mod url_downloader;

pub use fake::FakeDownloader;
pub use filename::{derive_filename, md5_hex};
pub use log_replay::LogReplayDownloader;
pub use url_downloader::UrlDownloader;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::discovery::CandidateHit;

/// A successfully acquired file, handed to the analysis stage.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub url: String,
    pub path: std::path::PathBuf,
}

/// A component that acquires candidate URLs.
///
/// `download` accepts one URL (idempotent per normalized URL); `drain` waits
/// for in-flight work; `final_report` emits the closing summary fragment.
/// The provided `run` loop connects a discoverer's hit channel to these
/// operations.
#[async_trait]
pub trait Downloader: Send {
    async fn download(&mut self, url: &str);

    async fn drain(&mut self) {}

    async fn final_report(&mut self);

    async fn run(mut self: Box<Self>, mut hits: mpsc::Receiver<CandidateHit>) {
        while let Some(hit) = hits.recv().await {
            self.download(&hit.url).await;
        }
        self.drain().await;
        self.final_report().await;
    }
}
