//! Stage wiring: discovery → acquisition → analysis.
//!
//! Each stage runs as one task connected by bounded channels. The watchdog
//! waits for every stage to terminate, after which the closed log channel
//! lets the collector seal the report.

use std::path::Path;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;
use url::Url;

use crate::analysis::AnalyzerMux;
use crate::config::{DownloaderConfig, Settings, SourceConfig};
use crate::discovery::{
    CandidateHit, Discoverer, FileSystemScan, FilterSet, LogReplayFinder, SearchEngine,
    SearchProvider, WebCrawler,
};
use crate::download::{
    DownloadedFile, Downloader, FakeDownloader, LogReplayDownloader, UrlDownloader,
};
use crate::report::{LogCollector, LogSink, Watchdog};

/// Channel capacity between stages.
const CHANNEL_CAPACITY: usize = 256;

fn build_discoverer(
    settings: &Settings,
    hits: mpsc::Sender<CandidateHit>,
    sink: &LogSink,
) -> anyhow::Result<Box<dyn Discoverer>> {
    let filters = FilterSet::new(&settings.filters)?;
    match &settings.source {
        SourceConfig::Webcrawler {
            base_url,
            start_url,
            required_content,
        } => {
            let base = Url::parse(base_url).context("invalid base URL")?;
            let start = match start_url {
                Some(start) => Url::parse(start).context("invalid start URL")?,
                None => base.clone(),
            };
            Ok(Box::new(WebCrawler::new(
                filters,
                base,
                start,
                required_content.clone(),
                settings.max_visited_pages,
                hits,
                sink.with_source("webcrawler"),
            )?))
        }
        SourceConfig::Filesystem { directory } => Ok(Box::new(FileSystemScan::new(
            filters,
            directory.clone(),
            hits,
            sink.with_source("filesystemscan"),
        ))),
        SourceConfig::Search { engine, term } => {
            let provider = match engine.to_lowercase().as_str() {
                "bing" => SearchProvider::Bing,
                "google" => SearchProvider::Google,
                other => anyhow::bail!("unknown search engine: {}", other),
            };
            Ok(Box::new(SearchEngine::new(
                provider,
                term.clone(),
                filters,
                hits,
                sink.with_source("searchengine"),
            )?))
        }
        SourceConfig::Logreplay { log_file } => Ok(Box::new(LogReplayFinder::new(
            log_file.clone(),
            filters,
            hits,
            sink.with_source("logreplay"),
        ))),
    }
}

fn build_downloader(
    settings: &Settings,
    downloads: mpsc::Sender<DownloadedFile>,
    sink: &LogSink,
) -> anyhow::Result<Box<dyn Downloader>> {
    match &settings.downloader {
        DownloaderConfig::Url => Ok(Box::new(UrlDownloader::new(
            settings.file_pattern.clone(),
            settings.max_downloads.unwrap_or(usize::MAX),
            downloads,
            sink.with_source("urldownloader"),
        )?)),
        DownloaderConfig::Fake => Ok(Box::new(FakeDownloader::new(
            downloads,
            sink.with_source("fakedownloader"),
        ))),
        DownloaderConfig::Logreplay { log_file } => Ok(Box::new(LogReplayDownloader::new(
            log_file.clone(),
            FilterSet::new(&settings.filters)?,
            downloads,
            sink.with_source("logreplaydownloader"),
        ))),
    }
}

/// The output log must be writable before any stage starts.
fn ensure_log_writable(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create log directory {}", parent.display()))?;
        }
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("log path {} is not writable", path.display()))?;
    Ok(())
}

/// Run one complete harvesting pipeline to quiescence.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    ensure_log_writable(&settings.log_output)?;

    let (collector, sink) = LogCollector::new(settings.log_output.clone(), "docscan");
    let collector_handle = tokio::spawn(collector.run());

    let (hit_tx, hit_rx) = mpsc::channel::<CandidateHit>(CHANNEL_CAPACITY);
    let (download_tx, mut download_rx) = mpsc::channel::<DownloadedFile>(CHANNEL_CAPACITY);

    let mut discoverer = build_discoverer(&settings, hit_tx, &sink)?;
    let downloader = build_downloader(&settings, download_tx, &sink)?;
    let mux = AnalyzerMux::new(settings.tools.clone(), settings.text_extraction);

    let quota = settings.num_hits;
    let discovery_handle = tokio::spawn(async move {
        discoverer.start_search(quota).await;
    });

    let download_handle = tokio::spawn(downloader.run(hit_rx));

    let analysis_sink = sink.clone();
    let analysis_handle = tokio::spawn(async move {
        while let Some(file) = download_rx.recv().await {
            info!("analyzing {}", file.path.display());
            if let Some((source, record)) = mux.analyze_path(&file.path).await {
                analysis_sink.with_source(source).report(record).await;
            }
        }
    });

    drop(sink);

    let mut watchdog = Watchdog::new();
    watchdog.watch(discovery_handle);
    watchdog.watch(download_handle);
    watchdog.watch(analysis_handle);
    watchdog.quiesce().await;

    collector_handle
        .await
        .context("log collector task failed")?
        .context("writing the log failed")?;
    Ok(())
}
