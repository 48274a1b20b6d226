//! Discovery from a previous run's log.
//!
//! Parses the XML log of an earlier run and re-emits the recorded hits whose
//! filenames match the current filters. Deterministic, no network.

use std::collections::BTreeSet;
use std::path::PathBuf;

use quick_xml::events::Event;
use quick_xml::Reader;
use tokio::sync::mpsc;
use tracing::debug;

use super::{emit_hit, CandidateHit, Discoverer, FilterSet};
use crate::report::LogSink;

pub struct LogReplayFinder {
    log_file: PathBuf,
    filters: FilterSet,
    hits: mpsc::Sender<CandidateHit>,
    log: LogSink,
}

impl LogReplayFinder {
    pub fn new(
        log_file: PathBuf,
        filters: FilterSet,
        hits: mpsc::Sender<CandidateHit>,
        log: LogSink,
    ) -> Self {
        Self {
            log_file,
            filters,
            hits,
            log,
        }
    }

    /// Collect `<filefinder event="hit" href="…"/>` entries matching the
    /// filter set.
    fn collect_hits(&self, text: &str) -> anyhow::Result<BTreeSet<String>> {
        let filename_regex = self.filters.replay_regex()?;
        let mut urls = BTreeSet::new();

        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);
        loop {
            match reader.read_event() {
                Ok(Event::Empty(ref tag)) | Ok(Event::Start(ref tag))
                    if tag.name().as_ref() == b"filefinder" =>
                {
                    let mut is_hit = false;
                    let mut href = None;
                    for attribute in tag.attributes().flatten() {
                        match attribute.key.as_ref() {
                            b"event" => is_hit = attribute.value.as_ref() == b"hit",
                            b"href" => {
                                href = attribute.unescape_value().ok().map(|v| v.into_owned())
                            }
                            _ => {}
                        }
                    }
                    if is_hit {
                        if let Some(href) = href {
                            if filename_regex.is_match(&href) {
                                debug!("replaying hit {}", href);
                                urls.insert(href);
                            }
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
        Ok(urls)
    }
}

#[async_trait::async_trait]
impl Discoverer for LogReplayFinder {
    async fn start_search(&mut self, quota: usize) {
        let urls = match tokio::fs::read_to_string(&self.log_file).await {
            Ok(text) => self.collect_hits(&text).unwrap_or_default(),
            Err(e) => {
                debug!("cannot read log {}: {}", self.log_file.display(), e);
                BTreeSet::new()
            }
        };

        self.log
            .report(format!(
                "<filefinder type=\"fromlogfilefilefinder\" count=\"{}\" />\n",
                urls.len()
            ))
            .await;

        for url in urls.into_iter().take(quota) {
            emit_hit(&self.hits, &self.log, &url).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::LogCollector;

    #[tokio::test]
    async fn test_replay_filters_and_limits() {
        let dir = tempfile::tempdir().unwrap();
        let old_log = dir.path().join("old.xml");
        std::fs::write(
            &old_log,
            concat!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n<log>\n",
                "<logitem source=\"webcrawler\" time=\"2024-01-01T00:00:00Z\">\n",
                "<filefinder event=\"hit\" href=\"http://h.test/a.pdf\" />\n",
                "<filefinder event=\"hit\" href=\"http://h.test/b.doc\" />\n",
                "<filefinder event=\"hit\" href=\"http://h.test/c.pdf\" />\n",
                "</logitem>\n</log>\n"
            ),
        )
        .unwrap();

        let (collector, sink) = LogCollector::new(dir.path().join("new.xml"), "logreplay");
        let (hit_tx, mut hit_rx) = mpsc::channel(16);
        let filters = FilterSet::new(&["*.pdf".to_string()]).unwrap();
        let mut finder = LogReplayFinder::new(old_log, filters, hit_tx, sink);
        let collector_handle = tokio::spawn(collector.run());
        finder.start_search(1).await;
        drop(finder);

        let mut urls = Vec::new();
        while let Some(hit) = hit_rx.recv().await {
            urls.push(hit.url);
        }
        collector_handle.await.unwrap().unwrap();

        assert_eq!(urls.len(), 1);
        assert!(urls[0].ends_with(".pdf"));
    }
}
