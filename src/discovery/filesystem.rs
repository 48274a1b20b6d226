//! Breadth-first filesystem discovery.
//!
//! Walks a directory tree level by level, emitting files that match the
//! configured filters until the requested hit count is reached. Files of a
//! directory are reported in name order before its subdirectories are
//! visited.

use std::collections::VecDeque;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::debug;

use super::{emit_hit, CandidateHit, Discoverer, FilterSet, HitOutcome};
use crate::report::LogSink;
use crate::utils::xml::xmlify;

pub struct FileSystemScan {
    filters: FilterSet,
    base_dir: PathBuf,
    hits: mpsc::Sender<CandidateHit>,
    log: LogSink,
}

impl FileSystemScan {
    pub fn new(
        filters: FilterSet,
        base_dir: PathBuf,
        hits: mpsc::Sender<CandidateHit>,
        log: LogSink,
    ) -> Self {
        Self {
            filters,
            base_dir,
            hits,
            log,
        }
    }
}

#[async_trait::async_trait]
impl Discoverer for FileSystemScan {
    async fn start_search(&mut self, quota: usize) {
        let mut queue: VecDeque<PathBuf> = VecDeque::new();
        queue.push_back(self.base_dir.clone());
        let mut hits = 0usize;

        while hits < quota {
            let Some(dir) = queue.pop_front() else {
                break;
            };
            self.log
                .report(format!(
                    "<filesystemscan directory=\"{}\" />\n",
                    xmlify(&dir.display().to_string())
                ))
                .await;

            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("cannot read directory {}: {}", dir.display(), e);
                    continue;
                }
            };

            let mut files: Vec<PathBuf> = Vec::new();
            let mut subdirs: Vec<PathBuf> = Vec::new();
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                match entry.file_type().await {
                    Ok(t) if t.is_dir() => subdirs.push(path),
                    Ok(t) if t.is_file() => files.push(path),
                    _ => {}
                }
            }
            files.sort();
            subdirs.sort();

            for file in files {
                let name = file.display().to_string();
                if self.filters.try_hit(&name, quota) == HitOutcome::Counted {
                    emit_hit(&self.hits, &self.log, &name).await;
                    hits += 1;
                    if hits >= quota {
                        break;
                    }
                }
            }

            queue.extend(subdirs);
        }

        self.log
            .report(format!("<filesystemscan numresults=\"{}\" />\n", hits))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::LogCollector;

    async fn run_scan(dir: PathBuf, quota: usize) -> (Vec<String>, String) {
        let tmp_log = tempfile::tempdir().unwrap();
        let log_path = tmp_log.path().join("log.xml");
        let (collector, sink) = LogCollector::new(log_path.clone(), "filesystemscan");
        let (hit_tx, mut hit_rx) = mpsc::channel(64);

        let filters = FilterSet::new(&["*.pdf".to_string()]).unwrap();
        let mut scan = FileSystemScan::new(filters, dir, hit_tx, sink);
        let collector_handle = tokio::spawn(collector.run());
        scan.start_search(quota).await;
        drop(scan);

        let mut urls = Vec::new();
        while let Some(hit) = hit_rx.recv().await {
            urls.push(hit.url);
        }
        collector_handle.await.unwrap().unwrap();
        (urls, std::fs::read_to_string(&log_path).unwrap())
    }

    #[tokio::test]
    async fn test_bfs_scan_finds_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.pdf"), b"x").unwrap();

        let (urls, log) = run_scan(dir.path().to_path_buf(), 5).await;
        assert_eq!(urls.len(), 2);
        assert!(urls[0].ends_with("a.pdf"));
        assert!(urls[1].ends_with("c.pdf"));
        assert_eq!(log.matches("event=\"hit\"").count(), 2);
        assert!(log.contains("<filesystemscan numresults=\"2\" />"));
    }

    #[tokio::test]
    async fn test_scan_respects_quota() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..4 {
            std::fs::write(dir.path().join(format!("f{}.pdf", i)), b"x").unwrap();
        }
        let (urls, log) = run_scan(dir.path().to_path_buf(), 2).await;
        assert_eq!(urls.len(), 2);
        assert!(log.contains("numresults=\"2\""));
    }
}
