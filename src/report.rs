//! Structured report log: event channel, collector, and run watchdog.
//!
//! Every pipeline component sends XML payload fragments tagged with its
//! source name. The collector wraps each fragment in a `<logitem>` carrying
//! the arrival timestamp and buffers them in arrival order; the complete log
//! is written atomically once the run has quiesced.

use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One report fragment, tagged by the component that produced it.
#[derive(Debug)]
pub struct LogEvent {
    pub source: &'static str,
    pub payload: String,
}

/// Cloneable handle components use to emit report fragments.
#[derive(Clone)]
pub struct LogSink {
    source: &'static str,
    tx: mpsc::Sender<LogEvent>,
}

impl LogSink {
    /// Send one XML payload fragment. Errors are ignored: a closed collector
    /// means the run is already shutting down.
    pub async fn report(&self, payload: impl Into<String>) {
        let _ = self
            .tx
            .send(LogEvent {
                source: self.source,
                payload: payload.into(),
            })
            .await;
    }

    /// Same sink under a different source tag.
    pub fn with_source(&self, source: &'static str) -> LogSink {
        LogSink {
            source,
            tx: self.tx.clone(),
        }
    }
}

/// Collects report fragments from all producers and writes the final log.
pub struct LogCollector {
    rx: mpsc::Receiver<LogEvent>,
    output: PathBuf,
    items: Vec<String>,
}

impl LogCollector {
    /// Create a collector writing to `output`, plus the sink producers clone.
    pub fn new(output: PathBuf, source: &'static str) -> (Self, LogSink) {
        let (tx, rx) = mpsc::channel(256);
        (
            Self {
                rx,
                output,
                items: Vec::new(),
            },
            LogSink { source, tx },
        )
    }

    /// Receive until every sender is dropped, then write the log out.
    pub async fn run(mut self) -> anyhow::Result<()> {
        while let Some(event) = self.rx.recv().await {
            let time = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
            self.items.push(format!(
                "<logitem source=\"{}\" time=\"{}\">\n{}</logitem>\n",
                event.source, time, event.payload
            ));
        }
        self.write_out().await
    }

    /// Write the buffered log items as one XML document, atomically.
    async fn write_out(&self) -> anyhow::Result<()> {
        let mut text = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n<log>\n");
        for item in &self.items {
            text.push_str(item);
        }
        text.push_str("</log>\n");

        let tmp = self.output.with_extension("log.tmp");
        tokio::fs::write(&tmp, text.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.output).await?;
        Ok(())
    }
}

/// Awaits the completion of every registered pipeline stage.
///
/// Stages signal termination by finishing their task; the watchdog holds the
/// join handles and resolves once all of them have run to completion, at
/// which point the log can be sealed.
pub struct Watchdog {
    handles: Vec<JoinHandle<()>>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    /// Register a stage task to wait on.
    pub fn watch(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    /// Wait until every watched stage has terminated.
    pub async fn quiesce(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!("pipeline stage panicked: {}", e);
            }
        }
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collector_preserves_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.xml");
        let (collector, sink) = LogCollector::new(path.clone(), "webcrawler");

        let handle = tokio::spawn(collector.run());
        sink.report("<first />\n").await;
        sink.with_source("urldownloader")
            .report("<second />\n")
            .await;
        drop(sink);
        handle.await.unwrap().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n<log>\n"));
        assert!(text.ends_with("</log>\n"));
        let first = text.find("<first />").unwrap();
        let second = text.find("<second />").unwrap();
        assert!(first < second);
        assert!(text.contains("source=\"webcrawler\""));
        assert!(text.contains("source=\"urldownloader\""));
    }
}
