//! Raw ticker archival
//!
//! Archive sinks record raw tickers for later inspection. They sit beside
//! the ranking pipeline, never in it: the engine offers each decoded ticker
//! to an `ArchiveHandle`, which enqueues without waiting. A background task
//! drains the queue in batches and hands each batch to every sink. Sink
//! failures are logged and swallowed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Local;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::envelope;
use types::errors::CodecError;
use types::ticker::RawTicker;

use crate::transport::{Publisher, TransportError};

/// Largest batch handed to sinks in one call.
const MAX_BATCH: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Codec(#[from] CodecError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Destination for raw tickers.
#[async_trait]
pub trait ArchiveSink: Send {
    fn name(&self) -> &str;

    async fn archive(&mut self, tickers: &[RawTicker]) -> Result<(), ArchiveError>;
}

/// Re-publishes raw tickers to a broker topic, keyed by symbol and stamped
/// with the ticker's own event time.
pub struct BrokerArchive<P> {
    publisher: P,
    topic: String,
}

impl<P: Publisher> BrokerArchive<P> {
    pub fn new(publisher: P, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl<P: Publisher> ArchiveSink for BrokerArchive<P> {
    fn name(&self) -> &str {
        "broker"
    }

    async fn archive(&mut self, tickers: &[RawTicker]) -> Result<(), ArchiveError> {
        for ticker in tickers {
            let payload = envelope::encode(ticker)?;
            self.publisher
                .publish(
                    &self.topic,
                    Some(ticker.symbol.as_str()),
                    payload,
                    ticker.timestamp_ms(),
                )
                .await?;
        }
        Ok(())
    }
}

/// Appends one JSON line per ticker to `<dir>/<prefix>_<SYMBOL>.txt`.
///
/// Without an explicit prefix the file name uses today's local date:
/// `raw_ticker_YYYYMMDD`.
#[derive(Debug, Clone)]
pub struct FileArchive {
    directory: PathBuf,
    prefix: Option<String>,
}

impl FileArchive {
    /// Create the archive, making the directory if needed.
    pub async fn new(directory: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).await?;
        Ok(Self {
            directory,
            prefix: None,
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File receiving tickers for `symbol`.
    pub fn file_for(&self, symbol: &str) -> PathBuf {
        let prefix = match &self.prefix {
            Some(p) => p.clone(),
            None => format!("raw_ticker_{}", Local::now().format("%Y%m%d")),
        };
        self.directory.join(format!("{}_{}.txt", prefix, symbol))
    }
}

#[async_trait]
impl ArchiveSink for FileArchive {
    fn name(&self) -> &str {
        "file"
    }

    async fn archive(&mut self, tickers: &[RawTicker]) -> Result<(), ArchiveError> {
        let mut by_symbol: BTreeMap<&str, Vec<&RawTicker>> = BTreeMap::new();
        for ticker in tickers {
            by_symbol.entry(ticker.symbol.as_str()).or_default().push(ticker);
        }

        for (symbol, group) in by_symbol {
            let mut buf = Vec::new();
            for ticker in group {
                serde_json::to_writer(&mut buf, ticker)?;
                buf.push(b'\n');
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.file_for(symbol))
                .await?;
            file.write_all(&buf).await?;
            file.flush().await?;
        }
        Ok(())
    }
}

/// Non-blocking entry point into the archive queue.
#[derive(Debug, Clone)]
pub struct ArchiveHandle {
    tx: mpsc::Sender<RawTicker>,
}

impl ArchiveHandle {
    /// Enqueue a copy of `ticker`. Returns false if it was dropped.
    pub fn offer(&self, ticker: &RawTicker) -> bool {
        match self.tx.try_send(ticker.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(symbol = %ticker.symbol, "Archive queue full, dropping ticker");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(symbol = %ticker.symbol, "Archive task stopped, dropping ticker");
                false
            }
        }
    }
}

/// Start the archive task. It runs until every handle is dropped and the
/// queue is drained, then resolves to the number of tickers taken off the
/// queue.
pub fn spawn_archiver(
    mut sinks: Vec<Box<dyn ArchiveSink>>,
    capacity: usize,
) -> (ArchiveHandle, JoinHandle<u64>) {
    let (tx, mut rx) = mpsc::channel::<RawTicker>(capacity.max(1));

    let task = tokio::spawn(async move {
        let mut archived: u64 = 0;
        let mut batch = Vec::with_capacity(MAX_BATCH);

        while let Some(first) = rx.recv().await {
            batch.push(first);
            while batch.len() < MAX_BATCH {
                match rx.try_recv() {
                    Ok(next) => batch.push(next),
                    Err(_) => break,
                }
            }

            for sink in sinks.iter_mut() {
                if let Err(e) = sink.archive(&batch).await {
                    warn!(sink = sink.name(), error = %e, batch = batch.len(), "Archive sink failed");
                }
            }
            debug!(batch = batch.len(), "Archived batch");
            archived += batch.len() as u64;
            batch.clear();
        }

        info!(archived, "Archive task finished");
        archived
    });

    (ArchiveHandle { tx }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;
    use chrono::DateTime;
    use types::ids::Symbol;

    fn ticker(symbol: &str, last: f64) -> RawTicker {
        RawTicker::new(
            Symbol::new(symbol),
            last,
            DateTime::parse_from_rfc3339("2024-03-04T10:00:00-05:00").unwrap(),
        )
    }

    struct FailingSink;

    #[async_trait]
    impl ArchiveSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn archive(&mut self, _tickers: &[RawTicker]) -> Result<(), ArchiveError> {
            Err(ArchiveError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }
    }

    #[tokio::test]
    async fn test_file_archive_appends_per_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileArchive::new(dir.path()).await.unwrap().with_prefix("day");

        sink.archive(&[ticker("AAPL", 1.0), ticker("MSFT", 2.0)]).await.unwrap();
        sink.archive(&[ticker("AAPL", f64::NAN)]).await.unwrap();

        let aapl = std::fs::read_to_string(dir.path().join("day_AAPL.txt")).unwrap();
        let lines: Vec<&str> = aapl.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: RawTicker = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.last, 1.0);
        let second: RawTicker = serde_json::from_str(lines[1]).unwrap();
        assert!(second.last.is_nan());

        let msft = std::fs::read_to_string(dir.path().join("day_MSFT.txt")).unwrap();
        assert_eq!(msft.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_file_archive_default_prefix_uses_local_date() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileArchive::new(dir.path().join("nested")).await.unwrap();
        assert!(sink.directory().exists());

        let name = sink.file_for("F").file_name().unwrap().to_string_lossy().to_string();
        let expected = format!("raw_ticker_{}_F.txt", Local::now().format("%Y%m%d"));
        assert_eq!(name, expected);
    }

    #[tokio::test]
    async fn test_broker_archive_keys_by_symbol_with_event_time() {
        let broker = MemoryBroker::new(1);
        let mut sink = BrokerArchive::new(broker.producer(), "raw_ticker_event");
        let t = ticker("TSLA", 201.0);
        sink.archive(&[t.clone()]).await.unwrap();

        let records = broker.records("raw_ticker_event").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key.as_deref(), Some("TSLA"));
        assert_eq!(records[0].timestamp_ms, t.timestamp_ms());
        let decoded: RawTicker = envelope::decode(&records[0].payload).unwrap();
        assert_eq!(decoded, t);
    }

    #[tokio::test]
    async fn test_archiver_survives_failing_sink() {
        let broker = MemoryBroker::new(1);
        let sinks: Vec<Box<dyn ArchiveSink>> = vec![
            Box::new(FailingSink),
            Box::new(BrokerArchive::new(broker.producer(), "raw")),
        ];
        let (handle, task) = spawn_archiver(sinks, 16);

        assert!(handle.offer(&ticker("AAPL", 1.0)));
        assert!(handle.offer(&ticker("AAPL", 2.0)));
        drop(handle);

        assert_eq!(task.await.unwrap(), 2);
        assert_eq!(broker.records("raw").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_offer_drops_when_queue_full() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ArchiveHandle { tx };
        assert!(handle.offer(&ticker("AAPL", 1.0)));
        assert!(!handle.offer(&ticker("AAPL", 2.0)));
    }

    #[tokio::test]
    async fn test_offer_drops_when_task_gone() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let handle = ArchiveHandle { tx };
        assert!(!handle.offer(&ticker("AAPL", 1.0)));
    }
}
