//! Streaming JSON report of crawled nodes.
//!
//! Records arrive in whatever order the crawl completes them and are rendered
//! straight away, the total count is never needed. A single blocking task owns
//! the output, producers only push into its channel through a [`ReportHandle`].

use crate::error::CrawlError;
use crate::record::NodeRecord;
use log::{debug, warn};
use std::io::{self, BufWriter, Write};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const REPORT_HEADER: &[u8] = b"{\"yggnodes\": {\n";
const REPORT_FOOTER: &[u8] = b"\n}}\n";
const ENTRY_SEPARATOR: &[u8] = b",\n";

/// Incremental writer for the `{"yggnodes": {...}}` report.
///
/// The header is written with the first record, or by [`finish`](Self::finish)
/// for an empty report. Commas only ever go between entries.
#[derive(Debug)]
pub struct ReportWriter<W: Write> {
    out: BufWriter<W>,
    started: bool,
    entries: usize,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            out: BufWriter::new(writer),
            started: false,
            entries: 0,
        }
    }

    /// Number of records written so far.
    pub fn entries(&self) -> usize {
        self.entries
    }

    fn start(&mut self) -> io::Result<()> {
        if !self.started {
            self.out.write_all(REPORT_HEADER)?;
            self.started = true;
        }
        Ok(())
    }

    /// Append a record as `"<key>": <record>`.
    pub fn write_record(&mut self, record: &NodeRecord) -> io::Result<()> {
        self.start()?;
        if self.entries > 0 {
            self.out.write_all(ENTRY_SEPARATOR)?;
        }
        write!(self.out, "\"{}\": ", record.key)?;
        serde_json::to_writer(&mut self.out, record)?;
        self.entries += 1;
        Ok(())
    }

    /// Close the report, flush it and hand back the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.start()?;
        self.out.write_all(REPORT_FOOTER)?;
        self.out.into_inner().map_err(|err| err.into_error())
    }

    /// Drop the report, discarding whatever is still buffered.
    ///
    /// Output which already overflowed the buffer has reached the writer and
    /// stays there.
    pub fn abandon(self) -> W {
        let (writer, _discarded) = self.out.into_parts();
        writer
    }
}

/// Messages understood by the report task.
#[derive(Debug)]
pub enum SinkMessage {
    /// A completed node.
    Record(Box<NodeRecord>),
    /// No more records, close the report.
    Finish,
    /// The crawl failed, emit nothing more.
    Abandon,
}

/// Producer side of a spawned report writer.
#[derive(Debug, Clone)]
pub struct ReportHandle {
    tx: mpsc::Sender<SinkMessage>,
}

impl ReportHandle {
    /// Wrap the sending half of a report channel.
    pub fn new(tx: mpsc::Sender<SinkMessage>) -> Self {
        Self { tx }
    }

    /// Queue a record, waiting while the channel is full.
    ///
    /// # Errors
    ///
    /// * `CrawlError::SinkClosed` - The report task is gone.
    pub async fn record(&self, record: NodeRecord) -> Result<(), CrawlError> {
        self.tx
            .send(SinkMessage::Record(Box::new(record)))
            .await
            .map_err(|_| CrawlError::SinkClosed)
    }

    /// Tell the report task to close the report.
    pub async fn finish(&self) -> Result<(), CrawlError> {
        self.tx
            .send(SinkMessage::Finish)
            .await
            .map_err(|_| CrawlError::SinkClosed)
    }

    /// Tell the report task to discard the report.
    pub async fn abandon(&self) {
        if self.tx.send(SinkMessage::Abandon).await.is_err() {
            debug!("Report task already stopped");
        }
    }
}

/// Run a [`ReportWriter`] on a blocking thread.
///
/// # Arguments
///
/// * `writer` - Destination of the report.
/// * `capacity` - Records that can queue before producers wait.
///
/// # Returns
///
/// The handle for producers and the task, which resolves to:
///
/// * `Ok(Some(W))` - The report was finished.
/// * `Ok(None)` - The report was abandoned, or every handle dropped without a
///   verdict.
/// * `Err(io::Error)` - Writing failed. The task stops reading, so later
///   sends fail with `SinkClosed`.
pub fn spawn_report_writer<W>(
    writer: W,
    capacity: usize,
) -> (ReportHandle, JoinHandle<io::Result<Option<W>>>)
where
    W: Write + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(capacity.max(1));

    let task = tokio::task::spawn_blocking(move || {
        let mut report = ReportWriter::new(writer);
        while let Some(message) = rx.blocking_recv() {
            match message {
                SinkMessage::Record(record) => report.write_record(&record)?,
                SinkMessage::Finish => {
                    debug!("Report finished with {} entries", report.entries());
                    return report.finish().map(Some);
                }
                SinkMessage::Abandon => {
                    debug!("Report abandoned after {} entries", report.entries());
                    report.abandon();
                    return Ok(None);
                }
            }
        }
        warn!("Report producers went away without finishing");
        report.abandon();
        Ok(None)
    });

    (ReportHandle::new(tx), task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use yggdrasil_admin::PublicKey;

    fn record(byte: u8) -> NodeRecord {
        let mut record = NodeRecord::new(PublicKey::new([byte; 32])).unwrap();
        record.peers = Some(vec![PublicKey::new([0xff; 32])]);
        record
    }

    fn parse(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_empty_report() {
        let out = ReportWriter::new(Vec::new()).finish().unwrap();
        assert_eq!(out, b"{\"yggnodes\": {\n\n}}\n");
        assert_eq!(parse(&out), json!({ "yggnodes": {} }));
    }

    #[test]
    fn test_single_record() {
        let mut writer = ReportWriter::new(Vec::new());
        writer.write_record(&record(0x10)).unwrap();
        let out = writer.finish().unwrap();

        let text = String::from_utf8(out.clone()).unwrap();
        assert!(!text.contains(",\n"), "no separator for one entry: {text}");

        let report = parse(&out);
        let key = PublicKey::new([0x10; 32]).to_string();
        let entry = &report["yggnodes"][key.as_str()];
        assert_eq!(entry["address"], json!(record(0x10).address));
        assert!(entry.get("nodeinfo").is_none());
        assert_eq!(entry["peers"], json!([PublicKey::new([0xff; 32]).to_string()]));
    }

    #[test]
    fn test_many_records() {
        let mut writer = ReportWriter::new(Vec::new());
        for byte in 1..=5u8 {
            writer.write_record(&record(byte)).unwrap();
        }
        assert_eq!(writer.entries(), 5);
        let out = writer.finish().unwrap();

        let text = String::from_utf8(out.clone()).unwrap();
        assert_eq!(text.matches(",\n").count(), 4);
        assert!(text.ends_with("\n}}\n"));

        let report = parse(&out);
        assert_eq!(report["yggnodes"].as_object().unwrap().len(), 5);
    }

    #[test]
    fn test_abandon_discards_buffered_output() {
        let mut writer = ReportWriter::new(Vec::new());
        writer.write_record(&record(0x10)).unwrap();
        assert!(writer.abandon().is_empty());
    }

    #[tokio::test]
    async fn test_spawned_writer_finish() {
        let (handle, task) = spawn_report_writer(Vec::new(), 4);
        handle.record(record(1)).await.unwrap();
        handle.record(record(2)).await.unwrap();
        handle.finish().await.unwrap();

        let out = task.await.unwrap().unwrap().unwrap();
        assert_eq!(parse(&out)["yggnodes"].as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_spawned_writer_abandon() {
        let (handle, task) = spawn_report_writer(Vec::new(), 4);
        handle.record(record(1)).await.unwrap();
        handle.abandon().await;

        assert!(task.await.unwrap().unwrap().is_none());
        assert!(matches!(
            handle.record(record(2)).await,
            Err(CrawlError::SinkClosed)
        ));
    }

    #[tokio::test]
    async fn test_spawned_writer_dropped_handles() {
        let (handle, task) = spawn_report_writer(Vec::new(), 4);
        handle.record(record(1)).await.unwrap();
        drop(handle);
        assert!(task.await.unwrap().unwrap().is_none());
    }
}
