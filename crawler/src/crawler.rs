use crate::error::CrawlError;
use crate::probe::NodeProbe;
use crate::report::{spawn_report_writer, ReportHandle};
use crate::session::{CrawlSession, CrawlSummary, SessionConfig};
use log::info;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use yggdrasil_admin::PublicKey;

/// A crawler for the Yggdrasil overlay network.
///
/// Starting from a seed node, the crawler probes every node it can reach
/// through peer and DHT links and streams a record for each one that answers.
/// A crawler can run any number of crawls, each with its own visited state.
#[derive(Debug)]
pub struct Crawler<P> {
    /// Probe shared by every task of every crawl.
    probe: Arc<P>,
    config: SessionConfig,
}

impl<P> Clone for Crawler<P> {
    fn clone(&self) -> Self {
        Self {
            probe: Arc::clone(&self.probe),
            config: self.config.clone(),
        }
    }
}

impl<P: NodeProbe> Crawler<P> {
    pub(crate) fn new(probe: P, config: SessionConfig) -> Self {
        Self {
            probe: Arc::new(probe),
            config,
        }
    }

    /// Maximum number of probes running at once.
    pub fn max_concurrent_probes(&self) -> usize {
        self.config.max_concurrent_probes
    }

    /// Period between status log lines.
    pub fn status_interval(&self) -> Duration {
        self.config.status_interval
    }

    /// Crawl the network reachable from `seed`, pushing records into `report`.
    ///
    /// Returns once every reachable node has been probed. The report is neither
    /// finished nor abandoned, that is left to the caller.
    ///
    /// # Errors
    ///
    /// * `CrawlError` - A fatal error, the crawl stopped early.
    pub async fn crawl(
        &self,
        seed: PublicKey,
        report: ReportHandle,
    ) -> Result<CrawlSummary, CrawlError> {
        info!("Crawling from seed {seed}");
        let session = CrawlSession::new(Arc::clone(&self.probe), self.config.clone(), report);
        session.coordinate(seed).await
    }

    /// Crawl the network reachable from `seed` and write the report to `writer`.
    ///
    /// A failed crawl abandons the report, nothing still buffered reaches the
    /// writer and no footer is written.
    ///
    /// # Returns
    ///
    /// * `Ok((CrawlSummary, W))` - The crawl totals and the writer, flushed.
    /// * `Err(CrawlError)` - The crawl or the report failed. A write failure is
    ///   reported in preference to the crawl error it caused.
    pub async fn crawl_into<W>(&self, seed: PublicKey, writer: W) -> Result<(CrawlSummary, W), CrawlError>
    where
        W: Write + Send + 'static,
    {
        let (report, writer_task) =
            spawn_report_writer(writer, self.config.max_concurrent_probes);

        let outcome = self.crawl(seed, report.clone()).await;
        match &outcome {
            // A failed send shows up as the writer task's result.
            Ok(_) => {
                let _ = report.finish().await;
            }
            Err(_) => report.abandon().await,
        }
        drop(report);

        let written = writer_task
            .await
            .map_err(|err| CrawlError::Report(io::Error::from(err)))?
            .map_err(CrawlError::Report)?;

        match (outcome, written) {
            (Ok(summary), Some(writer)) => Ok((summary, writer)),
            (Ok(_), None) => Err(CrawlError::SinkClosed),
            (Err(err), _) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CrawlerBuilder;
    use crate::probe::test_utils::{MockNode, MockProbe};
    use serde_json::Value;
    use std::collections::HashMap;

    fn key(byte: u8) -> PublicKey {
        PublicKey::new([byte; 32])
    }

    /// Writer which fails every write.
    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
        }
    }

    #[tokio::test]
    async fn test_crawl_into_writes_report() {
        let probe = MockProbe::new(HashMap::from([
            (key(1), MockNode::Peers(vec![key(2), key(3)])),
            (key(2), MockNode::Peers(vec![key(1)])),
            (key(3), MockNode::Peers(vec![key(1)])),
        ]));
        let crawler = CrawlerBuilder::new(probe).build();

        let (summary, out) = crawler.crawl_into(key(1), Vec::new()).await.unwrap();
        assert_eq!(summary.recorded, 3);

        let report: Value = serde_json::from_slice(&out).unwrap();
        let nodes = report["yggnodes"].as_object().unwrap();
        assert_eq!(nodes.len(), 3);
        for byte in 1..=3 {
            assert!(nodes.contains_key(&key(byte).to_string()));
        }
    }

    #[tokio::test]
    async fn test_crawl_into_empty_report() {
        let probe = MockProbe::new(HashMap::from([(key(1), MockNode::Silent)]));
        let crawler = CrawlerBuilder::new(probe).build();

        let (summary, out) = crawler.crawl_into(key(1), Vec::new()).await.unwrap();
        assert_eq!(summary.recorded, 0);
        assert_eq!(out, b"{\"yggnodes\": {\n\n}}\n");
    }

    #[tokio::test]
    async fn test_crawl_into_fatal_error() {
        let probe = MockProbe::new(HashMap::from([
            (key(1), MockNode::Peers(vec![key(2)])),
            (key(2), MockNode::Broken),
        ]));
        let crawler = CrawlerBuilder::new(probe).build();

        let result = crawler.crawl_into(key(1), Vec::new()).await;
        assert!(matches!(result, Err(CrawlError::Admin(_))));
    }

    #[tokio::test]
    async fn test_crawl_into_write_failure() {
        let probe = MockProbe::new(HashMap::from([(key(1), MockNode::Peers(vec![]))]));
        let crawler = CrawlerBuilder::new(probe).build();

        let result = crawler.crawl_into(key(1), BrokenWriter).await;
        match result {
            Err(CrawlError::Report(err)) => assert_eq!(err.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected report error, got {:?}", other.map(|(summary, _)| summary)),
        }
    }

    #[tokio::test]
    async fn test_crawler_reusable() {
        let probe = MockProbe::new(HashMap::from([(key(1), MockNode::Peers(vec![]))]));
        let crawler = CrawlerBuilder::new(probe.clone()).build();

        for _ in 0..2 {
            let (summary, _) = crawler.crawl_into(key(1), Vec::new()).await.unwrap();
            assert_eq!(summary.recorded, 1);
        }
        assert_eq!(probe.calls(&key(1)), 2);
    }
}
