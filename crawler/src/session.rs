//! Internal session coordination for crawling operations.
//!
//! This module contains the [`CrawlSession`] which drives a single crawl. Every
//! discovered key gets its own task, tasks spawn further tasks for the keys they
//! discover, and the coordinator waits for the count of outstanding tasks to
//! drop to zero.

use crate::error::CrawlError;
use crate::probe::NodeProbe;
use crate::report::ReportHandle;
use log::{debug, error, info};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use yggdrasil_admin::PublicKey;

/// Configuration for a crawl session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_concurrent_probes: usize,
    pub status_interval: Duration,
}

/// Totals of a finished crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Nodes written to the report.
    pub recorded: usize,
    /// Probes which produced nothing or lost a race to record their key.
    pub abandoned: usize,
}

/// Result of processing a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskResult {
    /// The node was recorded and its neighbours spawned.
    Recorded,
    /// The probe produced nothing usable.
    Abandoned,
    /// Already visited or owned by another task.
    Skipped,
    /// The crawl was aborted before the task could finish.
    Aborted,
}

/// Mutable state shared by every task of one crawl.
#[derive(Debug, Default)]
struct CrawlState {
    /// Keys with a recorded node. Only ever grows.
    visited: Mutex<HashSet<PublicKey>>,
    /// Keys being probed right now.
    in_flight: Mutex<HashSet<PublicKey>>,
    /// Spawned tasks which have not finished.
    outstanding: AtomicUsize,
    recorded: AtomicUsize,
    abandoned: AtomicUsize,
    aborted: AtomicBool,
    /// Signalled when `outstanding` drops to zero.
    exhausted: Notify,
}

impl CrawlState {
    fn is_visited(&self, key: &PublicKey) -> bool {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// Record `key` as visited, false if it already was.
    fn mark_visited(&self, key: PublicKey) -> bool {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key)
    }

    /// Take ownership of probing `key`.
    ///
    /// Fails if another task holds the key or it was visited. Visited is checked
    /// while holding the in-flight lock, so a key released right after being
    /// marked visited cannot be claimed again.
    fn claim(self: &Arc<Self>, key: PublicKey) -> Option<ClaimGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.contains(&key) || self.is_visited(&key) {
            return None;
        }
        in_flight.insert(key);
        Some(ClaimGuard {
            state: Arc::clone(self),
            key,
        })
    }

    fn visited_count(&self) -> usize {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn summary(&self) -> CrawlSummary {
        CrawlSummary {
            recorded: self.recorded.load(Ordering::SeqCst),
            abandoned: self.abandoned.load(Ordering::SeqCst),
        }
    }
}

/// Releases an in-flight claim when dropped.
struct ClaimGuard {
    state: Arc<CrawlState>,
    key: PublicKey,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.state
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Counts a task as finished when dropped, whichever way the task ends.
struct TaskGuard {
    state: Arc<CrawlState>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.state.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.exhausted.notify_one();
        }
    }
}

/// Internal coordinator for a crawling session.
///
/// # Architecture
///
/// * **Coordinator** (`coordinate()`) - Spawns the seed task, then waits for the
///   crawl to run dry or for a task to report a fatal error.
/// * **Processors** (`process()`) - Probe one key each, emit its record and
///   spawn processors for its neighbours.
///
/// A fatal error closes the permit pool and raises the abort flag. Tasks waiting
/// for a permit exit straight away and tasks mid-probe emit nothing.
pub struct CrawlSession<P> {
    probe: Arc<P>,
    config: SessionConfig,
    report: ReportHandle,
    state: Arc<CrawlState>,
    permits: Arc<Semaphore>,
}

impl<P> Clone for CrawlSession<P> {
    fn clone(&self) -> Self {
        Self {
            probe: Arc::clone(&self.probe),
            config: self.config.clone(),
            report: self.report.clone(),
            state: Arc::clone(&self.state),
            permits: Arc::clone(&self.permits),
        }
    }
}

impl<P: NodeProbe> CrawlSession<P> {
    /// Create a new crawl session with fresh state.
    pub fn new(probe: Arc<P>, config: SessionConfig, report: ReportHandle) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_probes.max(1)));
        Self {
            probe,
            config,
            report,
            state: Arc::new(CrawlState::default()),
            permits,
        }
    }

    /// Spawn a task for `key`, counting it as outstanding first.
    fn spawn(&self, key: PublicKey, failure_tx: &mpsc::UnboundedSender<CrawlError>) {
        self.state.outstanding.fetch_add(1, Ordering::SeqCst);
        let guard = TaskGuard {
            state: Arc::clone(&self.state),
        };
        let session = self.clone();
        let failure_tx = failure_tx.clone();

        tokio::spawn(async move {
            let _guard = guard;
            match session.process(key, &failure_tx).await {
                Ok(result) => debug!("Task for {key} completed with result: {result:?}"),
                Err(err) => {
                    session.abort();
                    // Receiver gone means the coordinator already gave up.
                    let _ = failure_tx.send(err);
                }
            }
        });
    }

    fn abort(&self) {
        self.state.aborted.store(true, Ordering::SeqCst);
        self.permits.close();
    }

    fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::SeqCst)
    }

    /// Processes a single key: probes it, records it and fans out.
    ///
    /// # Arguments
    ///
    /// * `key` - The node to probe.
    /// * `failure_tx` - Handed to the tasks spawned for neighbours.
    ///
    /// # Returns
    ///
    /// * `Ok(TaskResult)` - What happened to the key.
    /// * `Err(CrawlError)` - A fatal error for the whole crawl.
    async fn process(
        &self,
        key: PublicKey,
        failure_tx: &mpsc::UnboundedSender<CrawlError>,
    ) -> Result<TaskResult, CrawlError> {
        // Closed on abort.
        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return Ok(TaskResult::Aborted);
        };
        if self.is_aborted() {
            return Ok(TaskResult::Aborted);
        }
        let Some(claim) = self.state.claim(key) else {
            return Ok(TaskResult::Skipped);
        };

        debug!("Probing {key}");
        let Some(record) = self.probe.probe(&key).await? else {
            self.state.abandoned.fetch_add(1, Ordering::SeqCst);
            return Ok(TaskResult::Abandoned);
        };
        // Released as soon as the key is visited, the claim check covers the gap.
        let newly_visited = self.state.mark_visited(key);
        drop(claim);
        if !newly_visited {
            self.state.abandoned.fetch_add(1, Ordering::SeqCst);
            return Ok(TaskResult::Abandoned);
        }
        if self.is_aborted() {
            return Ok(TaskResult::Aborted);
        }

        let neighbours: Vec<PublicKey> = record.neighbours().copied().collect();
        self.report.record(record).await?;
        self.state.recorded.fetch_add(1, Ordering::SeqCst);

        // Visited keys are filtered here only to save spawns, the claim is what
        // guarantees uniqueness.
        for neighbour in neighbours {
            if !self.state.is_visited(&neighbour) {
                self.spawn(neighbour, failure_tx);
            }
        }
        Ok(TaskResult::Recorded)
    }

    /// Crawls the graph reachable from `seed` until it runs dry.
    ///
    /// # Termination Conditions
    ///
    /// 1. **Natural Completion** - Every spawned task has finished.
    /// 2. **Fatal Error** - A task failed in a way that invalidates the crawl.
    ///    Outstanding tasks are told to stop but not waited for.
    pub async fn coordinate(&self, seed: PublicKey) -> Result<CrawlSummary, CrawlError> {
        let (failure_tx, mut failure_rx) = mpsc::unbounded_channel();
        self.spawn(seed, &failure_tx);

        let period = self.config.status_interval;
        let mut status = interval_at(Instant::now() + period, period);
        status.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                Some(err) = failure_rx.recv() => {
                    self.abort();
                    error!("Crawl aborted: {err}");
                    return Err(err);
                }
                _ = self.state.exhausted.notified() => {
                    // The last task may have failed on its way out.
                    if let Ok(err) = failure_rx.try_recv() {
                        self.abort();
                        error!("Crawl aborted: {err}");
                        return Err(err);
                    }
                    break;
                }
                _ = status.tick() => {
                    info!(
                        "{} active tasks (max probes: {}), {} nodes visited, {} in flight",
                        self.state.outstanding.load(Ordering::SeqCst),
                        self.config.max_concurrent_probes,
                        self.state.visited_count(),
                        self.state.in_flight_count()
                    );
                }
            }
        }

        let summary = self.state.summary();
        info!(
            "Crawler exhausted - {} nodes recorded, {} probes abandoned",
            summary.recorded, summary.abandoned
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::test_utils::{MockNode, MockProbe};
    use crate::report::SinkMessage;
    use std::collections::HashMap;

    fn key(byte: u8) -> PublicKey {
        PublicKey::new([byte; 32])
    }

    fn config(max_concurrent_probes: usize) -> SessionConfig {
        SessionConfig {
            max_concurrent_probes,
            status_interval: Duration::from_secs(60),
        }
    }

    /// Run a session and collect the keys it reported.
    async fn run(
        probe: &MockProbe,
        max_concurrent_probes: usize,
        seed: PublicKey,
    ) -> (Result<CrawlSummary, CrawlError>, Vec<PublicKey>) {
        let (tx, mut rx) = mpsc::channel(1024);
        let session = CrawlSession::new(
            Arc::new(probe.clone()),
            config(max_concurrent_probes),
            ReportHandle::new(tx),
        );
        let result = session.coordinate(seed).await;

        let mut reported = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let SinkMessage::Record(record) = message {
                reported.push(record.key);
            }
        }
        (result, reported)
    }

    #[tokio::test]
    async fn test_two_node_cycle_terminates() {
        let probe = MockProbe::new(HashMap::from([
            (key(1), MockNode::Peers(vec![key(2)])),
            (key(2), MockNode::Peers(vec![key(1)])),
        ]));

        let (result, mut reported) = run(&probe, 4, key(1)).await;
        assert_eq!(
            result.unwrap(),
            CrawlSummary {
                recorded: 2,
                abandoned: 0
            }
        );
        reported.sort();
        assert_eq!(reported, vec![key(1), key(2)]);
        assert_eq!(probe.calls(&key(1)), 1);
        assert_eq!(probe.calls(&key(2)), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_complete_graph_probes_each_key_once() {
        let keys: Vec<PublicKey> = (1..=12).map(key).collect();
        let nodes = keys
            .iter()
            .map(|k| (*k, MockNode::Peers(keys.clone())))
            .collect();
        let probe = MockProbe::new(nodes).with_delay(Duration::from_millis(5));

        let (result, reported) = run(&probe, 8, key(1)).await;
        assert_eq!(result.unwrap().recorded, keys.len());

        let unique: HashSet<_> = reported.iter().collect();
        assert_eq!(unique.len(), reported.len(), "duplicate records emitted");
        assert_eq!(reported.len(), keys.len());
        for k in &keys {
            assert_eq!(probe.calls(k), 1, "{k} probed more than once");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_bounded_by_permits() {
        // Star around key 1, every leaf discovered at once.
        let leaves: Vec<PublicKey> = (2..=30).map(key).collect();
        let mut nodes: HashMap<_, _> = leaves
            .iter()
            .map(|k| (*k, MockNode::Peers(vec![])))
            .collect();
        nodes.insert(key(1), MockNode::Peers(leaves.clone()));
        let probe = MockProbe::new(nodes).with_delay(Duration::from_millis(20));

        let (result, reported) = run(&probe, 3, key(1)).await;
        assert_eq!(result.unwrap().recorded, 30);
        assert_eq!(reported.len(), 30);
        assert!(probe.max_active() <= 3, "max active was {}", probe.max_active());
        assert!(probe.max_active() > 1, "probes never overlapped");
    }

    #[tokio::test]
    async fn test_abandoned_key_is_not_reported() {
        // 1 -> {2, 3}, 2 never answers, 3 -> {2, 4}
        let probe = MockProbe::new(HashMap::from([
            (key(1), MockNode::Peers(vec![key(2), key(3)])),
            (key(2), MockNode::Silent),
            (key(3), MockNode::Peers(vec![key(2), key(4)])),
            (key(4), MockNode::Peers(vec![])),
        ]));

        let (result, mut reported) = run(&probe, 4, key(1)).await;
        let summary = result.unwrap();
        assert_eq!(summary.recorded, 3);
        assert!(summary.abandoned >= 1);

        reported.sort();
        assert_eq!(reported, vec![key(1), key(3), key(4)]);
        assert!(probe.calls(&key(2)) >= 1);
    }

    #[tokio::test]
    async fn test_silent_seed_yields_empty_crawl() {
        let probe = MockProbe::new(HashMap::from([(key(1), MockNode::Silent)]));

        let (result, reported) = run(&probe, 4, key(1)).await;
        assert_eq!(
            result.unwrap(),
            CrawlSummary {
                recorded: 0,
                abandoned: 1
            }
        );
        assert!(reported.is_empty());
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_crawl() {
        let probe = MockProbe::new(HashMap::from([
            (key(1), MockNode::Peers(vec![key(2)])),
            (key(2), MockNode::Broken),
        ]));

        let (result, _) = run(&probe, 4, key(1)).await;
        assert!(matches!(result, Err(CrawlError::Admin(_))));
    }

    #[tokio::test]
    async fn test_closed_sink_aborts_crawl() {
        let probe = MockProbe::new(HashMap::from([(key(1), MockNode::Peers(vec![]))]));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let session = CrawlSession::new(Arc::new(probe), config(4), ReportHandle::new(tx));
        let result = session.coordinate(key(1)).await;
        assert!(matches!(result, Err(CrawlError::SinkClosed)));
    }

    #[tokio::test]
    async fn test_claim_excludes_in_flight_and_visited() {
        let state = Arc::new(CrawlState::default());

        let claim = state.claim(key(1));
        assert!(claim.is_some());
        assert!(state.claim(key(1)).is_none());
        assert_eq!(state.in_flight_count(), 1);

        assert!(state.mark_visited(key(1)));
        drop(claim);
        assert_eq!(state.in_flight_count(), 0);
        assert!(state.claim(key(1)).is_none());
        assert!(!state.mark_visited(key(1)));

        // Released without a record, so it can be claimed again.
        drop(state.claim(key(2)));
        assert!(state.claim(key(2)).is_some());
    }

    #[tokio::test]
    async fn test_claim_released_while_waiting_on_sink() {
        let probe = MockProbe::new(HashMap::from([(key(1), MockNode::Peers(vec![]))]));
        let (tx, mut rx) = mpsc::channel(1);
        // Fill the channel so the record send has to wait.
        tx.send(SinkMessage::Finish).await.unwrap();

        let session = CrawlSession::new(Arc::new(probe), config(4), ReportHandle::new(tx));
        let state = Arc::clone(&session.state);
        let crawl = tokio::spawn(async move { session.coordinate(key(1)).await });

        while !state.is_visited(&key(1)) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(state.in_flight_count(), 0, "visited key still claimed");
        assert_eq!(state.summary().recorded, 0);

        assert!(matches!(rx.recv().await, Some(SinkMessage::Finish)));
        assert!(matches!(rx.recv().await, Some(SinkMessage::Record(_))));
        assert_eq!(crawl.await.unwrap().unwrap().recorded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_crawl_outlives_status_interval() {
        let probe = MockProbe::new(HashMap::from([
            (key(1), MockNode::Peers(vec![key(2)])),
            (key(2), MockNode::Peers(vec![])),
        ]))
        .with_delay(Duration::from_secs(90));
        let (tx, mut rx) = mpsc::channel(16);
        let session = CrawlSession::new(Arc::new(probe), config(4), ReportHandle::new(tx));

        let started = Instant::now();
        let summary = session.coordinate(key(1)).await.unwrap();
        // Two sequential probes span three status periods.
        assert!(started.elapsed() >= Duration::from_secs(180));
        assert_eq!(
            summary,
            CrawlSummary {
                recorded: 2,
                abandoned: 0
            }
        );

        let mut reported = 0;
        while let Ok(SinkMessage::Record(_)) = rx.try_recv() {
            reported += 1;
        }
        assert_eq!(reported, 2);
    }
}
