//! Builder pattern for configuring and creating crawler instances.

use crate::crawler::Crawler;
use crate::probe::NodeProbe;
use crate::session::SessionConfig;
use std::time::Duration;

/// Default maximum number of probes running at once.
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 32;
/// Default period between status log lines.
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Builder for creating a customized [`Crawler`] instance.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use yggdrasil_crawler::{AdminClient, AdminConfiguration, AdminProbe, CrawlerBuilder};
///
/// let client = AdminClient::unix(AdminConfiguration::default());
/// let crawler = CrawlerBuilder::new(AdminProbe::new(client))
///     .with_max_concurrent_probes(16)
///     .with_status_interval(Duration::from_secs(10))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct CrawlerBuilder<P> {
    /// Probe used for every node.
    probe: P,
    /// Maximum number of probes running at once.
    max_concurrent_probes: usize,
    /// Period between status log lines.
    status_interval: Duration,
}

impl<P: NodeProbe> CrawlerBuilder<P> {
    /// Create a new crawler builder.
    ///
    /// # Arguments
    ///
    /// * `probe` - How nodes are queried.
    pub fn new(probe: P) -> Self {
        CrawlerBuilder {
            probe,
            max_concurrent_probes: DEFAULT_MAX_CONCURRENT_PROBES,
            status_interval: DEFAULT_STATUS_INTERVAL,
        }
    }

    /// Set the maximum number of probes running at once.
    ///
    /// Every probe holds an admin socket connection open while it waits on a
    /// remote node, so this also bounds the load put on the local daemon.
    ///
    /// # Arguments
    ///
    /// * `max_probes` - Maximum concurrent probes (defaults to 32, at least 1).
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_max_concurrent_probes(mut self, max_probes: usize) -> Self {
        self.max_concurrent_probes = max_probes.max(1);
        self
    }

    /// Set how often progress is logged while crawling.
    ///
    /// # Arguments
    ///
    /// * `interval` - Period between status lines (defaults to 60 seconds, at
    ///   least 1 millisecond).
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Build the crawler with the configured options.
    pub fn build(self) -> Crawler<P> {
        Crawler::new(
            self.probe,
            SessionConfig {
                max_concurrent_probes: self.max_concurrent_probes,
                status_interval: self.status_interval,
            },
        )
    }
}
