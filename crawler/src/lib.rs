//! Crawler for the Yggdrasil overlay network.
//!
//! Walks the network through the local daemon's admin socket, probing every
//! node reachable over peer and DHT links, and streams the results into a
//! single `{"yggnodes": {...}}` JSON report.

mod builder;
mod crawler;
mod error;
mod probe;
mod record;
mod report;
mod session;

pub use builder::{CrawlerBuilder, DEFAULT_MAX_CONCURRENT_PROBES, DEFAULT_STATUS_INTERVAL};
pub use crawler::Crawler;
pub use error::CrawlError;
pub use probe::{AdminProbe, NodeProbe};
pub use record::NodeRecord;
pub use report::{spawn_report_writer, ReportHandle, ReportWriter, SinkMessage};
pub use session::CrawlSummary;

// Re-exports.
pub use yggdrasil_admin::{
    Address, AddressError, AdminClient, AdminConfiguration, AdminError, Dialer, PublicKey,
};

#[cfg(unix)]
pub use yggdrasil_admin::UnixDialer;
