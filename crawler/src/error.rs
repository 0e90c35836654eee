//! Error types for crawling.

use std::error::Error;
use std::fmt;
use std::io;
use yggdrasil_admin::{AddressError, AdminError};

/// Errors which abort a crawl.
///
/// Per-node problems such as unanswered queries or malformed responses are not
/// errors, the node is simply left out of the report. Everything here ends the
/// whole run.
#[derive(Debug)]
pub enum CrawlError {
    /// Talking to the admin socket failed.
    Admin(AdminError),
    /// A node key has no address encoding.
    Address(AddressError),
    /// Writing the report failed.
    Report(io::Error),
    /// The report writer stopped accepting records.
    SinkClosed,
}

impl fmt::Display for CrawlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlError::Admin(err) => write!(f, "Transport failure: {err}"),
            CrawlError::Address(err) => write!(f, "Invalid key material: {err}"),
            CrawlError::Report(err) => write!(f, "Failed to write report: {err}"),
            CrawlError::SinkClosed => write!(f, "Report writer closed before the crawl finished"),
        }
    }
}

impl Error for CrawlError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CrawlError::Admin(err) => Some(err),
            CrawlError::Address(err) => Some(err),
            CrawlError::Report(err) => Some(err),
            CrawlError::SinkClosed => None,
        }
    }
}

impl From<AdminError> for CrawlError {
    fn from(err: AdminError) -> Self {
        CrawlError::Admin(err)
    }
}

impl From<AddressError> for CrawlError {
    fn from(err: AddressError) -> Self {
        CrawlError::Address(err)
    }
}
