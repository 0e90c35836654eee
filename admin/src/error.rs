//! Error types for admin socket communication.

use crate::key::KeyError;
use std::error::Error;
use std::fmt;
use std::io;

/// Errors that can occur while talking to the daemon's admin socket.
///
/// Every variant is a hard failure of the exchange itself. Responses which
/// arrive intact but report a failure are not errors at this level, see
/// [`Response::is_soft_failure`](crate::Response::is_soft_failure).
#[derive(Debug)]
pub enum AdminError {
    /// An I/O error occurred while dialing, writing or reading, including timeouts.
    Io(io::Error),
    /// The request could not be serialized.
    Encode(serde_json::Error),
    /// The bytes received were not valid JSON.
    Decode(serde_json::Error),
    /// The daemon closed the connection before a complete response arrived.
    ConnectionClosed,
    /// The response grew beyond the configured maximum size.
    ResponseTooLarge(usize),
    /// The response is valid JSON but not the shape the operation requires.
    UnexpectedResponse(String),
    /// The daemon reported a key which could not be parsed.
    InvalidKey(KeyError),
}

impl fmt::Display for AdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminError::Io(err) => write!(f, "Admin socket error: {err}"),
            AdminError::Encode(err) => write!(f, "Failed to encode admin request: {err}"),
            AdminError::Decode(err) => write!(f, "Failed to decode admin response: {err}"),
            AdminError::ConnectionClosed => {
                write!(f, "Admin socket closed before a complete response was received")
            }
            AdminError::ResponseTooLarge(limit) => {
                write!(f, "Admin response exceeded the {limit} byte limit")
            }
            AdminError::UnexpectedResponse(reason) => {
                write!(f, "Unexpected admin response: {reason}")
            }
            AdminError::InvalidKey(err) => write!(f, "Admin response carried a bad key: {err}"),
        }
    }
}

impl Error for AdminError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AdminError::Io(err) => Some(err),
            AdminError::Encode(err) => Some(err),
            AdminError::Decode(err) => Some(err),
            AdminError::ConnectionClosed => None,
            AdminError::ResponseTooLarge(_) => None,
            AdminError::UnexpectedResponse(_) => None,
            AdminError::InvalidKey(err) => Some(err),
        }
    }
}

impl From<io::Error> for AdminError {
    fn from(err: io::Error) -> Self {
        AdminError::Io(err)
    }
}

impl From<KeyError> for AdminError {
    fn from(err: KeyError) -> Self {
        AdminError::InvalidKey(err)
    }
}
