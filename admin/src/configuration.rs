//! Admin client configuration types and constants.

use std::path::PathBuf;
use std::time::Duration;

/// Well-known location of the daemon's admin socket.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/yggdrasil.sock";

/// Default timeout for dialing the admin socket.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(1);

/// Default timeout for a single request and response exchange.
///
/// Remote queries are forwarded across the network by the daemon, so this is
/// far longer than the dial timeout.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of attempts for a call whose response is a soft failure.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Default cap on the size of a single response.
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// Configuration used to build an [`AdminClient`](crate::AdminClient).
#[derive(Debug, Clone)]
pub struct AdminConfiguration {
    /// Path of the admin Unix socket.
    pub socket_path: PathBuf,
    /// Timeout for establishing a connection.
    pub dial_timeout: Duration,
    /// Timeout for writing a request and reading its response.
    pub response_timeout: Duration,
    /// Attempts made for a call before a soft failure is returned as-is.
    pub max_attempts: usize,
    /// Largest response accepted, in bytes.
    pub max_response_size: usize,
}

impl Default for AdminConfiguration {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
        }
    }
}

impl AdminConfiguration {
    /// Set the admin socket path.
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_socket_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.socket_path = path.into();
        self
    }

    /// Set the timeout for dialing the socket.
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Set the timeout for a request and response exchange.
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set how many attempts are made for calls that soft fail.
    ///
    /// Values below one are treated as one.
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the largest response accepted, in bytes.
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }
}
