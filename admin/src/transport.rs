//! Admin socket transport.
//!
//! The daemon speaks bare JSON over a stream socket: one request value is
//! written, one response value is read back. There is no length prefix, so
//! the reader accumulates bytes until they hold one complete JSON value.
//!
//! Dialing sits behind the [`Dialer`] trait so that clients can be driven by
//! in-memory streams in tests.

use crate::error::AdminError;
use serde_json::Value;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of each read from the socket.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Factory for fresh connections to the admin endpoint.
pub trait Dialer: Clone + Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Open a new connection.
    fn dial(&self) -> impl Future<Output = Result<Self::Stream, AdminError>> + Send;
}

/// Dialer for the daemon's local Unix socket.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct UnixDialer {
    path: PathBuf,
    timeout: Duration,
}

#[cfg(unix)]
impl UnixDialer {
    /// Create a dialer for the socket at `path`.
    pub fn new<P: Into<PathBuf>>(path: P, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }
}

#[cfg(unix)]
impl Dialer for UnixDialer {
    type Stream = tokio::net::UnixStream;

    fn dial(&self) -> impl Future<Output = Result<Self::Stream, AdminError>> + Send {
        let path = self.path.clone();
        let timeout = self.timeout;
        async move {
            let connect = async {
                tokio::net::UnixStream::connect(&path)
                    .await
                    .map_err(AdminError::Io)
            };
            with_timeout(timeout, connect, || format!("Dialing {} timed out", path.display()))
                .await
        }
    }
}

/// Run `future` under a deadline, expiry is an `io::ErrorKind::TimedOut` error.
pub(crate) async fn with_timeout<T, F, M>(
    duration: Duration,
    future: F,
    message: M,
) -> Result<T, AdminError>
where
    F: Future<Output = Result<T, AdminError>>,
    M: FnOnce() -> String,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(AdminError::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            message(),
        ))),
    }
}

/// Write a serialized request in full.
pub async fn write_request<W>(writer: &mut W, request: &[u8]) -> Result<(), AdminError>
where
    W: AsyncWrite + Unpin + Send,
{
    writer.write_all(request).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a single JSON value from the stream.
///
/// # Errors
///
/// * `AdminError::ConnectionClosed` - EOF arrived before the value was complete.
/// * `AdminError::ResponseTooLarge` - More than `max_size` bytes were buffered.
/// * `AdminError::Decode` - The bytes are not valid JSON.
pub async fn read_response<R>(reader: &mut R, max_size: usize) -> Result<Value, AdminError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut buffer = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(AdminError::ConnectionClosed);
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.len() > max_size {
            return Err(AdminError::ResponseTooLarge(max_size));
        }

        let mut values = serde_json::Deserializer::from_slice(&buffer).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) => return Ok(value),
            // Partial value, keep reading.
            Some(Err(e)) if e.is_eof() => continue,
            Some(Err(e)) => return Err(AdminError::Decode(e)),
            // Only whitespace so far.
            None => continue,
        }
    }
}
