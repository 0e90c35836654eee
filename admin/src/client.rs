//! Retrying admin RPC client.

use crate::configuration::AdminConfiguration;
use crate::error::AdminError;
use crate::key::PublicKey;
use crate::message::{key_arguments, AdminMethod, AdminRequest, Response};
use crate::transport::{read_response, with_timeout, write_request, Dialer};
use log::{debug, trace};
use serde_json::{Map, Value};

#[cfg(unix)]
use crate::transport::UnixDialer;

/// Client for the daemon's admin endpoint.
///
/// Every attempt dials a fresh connection, writes one request and reads one
/// response. Connections are never reused.
///
/// # Failure model
///
/// * **Soft failure** - The response arrived but carries no payload, a null
///   payload, or an embedded error. The call is retried up to
///   `max_attempts` times, after which the last response is returned as-is.
/// * **Hard failure** - Dialing, writing, reading or decoding failed. The
///   error is returned immediately without retrying, the daemon being
///   unreachable is not something a retry fixes.
#[derive(Debug, Clone)]
pub struct AdminClient<D> {
    dialer: D,
    config: AdminConfiguration,
}

#[cfg(unix)]
impl AdminClient<UnixDialer> {
    /// Create a client for the Unix socket named in the configuration.
    pub fn unix(config: AdminConfiguration) -> Self {
        let dialer = UnixDialer::new(config.socket_path.clone(), config.dial_timeout);
        Self::new(dialer, config)
    }
}

impl<D: Dialer> AdminClient<D> {
    /// Create a client which opens connections with `dialer`.
    pub fn new(dialer: D, config: AdminConfiguration) -> Self {
        Self { dialer, config }
    }

    /// The client configuration.
    pub fn config(&self) -> &AdminConfiguration {
        &self.config
    }

    /// Call an admin method.
    ///
    /// # Arguments
    ///
    /// * `method` - Wire name of the method.
    /// * `arguments` - Method arguments, omitted from the request if `None`.
    ///
    /// # Returns
    ///
    /// * `Ok(Response)` - The first response which is not a soft failure, or the
    ///   last response once the attempts are used up.
    /// * `Err(AdminError)` - A hard failure on any attempt.
    pub async fn call(
        &self,
        method: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<Response, AdminError> {
        let request = AdminRequest::new(method, arguments)
            .to_bytes()
            .map_err(AdminError::Encode)?;

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let response = self.exchange(&request).await?;
            if !response.is_soft_failure() || attempt >= max_attempts {
                return Ok(response);
            }
            debug!(
                "Soft failure from {method} (attempt {attempt}/{max_attempts}): {}",
                response.error_message().unwrap_or("no payload")
            );
            attempt += 1;
        }
    }

    /// Call a method whose only argument is a node key.
    pub async fn query(&self, method: AdminMethod, key: &PublicKey) -> Result<Response, AdminError> {
        self.call(method.as_str(), Some(key_arguments(key))).await
    }

    /// Resolve the key of the local node.
    ///
    /// # Errors
    ///
    /// * `AdminError::UnexpectedResponse` - No string `key` in the payload, even
    ///   after retries.
    /// * `AdminError::InvalidKey` - The reported key does not parse.
    pub async fn get_self(&self) -> Result<PublicKey, AdminError> {
        let response = self.call(AdminMethod::GetSelf.as_str(), None).await?;
        let key = response
            .payload()
            .and_then(|payload| payload.get("key"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdminError::UnexpectedResponse(format!(
                    "getSelf returned no key: {}",
                    response.error_message().unwrap_or("missing field")
                ))
            })?;
        Ok(key.parse::<PublicKey>()?)
    }

    /// Fetch the nodeinfo of a remote node.
    pub async fn get_node_info(&self, key: &PublicKey) -> Result<Response, AdminError> {
        self.query(AdminMethod::GetNodeInfo, key).await
    }

    /// Ask a remote node to describe itself.
    pub async fn remote_get_self(&self, key: &PublicKey) -> Result<Response, AdminError> {
        self.query(AdminMethod::RemoteGetSelf, key).await
    }

    /// Ask a remote node for its direct peers.
    pub async fn remote_get_peers(&self, key: &PublicKey) -> Result<Response, AdminError> {
        self.query(AdminMethod::RemoteGetPeers, key).await
    }

    /// Ask a remote node for its DHT entries.
    pub async fn remote_get_dht(&self, key: &PublicKey) -> Result<Response, AdminError> {
        self.query(AdminMethod::RemoteGetDht, key).await
    }

    /// One attempt: dial, write the request, read the response.
    async fn exchange(&self, request: &[u8]) -> Result<Response, AdminError> {
        let mut stream = self.dialer.dial().await?;
        let max_size = self.config.max_response_size;

        let exchange = async {
            write_request(&mut stream, request).await?;
            read_response(&mut stream, max_size).await
        };
        let body = with_timeout(self.config.response_timeout, exchange, || {
            "Timed out waiting for admin response".to_string()
        })
        .await?;

        trace!("Admin response: {body}");
        Ok(Response::new(body))
    }
}

#[cfg(test)]
pub mod test_utils {
    //! Test utilities for driving an [`AdminClient`] with scripted streams.

    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tokio_test::io::{Builder as MockIoBuilder, Mock};

    /// Dialer handing out pre-scripted mock streams in order.
    #[derive(Clone, Default)]
    pub struct MockDialer {
        streams: Arc<Mutex<VecDeque<Result<Mock, io::ErrorKind>>>>,
    }

    impl MockDialer {
        pub fn new() -> Self {
            Self::default()
        }

        /// Script a connection which expects `request` and answers with `response`.
        pub fn add_exchange(&self, request: &[u8], response: &[u8]) {
            let stream = MockIoBuilder::new().write(request).read(response).build();
            self.streams.lock().unwrap().push_back(Ok(stream));
        }

        /// Script a connection with a hand-built stream.
        pub fn add_stream(&self, stream: Mock) {
            self.streams.lock().unwrap().push_back(Ok(stream));
        }

        /// Script a dial which fails.
        pub fn add_dial_error(&self, kind: io::ErrorKind) {
            self.streams.lock().unwrap().push_back(Err(kind));
        }

        /// Number of scripted dials not yet made.
        pub fn remaining(&self) -> usize {
            self.streams.lock().unwrap().len()
        }
    }

    impl Dialer for MockDialer {
        type Stream = Mock;

        fn dial(&self) -> impl std::future::Future<Output = Result<Mock, AdminError>> + Send {
            let next = self.streams.lock().unwrap().pop_front();
            async move {
                match next {
                    Some(Ok(stream)) => Ok(stream),
                    Some(Err(kind)) => Err(AdminError::Io(io::Error::new(kind, "scripted dial error"))),
                    None => Err(AdminError::Io(io::Error::other("No mock stream available"))),
                }
            }
        }
    }
}
