//! Admin socket request and response envelopes.

use crate::key::PublicKey;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Admin methods used by the crawler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminMethod {
    /// Describe the local node. Takes no arguments.
    GetSelf,
    /// Fetch the self-reported nodeinfo of a remote node.
    GetNodeInfo,
    /// Ask a remote node to describe itself, including its routing coordinates.
    RemoteGetSelf,
    /// Ask a remote node for the keys of its direct peers.
    RemoteGetPeers,
    /// Ask a remote node for the keys in its DHT.
    RemoteGetDht,
}

impl AdminMethod {
    /// The wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminMethod::GetSelf => "getSelf",
            AdminMethod::GetNodeInfo => "getNodeInfo",
            AdminMethod::RemoteGetSelf => "debug_remoteGetSelf",
            AdminMethod::RemoteGetPeers => "debug_remoteGetPeers",
            AdminMethod::RemoteGetDht => "debug_remoteGetDHT",
        }
    }
}

impl fmt::Display for AdminMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request envelope written to the admin socket.
///
/// `keepalive` is always set. It is part of the protocol, but the client still
/// dials a fresh connection for every attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AdminRequest<'a> {
    keepalive: bool,
    request: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<Map<String, Value>>,
}

impl<'a> AdminRequest<'a> {
    /// Create a request for `method` with optional arguments.
    pub fn new(method: &'a str, arguments: Option<Map<String, Value>>) -> Self {
        AdminRequest {
            keepalive: true,
            request: method,
            arguments,
        }
    }

    /// Create a request whose only argument is a node key.
    pub fn keyed(method: &'a str, key: &PublicKey) -> Self {
        Self::new(method, Some(key_arguments(key)))
    }

    /// Serialize the request to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Build the `{"key": <hex>}` argument map.
pub fn key_arguments(key: &PublicKey) -> Map<String, Value> {
    let mut arguments = Map::new();
    arguments.insert("key".to_string(), Value::String(key.to_string()));
    arguments
}

/// A decoded admin response.
///
/// The payload lives in the top level `response` field. A response can be
/// well formed JSON and still report failure, which callers check with
/// [`Response::is_soft_failure`].
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    body: Value,
}

impl Response {
    /// Wrap a decoded response body.
    pub fn new(body: Value) -> Self {
        Response { body }
    }

    /// The full response body.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// The payload, if present and not null.
    pub fn payload(&self) -> Option<&Value> {
        self.body.get("response").filter(|payload| !payload.is_null())
    }

    /// Consume the response and return its payload, if present and not null.
    pub fn into_payload(self) -> Option<Value> {
        match self.body {
            Value::Object(mut body) => body.remove("response").filter(|payload| !payload.is_null()),
            _ => None,
        }
    }

    /// Whether the daemon failed to answer the query.
    ///
    /// True when the payload is missing or null, or is an object carrying an
    /// `error` entry. A payload of the wrong type is not a soft failure, it is
    /// returned to the caller to reject.
    pub fn is_soft_failure(&self) -> bool {
        match self.payload() {
            None => true,
            Some(Value::Object(payload)) => payload.contains_key("error"),
            Some(_) => false,
        }
    }

    /// Any error message the daemon attached, for logging.
    pub fn error_message(&self) -> Option<&str> {
        self.payload()
            .and_then(|payload| payload.get("error"))
            .or_else(|| self.body.get("error"))
            .and_then(Value::as_str)
    }
}

impl From<Value> for Response {
    fn from(body: Value) -> Self {
        Response::new(body)
    }
}
