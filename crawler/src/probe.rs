//! Probing a single node for its crawl record.
//!
//! This module provides the [`NodeProbe`] trait which the crawl session drives,
//! and [`AdminProbe`], the implementation backed by the daemon's admin socket.
//! The trait exists so the session can be exercised without a daemon.

use crate::error::CrawlError;
use crate::record::NodeRecord;
use log::debug;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use yggdrasil_admin::{AdminClient, AdminMethod, Dialer, PublicKey, Response};

/// Something that can build the record of a node from its key.
pub trait NodeProbe: Send + Sync + 'static {
    /// Probe a node.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(NodeRecord))` - The node answered every query.
    /// * `Ok(None)` - The node did not answer, answered with the wrong shape, or
    ///   had nothing to report. It is left out of the crawl.
    /// * `Err(CrawlError)` - A failure which aborts the whole crawl.
    fn probe(
        &self,
        key: &PublicKey,
    ) -> impl Future<Output = Result<Option<NodeRecord>, CrawlError>> + Send;
}

/// Reason a query response was not usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Rejection {
    /// Still a soft failure once the client's attempts ran out.
    Unanswered(Option<String>),
    /// Answered, but not with the expected shape.
    Malformed(&'static str),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Unanswered(Some(reason)) => write!(f, "unanswered ({reason})"),
            Rejection::Unanswered(None) => write!(f, "unanswered"),
            Rejection::Malformed(reason) => write!(f, "malformed: {reason}"),
        }
    }
}

/// The entries of a payload, which must be an object of objects.
fn entries(response: &Response) -> Result<Vec<&Map<String, Value>>, Rejection> {
    if response.is_soft_failure() {
        return Err(Rejection::Unanswered(
            response.error_message().map(str::to_string),
        ));
    }
    let payload = response
        .payload()
        .and_then(Value::as_object)
        .ok_or(Rejection::Malformed("payload is not an object"))?;
    payload
        .values()
        .map(|entry| {
            entry
                .as_object()
                .ok_or(Rejection::Malformed("entry is not an object"))
        })
        .collect()
}

/// Nodeinfo from a `getNodeInfo` response, the last entry wins.
pub(crate) fn extract_nodeinfo(response: &Response) -> Result<Option<Map<String, Value>>, Rejection> {
    Ok(entries(response)?.into_iter().last().cloned())
}

/// Coordinates from a `debug_remoteGetSelf` response.
pub(crate) fn extract_coords(response: &Response) -> Result<Option<Value>, Rejection> {
    Ok(entries(response)?
        .into_iter()
        .filter_map(|entry| entry.get("coords"))
        .last()
        .cloned())
}

/// Key list from a `debug_remoteGetPeers` or `debug_remoteGetDHT` response.
pub(crate) fn extract_keys(response: &Response) -> Result<Option<Vec<PublicKey>>, Rejection> {
    let mut keys = None;
    for entry in entries(response)? {
        let Some(list) = entry.get("keys") else {
            continue;
        };
        let list = list
            .as_array()
            .ok_or(Rejection::Malformed("keys is not an array"))?;
        let parsed = list
            .iter()
            .map(|key| {
                key.as_str()
                    .ok_or(Rejection::Malformed("key is not a string"))?
                    .parse::<PublicKey>()
                    .map_err(|_| Rejection::Malformed("key is not a valid public key"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        keys = Some(parsed);
    }
    Ok(keys)
}

/// Log a rejected response and turn it into an abandoned probe.
fn accept<T>(key: &PublicKey, method: AdminMethod, result: Result<T, Rejection>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(rejection) => {
            debug!("Abandoning {key}, {method} was {rejection}");
            None
        }
    }
}

/// Probe backed by the admin socket.
///
/// Issues `getNodeInfo`, `debug_remoteGetSelf`, `debug_remoteGetPeers` and
/// `debug_remoteGetDHT` in that order, stopping at the first unusable response.
#[derive(Debug, Clone)]
pub struct AdminProbe<D> {
    client: AdminClient<D>,
}

impl<D: Dialer> AdminProbe<D> {
    /// Create a probe which queries through `client`.
    pub fn new(client: AdminClient<D>) -> Self {
        Self { client }
    }

    /// The underlying admin client.
    pub fn client(&self) -> &AdminClient<D> {
        &self.client
    }
}

impl<D: Dialer> NodeProbe for AdminProbe<D> {
    fn probe(
        &self,
        key: &PublicKey,
    ) -> impl Future<Output = Result<Option<NodeRecord>, CrawlError>> + Send {
        async move {
            let response = self.client.get_node_info(key).await?;
            let Some(nodeinfo) = accept(key, AdminMethod::GetNodeInfo, extract_nodeinfo(&response))
            else {
                return Ok(None);
            };

            let response = self.client.remote_get_self(key).await?;
            let Some(coords) = accept(key, AdminMethod::RemoteGetSelf, extract_coords(&response))
            else {
                return Ok(None);
            };

            let response = self.client.remote_get_peers(key).await?;
            let Some(peers) = accept(key, AdminMethod::RemoteGetPeers, extract_keys(&response))
            else {
                return Ok(None);
            };

            let response = self.client.remote_get_dht(key).await?;
            let Some(dht) = accept(key, AdminMethod::RemoteGetDht, extract_keys(&response)) else {
                return Ok(None);
            };

            let mut record = NodeRecord::new(*key)?;
            record.nodeinfo = nodeinfo;
            record.coords = coords;
            record.peers = peers;
            record.dht = dht;

            if record.is_empty() {
                debug!("Abandoning {key}, nothing was reported");
                return Ok(None);
            }
            Ok(Some(record))
        }
    }
}
