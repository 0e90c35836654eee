//! Crawled node records.

use serde::Serialize;
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use yggdrasil_admin::{Address, AddressError, PublicKey};

/// Everything learned about one node during a crawl.
///
/// Fields a node did not report are left out of the JSON form. The key is not
/// serialized as part of the record, the report uses it as the entry name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    /// Key of the node.
    #[serde(skip)]
    pub key: PublicKey,
    /// Display address derived from the key.
    pub address: String,
    /// Self-reported nodeinfo.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodeinfo: Option<Map<String, Value>>,
    /// Routing coordinates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coords: Option<Value>,
    /// Keys of directly connected peers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<PublicKey>>,
    /// Keys in the node's DHT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dht: Option<Vec<PublicKey>>,
    /// Unix time in seconds when the probe completed.
    pub time: u64,
}

impl NodeRecord {
    /// Create an empty record for `key`, stamped with the current time.
    ///
    /// # Errors
    ///
    /// * `AddressError` - The key has no address encoding.
    pub fn new(key: PublicKey) -> Result<Self, AddressError> {
        let address = Address::for_key(&key)?;
        Ok(NodeRecord {
            key,
            address: address.to_string(),
            nodeinfo: None,
            coords: None,
            peers: None,
            dht: None,
            time: unix_time(),
        })
    }

    /// Whether any queried field was filled in.
    pub fn is_empty(&self) -> bool {
        self.nodeinfo.is_none() && self.coords.is_none() && self.peers.is_none() && self.dht.is_none()
    }

    /// Keys of peers and DHT entries, the nodes to crawl next.
    pub fn neighbours(&self) -> impl Iterator<Item = &PublicKey> {
        self.peers
            .iter()
            .flatten()
            .chain(self.dht.iter().flatten())
    }
}

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
