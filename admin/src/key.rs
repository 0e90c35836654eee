//! Node identity on the Yggdrasil network.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Size of an ed25519 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Errors that can occur when parsing a public key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyError {
    /// The key text is not valid hex.
    InvalidHex(hex::FromHexError),
    /// The key decoded to the wrong number of bytes.
    InvalidLength(usize),
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::InvalidHex(err) => write!(f, "Public key is not valid hex: {err}"),
            KeyError::InvalidLength(len) => write!(
                f,
                "Public key must be {PUBLIC_KEY_SIZE} bytes, got {len} bytes"
            ),
        }
    }
}

impl std::error::Error for KeyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KeyError::InvalidHex(err) => Some(err),
            KeyError::InvalidLength(_) => None,
        }
    }
}

/// The ed25519 signing public key of a node.
///
/// Keys are the identity of nodes in the crawl graph and the argument of every
/// remote admin query. The text form is lowercase hex, which is what the
/// daemon reports and accepts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Create a key from raw bytes.
    pub const fn new(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        PublicKey(bytes)
    }

    /// Create a key from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; PUBLIC_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength(bytes.len()))?;
        Ok(PublicKey(bytes))
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }
}

impl FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(KeyError::InvalidHex)?;
        PublicKey::from_slice(&bytes)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
