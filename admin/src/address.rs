//! Yggdrasil network addresses derived from node keys.
//!
//! An address is a lossy projection of a [`PublicKey`] used for display. The
//! encoding compresses the run of leading 1-bits in the bitwise inverse of the
//! key into a single counter byte, so keys with many leading zero bits yield
//! addresses that carry more of the remaining key material.
//!
//! ```text
//! | prefix (0x02) | leading ones | inverted key bits after the first 0 ... |
//! |    1 byte     |    1 byte    |               14 bytes                  |
//! ```

use crate::key::{PublicKey, PUBLIC_KEY_SIZE};
use std::fmt;
use std::net::Ipv6Addr;

/// Size of an address in bytes.
pub const ADDRESS_SIZE: usize = 16;

/// Network prefix every node address begins with.
pub const ADDRESS_PREFIX: u8 = 0x02;

const KEY_BITS: usize = PUBLIC_KEY_SIZE * 8;

/// Errors that can occur when deriving an address from key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
    /// The key material is not the size of an ed25519 public key.
    InvalidKeyLength(usize),
    /// The inverted key is all 1-bits, so the leading ones counter does not fit
    /// in a byte and there is no terminating 0-bit.
    TooManyLeadingOnes,
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::InvalidKeyLength(len) => write!(
                f,
                "Cannot derive address from {len} bytes of key material, expected {PUBLIC_KEY_SIZE}"
            ),
            AddressError::TooManyLeadingOnes => {
                write!(f, "Leading ones count of key overflows the address encoding")
            }
        }
    }
}

impl std::error::Error for AddressError {}

/// A 128-bit node address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// Derive the address of a node from its public key.
    ///
    /// # Errors
    ///
    /// * `AddressError::TooManyLeadingOnes` - The key is all zero bits.
    pub fn for_key(key: &PublicKey) -> Result<Self, AddressError> {
        Self::from_key_bytes(key.as_bytes())
    }

    /// Derive an address from raw key material.
    ///
    /// # Errors
    ///
    /// * `AddressError::InvalidKeyLength` - The input is not exactly 32 bytes.
    /// * `AddressError::TooManyLeadingOnes` - The input is all zero bits.
    pub fn from_key_bytes(key: &[u8]) -> Result<Self, AddressError> {
        if key.len() != PUBLIC_KEY_SIZE {
            return Err(AddressError::InvalidKeyLength(key.len()));
        }

        let mut inverted = [0u8; PUBLIC_KEY_SIZE];
        for (dst, src) in inverted.iter_mut().zip(key) {
            *dst = !src;
        }

        let mut ones = 0usize;
        for byte in inverted {
            ones += byte.leading_ones() as usize;
            if byte != 0xff {
                break;
            }
        }
        if ones >= KEY_BITS {
            return Err(AddressError::TooManyLeadingOnes);
        }
        let ones = u8::try_from(ones).map_err(|_| AddressError::TooManyLeadingOnes)?;

        let mut address = [0u8; ADDRESS_SIZE];
        address[0] = ADDRESS_PREFIX;
        address[1] = ones;

        // Skip the ones and the 0-bit which terminates them.
        let start = usize::from(ones) + 1;
        for (i, slot) in address[2..].iter_mut().enumerate() {
            match byte_at_bit(&inverted, start + i * 8) {
                Some(byte) => *slot = byte,
                None => break,
            }
        }

        Ok(Address(address))
    }

    /// The raw address bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Number of leading 1-bits in the inverted key.
    pub fn leading_ones(&self) -> u8 {
        self.0[1]
    }
}

/// Read the whole byte starting at bit offset `bit`, MSB first.
///
/// Returns `None` when fewer than 8 bits remain.
fn byte_at_bit(bytes: &[u8], bit: usize) -> Option<u8> {
    if bit + 8 > bytes.len() * 8 {
        return None;
    }
    let index = bit / 8;
    let shift = bit % 8;
    if shift == 0 {
        Some(bytes[index])
    } else {
        Some((bytes[index] << shift) | (bytes[index + 1] >> (8 - shift)))
    }
}

impl From<Address> for Ipv6Addr {
    fn from(address: Address) -> Self {
        Ipv6Addr::from(address.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Ipv6Addr::from(*self))
    }
}
