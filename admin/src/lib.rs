//! Client for the Yggdrasil daemon's admin socket.
//!
//! Provides node identity ([`PublicKey`]), the address derivation used to
//! display nodes ([`Address`]), and a retrying JSON RPC client
//! ([`AdminClient`]) which dials a fresh connection for every attempt.
//!
//! # Example
//!
//! ```no_run
//! use yggdrasil_admin::{AdminClient, AdminConfiguration, Address};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AdminClient::unix(AdminConfiguration::default());
//! let key = client.get_self().await?;
//! println!("{key} is {}", Address::for_key(&key)?);
//!
//! let peers = client.remote_get_peers(&key).await?;
//! println!("{:?}", peers.payload());
//! # Ok(())
//! # }
//! ```

mod address;
mod client;
mod configuration;
mod error;
mod key;
mod message;
mod transport;

pub use address::{Address, AddressError, ADDRESS_PREFIX, ADDRESS_SIZE};
pub use client::AdminClient;
pub use configuration::{
    AdminConfiguration, DEFAULT_DIAL_TIMEOUT, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_RESPONSE_SIZE,
    DEFAULT_RESPONSE_TIMEOUT, DEFAULT_SOCKET_PATH,
};
pub use error::AdminError;
pub use key::{KeyError, PublicKey, PUBLIC_KEY_SIZE};
pub use message::{key_arguments, AdminMethod, AdminRequest, Response};
pub use transport::{read_response, write_request, Dialer};

#[cfg(unix)]
pub use transport::UnixDialer;
