//! # warren-adapters
//!
//! Interfaces to the external collaborators of the core: the DHT, the
//! namestore, the transport service hosting the communicator, the NAT
//! monitor, and the statistics service. Each collaborator is a trait the
//! core calls (or is called through); the in-memory implementations back
//! tests and the daemon's standalone mode.

pub mod communicator;
pub mod connectivity;
pub mod dht;
pub mod namecache;
pub mod namestore;
pub mod nat;
pub mod statistics;

pub use communicator::CommunicatorHost;
pub use connectivity::ConnectivityControl;
pub use dht::Dht;
pub use namecache::Namecache;
pub use namestore::Namestore;
pub use nat::{NatEvent, NatMonitor};
pub use statistics::Statistics;

/// Error types for adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// No entry for the requested key.
    #[error("not found")]
    NotFound,

    /// A non-empty record set already exists; first writer wins.
    #[error("already exists")]
    AlreadyExists,

    /// The collaborator did not answer in time.
    #[error("operation timed out")]
    Timeout,

    /// The collaborator misbehaved.
    #[error("adapter failure: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AdapterError>;
