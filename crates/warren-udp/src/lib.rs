//! # warren-udp
//!
//! The UDP transport communicator: authenticated key exchange over bare
//! datagrams, symmetric rekeying, and a small ACK/flow protocol.
//!
//! - [`wire`] — the five datagram formats and their codecs
//! - [`secret`] — shared secrets and per-sequence key material
//! - [`session`] — the sans-I/O session core (KX, boxes, ACKs, timeouts)
//! - [`address`] — bind specifications and `udp-…` address strings
//! - [`broadcast`] — LAN discovery scheduling
//! - [`io`] — the tokio socket driver
//!
//! The session core performs no I/O: every entry point returns
//! [`session::Action`] values that the driver turns into socket writes and
//! host callbacks. UDP loses and reorders freely; the communicator
//! guarantees authenticity and replay suppression per datagram, never
//! delivery or ordering. Those come from the layers above.

pub mod address;
pub mod broadcast;
pub mod io;
pub mod secret;
pub mod session;
pub mod wire;

use warren_types::RelativeTime;

/// Generate fresh key cache entries when fewer than this many are
/// outstanding.
pub const KCN_THRESHOLD: u32 = 92;

/// Top the key cache up to this many outstanding entries.
pub const KCN_TARGET: u32 = 128;

/// Widest allowed gap between the oldest and newest cached sequence of one
/// secret.
pub const MAX_SQN_DELTA: u32 = 160;

/// Ceiling on live shared secrets per peer; the least recently used is
/// evicted beyond this.
pub const MAX_SECRETS: usize = 128;

/// Rekey after this many payload bytes under one secret (4 GiB).
pub const REKEY_MAX_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Rekey after a secret has been in use this long.
pub const REKEY_TIME_INTERVAL: RelativeTime = RelativeTime::from_hours(24);

/// Evict peer state after this long without traffic.
pub const PROTO_QUEUE_TIMEOUT: RelativeTime = RelativeTime::from_minutes(1);

/// How long an advertised address stays valid.
pub const ADDRESS_VALIDITY_PERIOD: RelativeTime = RelativeTime::from_hours(1);

/// Nominal LAN broadcast period; each interface jitters around it.
pub const BROADCAST_FREQUENCY: RelativeTime = RelativeTime::from_minutes(1);

/// Error types for the communicator.
#[derive(Debug, thiserror::Error)]
pub enum UdpError {
    /// A datagram or field did not parse.
    #[error("malformed datagram: {0}")]
    WireFormat(String),

    /// GCM tag or signature verification failed.
    #[error("datagram authentication failed")]
    Authentication,

    /// Out of ack credit, sequence budget, or secret slots.
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(&'static str),

    /// A bind specification or option was unusable.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// No session state for the peer.
    #[error("unknown peer")]
    UnknownPeer,

    /// An invariant the session core maintains was violated.
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),

    /// An underlying cryptographic operation failed.
    #[error(transparent)]
    Crypto(#[from] warren_crypto::CryptoError),

    /// Socket-level failure.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, UdpError>;
