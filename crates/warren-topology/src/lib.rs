//! # warren-topology
//!
//! The peer-selection controller: consumes a friends file, computes
//! per-peer connection strengths for the bandwidth allocator, and gossips
//! peer descriptors (HELLOs) with a Bloom-filtered anti-entropy loop.
//!
//! - [`bloom`] — the 64-byte gossip Bloom filter
//! - [`friends`] — friends-file parsing
//! - [`controller`] — peer map, strength computation, HELLO scheduling

pub mod bloom;
pub mod controller;
pub mod friends;

use warren_types::RelativeTime;

/// Minimum spacing between descriptor advertisements to one receiver.
pub const HELLO_ADVERTISEMENT_MIN_FREQUENCY: RelativeTime = RelativeTime::from_minutes(5);

/// Gossip Bloom filters rotate this often, re-permitting old repeats.
pub const FILTER_EXPIRATION: RelativeTime = RelativeTime::from_hours(4);

/// Error types for the topology controller.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// The friends file exists but could not be read.
    #[error("friends file unreadable: {0}")]
    FriendsFileUnreadable(String),
}

pub type Result<T> = std::result::Result<T, TopologyError>;
