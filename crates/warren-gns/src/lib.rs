//! # warren-gns
//!
//! The cryptographic naming layer: label-scoped record sets published as
//! encrypted, signed blocks under per-label derived keys.
//!
//! - [`records`] — record codec, comparison, expiration and shadow
//!   semantics
//! - [`block`] — block creation, verification, decryption and DHT query
//!   derivation
//! - [`revocation`] — signed, proof-of-work-backed zone revocation

pub mod block;
pub mod records;
pub mod revocation;

/// Ceiling on the number of records in one block.
pub const MAX_RD_COUNT: usize = 2048;

/// Ceiling on a block's encrypted payload, in bytes (62 KiB).
pub const MAX_BLOCK_SIZE: usize = 62 * 1024;

/// Error types for the naming layer.
///
/// Authentication, size and malformed-field failures are all soft: callers
/// get an error and no partial records. A zone-key mismatch is
/// indistinguishable from ciphertext tampering.
#[derive(Debug, thiserror::Error)]
pub enum GnsError {
    /// A length field or count did not match the available bytes.
    #[error("malformed record data: {0}")]
    WireFormat(String),

    /// Serialized records exceed the block payload ceiling.
    #[error("record set too large: {size} bytes, max {max}")]
    TooLarge { size: usize, max: usize },

    /// More records than [`MAX_RD_COUNT`].
    #[error("too many records: {count}, max {max}")]
    TooManyRecords { count: usize, max: usize },

    /// Signature or AEAD verification failed.
    #[error("block authentication failed")]
    Authentication,

    /// An underlying cryptographic operation failed.
    #[error(transparent)]
    Crypto(#[from] warren_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, GnsError>;
