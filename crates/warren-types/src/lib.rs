//! # warren-types
//!
//! Shared domain types used across the Warren workspace: peer identities,
//! the two hash widths used by the protocols, microsecond time arithmetic,
//! and the base32 text encoding for identities.

pub mod base32;
pub mod hash;
pub mod identity;
pub mod time;

pub use hash::{HashCode, ShortHash};
pub use identity::PeerId;
pub use time::{AbsoluteTime, RelativeTime};

/// Errors from parsing the textual forms of Warren types.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// A base32 string contained a character outside the alphabet.
    #[error("invalid base32 character {0:?} at offset {1}")]
    InvalidCharacter(char, usize),

    /// Decoded byte length did not match the expected width.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, ParseError>;
