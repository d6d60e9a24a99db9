//! Peer identities.
//!
//! A peer is named by its 32-byte Ed25519 verifying key. The textual form
//! (friends file, logs) is unpadded base32.

use std::fmt;
use std::str::FromStr;

use crate::{base32, ParseError};

/// A peer identity: the raw bytes of an Ed25519 verifying key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&base32::encode(&self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight leading characters are enough to tell peers apart in logs.
        let full = base32::encode(&self.0);
        write!(f, "PeerId({})", &full[..8.min(full.len())])
    }
}

impl FromStr for PeerId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = base32::decode(s)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            ParseError::InvalidLength {
                expected: 32,
                actual: v.len(),
            }
        })?;
        Ok(Self(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_parse_roundtrip() {
        let id = PeerId::from_bytes([7u8; 32]);
        let text = id.to_string();
        let back: PeerId = text.parse().expect("parse");
        assert_eq!(id, back);
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let short = crate::base32::encode(&[1u8; 16]);
        let result: Result<PeerId, _> = short.parse();
        assert!(matches!(
            result,
            Err(ParseError::InvalidLength {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let result: Result<PeerId, _> = "not base32 at all!".parse();
        assert!(result.is_err());
    }
}
