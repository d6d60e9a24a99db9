//! The two hash widths used on the wire.
//!
//! - [`HashCode`]: 64-byte SHA-512 digest. Names things globally: DHT query
//!   keys and broadcast address hashes.
//! - [`ShortHash`]: 32-byte value. Identifies key material: box key
//!   identifiers (`kid`) and shared-secret names (`cmac`).

use sha2::{Digest, Sha256, Sha512};

/// A 64-byte SHA-512 hash code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashCode(pub [u8; 64]);

/// A 32-byte short hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortHash(pub [u8; 32]);

impl HashCode {
    /// SHA-512 of `data`.
    pub fn digest(data: &[u8]) -> Self {
        let mut out = [0u8; 64];
        out.copy_from_slice(&Sha512::digest(data));
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 64] {
        self.0
    }

    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }
}

impl ShortHash {
    /// SHA-256 of `data`.
    pub fn digest(data: &[u8]) -> Self {
        let mut out = [0u8; 32];
        out.copy_from_slice(&Sha256::digest(data));
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for HashCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HashCode({})", crate::base32::encode(&self.0[..8]))
    }
}

impl std::fmt::Debug for ShortHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ShortHash({})", crate::base32::encode(&self.0[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha512_vector() {
        // SHA-512("abc"), FIPS 180-2 appendix C.
        let h = HashCode::digest(b"abc");
        let expected = hex::decode(
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f",
        )
        .expect("valid hex");
        assert_eq!(h.as_bytes().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_sha256_vector() {
        // SHA-256("abc"), FIPS 180-2 appendix B.
        let h = ShortHash::digest(b"abc");
        let expected = hex::decode(
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
        )
        .expect("valid hex");
        assert_eq!(h.as_bytes().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_distinct_inputs_distinct_hashes() {
        assert_ne!(ShortHash::digest(b"a"), ShortHash::digest(b"b"));
        assert_ne!(HashCode::digest(b"a"), HashCode::digest(b"b"));
    }
}
