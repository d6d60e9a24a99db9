//! The gossip Bloom filter: 64 bytes, 5 hash functions.
//!
//! Each peer entry carries one of these to remember which neighbours have
//! already received that peer's descriptor. The layout (512 bits, 5
//! indexes by double hashing over SHA-256) is fixed; filters are never
//! exchanged on the wire but two implementations gossiping against the
//! same state must agree on membership.

use sha2::{Digest, Sha256};

/// Filter width in bytes.
pub const BLOOM_SIZE: usize = 64;

/// Number of hash functions.
pub const BLOOM_HASHES: usize = 5;

const BLOOM_BITS: u32 = (BLOOM_SIZE * 8) as u32;

/// A fixed-size Bloom filter over 32-byte identifiers.
#[derive(Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: [u8; BLOOM_SIZE],
}

impl BloomFilter {
    pub fn new() -> Self {
        Self {
            bits: [0u8; BLOOM_SIZE],
        }
    }

    /// Bit indexes for `key`: double hashing over one SHA-256 digest.
    fn indexes(key: &[u8]) -> [u32; BLOOM_HASHES] {
        let digest = Sha256::digest(key);
        let h1 = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        let h2 = u32::from_be_bytes([digest[4], digest[5], digest[6], digest[7]]) | 1;
        let mut out = [0u32; BLOOM_HASHES];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = h1.wrapping_add((i as u32).wrapping_mul(h2)) % BLOOM_BITS;
        }
        out
    }

    pub fn insert(&mut self, key: &[u8]) {
        for index in Self::indexes(key) {
            self.bits[(index / 8) as usize] |= 1 << (index % 8);
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        Self::indexes(key)
            .iter()
            .all(|index| self.bits[(index / 8) as usize] & (1 << (index % 8)) != 0)
    }

    /// Reset to empty (used on rotation).
    pub fn clear(&mut self) {
        self.bits = [0u8; BLOOM_SIZE];
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set_bits: u32 = self.bits.iter().map(|b| b.count_ones()).sum();
        write!(f, "BloomFilter({set_bits}/{BLOOM_BITS} bits)")
    }
}
