//! Zone revocation.
//!
//! A zone owner can permanently invalidate a zone key by publishing a
//! revocation statement: the zone key signed by itself under the
//! revocation purpose, plus a proof of work that makes flooding the
//! network with bogus statements expensive. Resolvers keep a set of
//! revoked zones and refuse to resolve under them.
//!
//! The statement is self-contained: anyone can verify it with no context
//! beyond the difficulty parameter.

use sha2::{Digest, Sha512};

use warren_crypto::eddsa::{Signature, SignaturePurpose};
use warren_crypto::zone::{ZonePrivateKey, ZonePublicKey};

use crate::{GnsError, Result};

/// Default proof-of-work difficulty in leading zero bits.
pub const DEFAULT_DIFFICULTY: u32 = 22;

/// A signed, proof-of-work-backed revocation of one zone key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevocationStatement {
    /// The zone being revoked.
    pub zone: ZonePublicKey,
    /// Signature over the zone key by the zone key itself.
    pub signature: Signature,
    /// Nonce satisfying the proof of work.
    pub pow_nonce: u64,
}

/// Count leading zero bits of the work hash for `(nonce, zone)`.
fn pow_zero_bits(nonce: u64, zone: &ZonePublicKey) -> u32 {
    let mut input = [0u8; 8 + 32];
    input[..8].copy_from_slice(&nonce.to_be_bytes());
    input[8..].copy_from_slice(zone.as_bytes());
    let digest = Sha512::digest(input);

    let mut bits = 0u32;
    for byte in digest {
        if byte == 0 {
            bits += 8;
            continue;
        }
        bits += byte.leading_zeros();
        break;
    }
    bits
}

impl RevocationStatement {
    /// Create a revocation for `zone`, searching for a nonce that meets
    /// `difficulty`.
    ///
    /// The search is linear in expected 2^difficulty hash evaluations;
    /// callers run it off the hot path.
    pub fn create(zone: &ZonePrivateKey, difficulty: u32) -> Result<Self> {
        let zone_pub = zone.public_key();
        let signature = zone.sign(SignaturePurpose::ZoneRevocation, zone_pub.as_bytes())?;

        let mut pow_nonce = 0u64;
        while pow_zero_bits(pow_nonce, &zone_pub) < difficulty {
            pow_nonce = pow_nonce
                .checked_add(1)
                .ok_or(GnsError::WireFormat("proof-of-work search exhausted".into()))?;
        }

        Ok(Self {
            zone: zone_pub,
            signature,
            pow_nonce,
        })
    }

    /// Verify the signature and the proof of work at `difficulty`.
    pub fn verify(&self, difficulty: u32) -> Result<()> {
        if pow_zero_bits(self.pow_nonce, &self.zone) < difficulty {
            return Err(GnsError::Authentication);
        }
        self.zone
            .verify(
                SignaturePurpose::ZoneRevocation,
                self.zone.as_bytes(),
                &self.signature,
            )
            .map_err(|_| GnsError::Authentication)
    }

    /// Wire form: `zone[32] signature[64] pow_nonce_be[8]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 64 + 8);
        out.extend_from_slice(self.zone.as_bytes());
        out.extend_from_slice(&self.signature.to_bytes());
        out.extend_from_slice(&self.pow_nonce.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 + 64 + 8 {
            return Err(GnsError::WireFormat(format!(
                "revocation size {} != 104",
                bytes.len()
            )));
        }
        let mut zone = [0u8; 32];
        zone.copy_from_slice(&bytes[..32]);
        let mut sig = [0u8; 64];
        sig.copy_from_slice(&bytes[32..96]);
        let pow_nonce = u64::from_be_bytes(
            bytes[96..104]
                .try_into()
                .map_err(|_| GnsError::WireFormat("pow nonce".into()))?,
        );
        Ok(Self {
            zone: ZonePublicKey::from_bytes(zone),
            signature: Signature::from_bytes(&sig),
            pow_nonce,
        })
    }
}

/// The set of revoked zones a resolver consults.
pub struct RevocationStore {
    revoked: std::collections::HashSet<[u8; 32]>,
    difficulty: u32,
}

impl Default for RevocationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RevocationStore {
    pub fn new() -> Self {
        Self {
            revoked: std::collections::HashSet::new(),
            difficulty: DEFAULT_DIFFICULTY,
        }
    }

    pub fn with_difficulty(difficulty: u32) -> Self {
        Self {
            revoked: std::collections::HashSet::new(),
            difficulty,
        }
    }

    /// Admit a statement after verifying it. Idempotent.
    pub fn add(&mut self, statement: &RevocationStatement) -> Result<()> {
        statement.verify(self.difficulty)?;
        if self.revoked.insert(statement.zone.to_bytes()) {
            tracing::info!(zone = ?statement.zone, "zone revoked");
        }
        Ok(())
    }

    pub fn is_revoked(&self, zone: &ZonePublicKey) -> bool {
        self.revoked.contains(zone.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}
