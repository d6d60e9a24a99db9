//! Signed, encrypted record blocks and DHT query derivation.
//!
//! A block carries one label's record set, AES-256-GCM encrypted under
//! keys only the zone key holder and anyone who knows `(Z_pub, label)` can
//! derive, and signed by the label-derived private key. The DHT key for
//! `(Z, L)` is the SHA-512 of the derived public key, so storage nodes
//! learn neither the zone nor the label.
//!
//! ## Wire format
//!
//! ```text
//! derived_key[32] signature[64] purpose[8] expiration_be[8] ciphertext[..]
//! ```
//!
//! `purpose` is the signed-envelope header: `size_be32 ‖ purpose_be32`.
//! The ciphertext is `rd_count_be[4] ‖ records`, sealed with the GCM tag
//! appended.

use warren_crypto::eddsa::{Signature, SignaturePurpose};
use warren_crypto::kdf::{self, contexts};
use warren_crypto::zone::{ZonePrivateKey, ZonePublicKey};
use warren_crypto::{aead, CryptoError};
use warren_types::{AbsoluteTime, HashCode};

use crate::records::{self, flags, Record};
use crate::{GnsError, Result, MAX_BLOCK_SIZE, MAX_RD_COUNT};

/// Fixed wire overhead in front of the ciphertext.
pub const BLOCK_HEADER_SIZE: usize = 32 + 64 + 8 + 8;

/// A signed and encrypted record block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// Public key of the label-derived signing key.
    pub derived_key: ZonePublicKey,
    /// Signature over `purpose ‖ expiration ‖ ciphertext` by the derived
    /// key.
    pub signature: Signature,
    /// Block-wide expiration.
    pub expiration: AbsoluteTime,
    /// Sealed `rd_count_be ‖ records`, GCM tag appended.
    pub ciphertext: Vec<u8>,
}

/// Derive the AES key and nonce for `(zone, label)`.
fn payload_keys(
    zone_pub: &ZonePublicKey,
    label: &str,
) -> std::result::Result<([u8; aead::KEY_SIZE], [u8; aead::NONCE_SIZE]), CryptoError> {
    let mut key = [0u8; aead::KEY_SIZE];
    kdf::hkdf_sha512(
        label.as_bytes(),
        zone_pub.as_bytes(),
        contexts::GNS_AES_KEY.as_bytes(),
        &mut key,
    )?;
    let mut nonce = [0u8; aead::NONCE_SIZE];
    kdf::hkdf_sha512(
        label.as_bytes(),
        zone_pub.as_bytes(),
        contexts::GNS_AES_IV.as_bytes(),
        &mut nonce,
    )?;
    Ok((key, nonce))
}

/// The byte string covered by the block signature: `expiration ‖
/// ciphertext` (the purpose envelope adds the leading purpose header).
fn signed_payload(expiration: AbsoluteTime, ciphertext: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8 + ciphertext.len());
    payload.extend_from_slice(&expiration.as_micros().to_be_bytes());
    payload.extend_from_slice(ciphertext);
    payload
}

/// Create a block for `label` under `zone`.
///
/// Relative-expiration records are pinned to `now` and the flag cleared;
/// a stored record never carries `RELATIVE_EXPIRATION`.
pub fn create(
    zone: &ZonePrivateKey,
    expiration: AbsoluteTime,
    label: &str,
    rds: &[Record],
    now: AbsoluteTime,
) -> Result<Block> {
    let pinned: Vec<Record> = rds
        .iter()
        .map(|r| {
            let mut r = r.clone();
            if r.flags & flags::RELATIVE_EXPIRATION != 0 {
                r.expiration = r.effective_expiration(now).as_micros();
                r.flags &= !flags::RELATIVE_EXPIRATION;
            }
            r
        })
        .collect();

    let serialized = records::serialize(&pinned)?;
    let mut plaintext = Vec::with_capacity(4 + serialized.len());
    plaintext.extend_from_slice(&(pinned.len() as u32).to_be_bytes());
    plaintext.extend_from_slice(&serialized);

    let zone_pub = zone.public_key();
    let (key, nonce) = payload_keys(&zone_pub, label)?;
    let ciphertext = aead::seal(&key, &nonce, &plaintext, b"")?;

    let derived = zone.derive(label, contexts::GNS)?;
    let signature = derived.sign(
        SignaturePurpose::GnsRecordSign,
        &signed_payload(expiration, &ciphertext),
    )?;

    Ok(Block {
        derived_key: derived.public_key(),
        signature,
        expiration,
        ciphertext,
    })
}

/// Verify the block signature against its embedded derived key.
pub fn verify(block: &Block) -> Result<()> {
    block
        .derived_key
        .verify(
            SignaturePurpose::GnsRecordSign,
            &signed_payload(block.expiration, &block.ciphertext),
            &block.signature,
        )
        .map_err(|_| GnsError::Authentication)
}

/// Decrypt a block and return the records visible at `now`.
///
/// Visibility applies the shadow rule: a non-shadow record survives iff it
/// has not expired; a shadow record survives, with the flag cleared, iff
/// it has not expired and no live non-shadow record of the same type is
/// present. A decrypted record still flagged relative is a protocol
/// violation and is skipped.
pub fn decrypt(
    block: &Block,
    zone_pub: &ZonePublicKey,
    label: &str,
    now: AbsoluteTime,
) -> Result<Vec<Record>> {
    let (key, nonce) = payload_keys(zone_pub, label)?;
    let plaintext = aead::open(&key, &nonce, &block.ciphertext, b"")
        .map_err(|_| GnsError::Authentication)?;

    if plaintext.len() < 4 {
        return Err(GnsError::WireFormat("payload shorter than count".into()));
    }
    let count = u32::from_be_bytes(
        plaintext[..4]
            .try_into()
            .map_err(|_| GnsError::WireFormat("count".into()))?,
    ) as usize;
    if count > MAX_RD_COUNT {
        return Err(GnsError::TooManyRecords {
            count,
            max: MAX_RD_COUNT,
        });
    }
    let all = records::deserialize(&plaintext[4..], count)?;

    let mut visible = Vec::with_capacity(all.len());
    for record in &all {
        if record.flags & flags::RELATIVE_EXPIRATION != 0 {
            tracing::debug!(
                record_type = record.record_type,
                "skipping record with relative expiration inside a block"
            );
            continue;
        }
        if record.is_expired(now) {
            continue;
        }
        if record.flags & flags::SHADOW != 0 {
            let primary_alive = all.iter().any(|other| {
                other.record_type == record.record_type
                    && other.flags & flags::SHADOW == 0
                    && other.flags & flags::RELATIVE_EXPIRATION == 0
                    && !other.is_expired(now)
            });
            if primary_alive {
                continue;
            }
            let mut promoted = record.clone();
            promoted.flags &= !flags::SHADOW;
            visible.push(promoted);
        } else {
            visible.push(record.clone());
        }
    }
    Ok(visible)
}

/// The DHT query for `(Z_pub, label)`: SHA-512 of the derived public key.
pub fn query_from_public_key(zone_pub: &ZonePublicKey, label: &str) -> Result<HashCode> {
    let derived = zone_pub.derive(label, contexts::GNS)?;
    Ok(HashCode::digest(derived.as_bytes()))
}

/// The DHT query computed from the private half; agrees bit-exactly with
/// [`query_from_public_key`].
pub fn query_from_private_key(zone: &ZonePrivateKey, label: &str) -> Result<HashCode> {
    let derived = zone.derive(label, contexts::GNS)?;
    Ok(HashCode::digest(derived.public_key().as_bytes()))
}

impl Block {
    /// Serialize for DHT storage.
    pub fn to_bytes(&self) -> Vec<u8> {
        let signed_size = (8 + 8 + self.ciphertext.len()) as u32;
        let mut out = Vec::with_capacity(BLOCK_HEADER_SIZE + self.ciphertext.len());
        out.extend_from_slice(self.derived_key.as_bytes());
        out.extend_from_slice(&self.signature.to_bytes());
        out.extend_from_slice(&signed_size.to_be_bytes());
        out.extend_from_slice(&(SignaturePurpose::GnsRecordSign as u32).to_be_bytes());
        out.extend_from_slice(&self.expiration.as_micros().to_be_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse a block received from the DHT. Checks the purpose header but
    /// not the signature; callers run [`verify`] next.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BLOCK_HEADER_SIZE {
            return Err(GnsError::WireFormat(format!(
                "block shorter than header: {} bytes",
                bytes.len()
            )));
        }
        if bytes.len() > BLOCK_HEADER_SIZE + MAX_BLOCK_SIZE {
            return Err(GnsError::TooLarge {
                size: bytes.len(),
                max: BLOCK_HEADER_SIZE + MAX_BLOCK_SIZE,
            });
        }
        let mut derived = [0u8; 32];
        derived.copy_from_slice(&bytes[..32]);
        let mut sig = [0u8; 64];
        sig.copy_from_slice(&bytes[32..96]);
        let signed_size = u32::from_be_bytes(
            bytes[96..100]
                .try_into()
                .map_err(|_| GnsError::WireFormat("signed size".into()))?,
        ) as usize;
        let purpose = u32::from_be_bytes(
            bytes[100..104]
                .try_into()
                .map_err(|_| GnsError::WireFormat("purpose".into()))?,
        );
        if purpose != SignaturePurpose::GnsRecordSign as u32 {
            return Err(GnsError::WireFormat(format!(
                "unexpected signature purpose {purpose}"
            )));
        }
        let expiration = u64::from_be_bytes(
            bytes[104..112]
                .try_into()
                .map_err(|_| GnsError::WireFormat("expiration".into()))?,
        );
        let ciphertext = bytes[112..].to_vec();
        if signed_size != 8 + 8 + ciphertext.len() {
            return Err(GnsError::WireFormat(format!(
                "signed size {signed_size} disagrees with ciphertext length {}",
                ciphertext.len()
            )));
        }
        Ok(Block {
            derived_key: ZonePublicKey::from_bytes(derived),
            signature: Signature::from_bytes(&sig),
            expiration: AbsoluteTime(expiration),
            ciphertext,
        })
    }
}
