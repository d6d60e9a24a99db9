//! Zone keys and per-label derived keys.
//!
//! A zone is an Ed25519 keypair. For a label `L` under zone `Z` both sides
//! of the protocol derive a blinding factor
//! `h = HKDF-SHA512(salt = Z_pub, ikm = L, info = ctx)` reduced mod ℓ.
//! The holder of the zone key computes the derived private scalar `h·a`;
//! anyone holding only the public key computes the derived public point
//! `h·A`. The two agree, so a resolver can locate and verify a block for
//! `(Z, L)` without learning anything about other labels.
//!
//! Derived keys sign through the `ed25519-dalek` hazmat expanded-key
//! interface: the blinded scalar is not a seed-expanded key, but the
//! resulting signatures verify as plain Ed25519 against the derived
//! public key.

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::hazmat::{raw_sign, ExpandedSecretKey};
use rand::RngCore;
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

use crate::eddsa::{purpose_envelope, Signature, SignaturePurpose};
use crate::kdf;
use crate::{CryptoError, Result};

/// A zone private key: an expanded Ed25519 secret (scalar + nonce prefix).
///
/// Both root zone keys and label-derived keys have this shape.
pub struct ZonePrivateKey {
    scalar: Scalar,
    prefix: [u8; 32],
}

/// A zone public key: a compressed Edwards point naming the zone.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZonePublicKey([u8; 32]);

impl Drop for ZonePrivateKey {
    fn drop(&mut self) {
        self.scalar = Scalar::ZERO;
        self.prefix.zeroize();
    }
}

impl Clone for ZonePrivateKey {
    fn clone(&self) -> Self {
        Self {
            scalar: self.scalar,
            prefix: self.prefix,
        }
    }
}

impl ZonePrivateKey {
    /// Expand a raw 32-byte seed into a zone key (standard Ed25519
    /// expansion: SHA-512, clamp, reduce).
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let digest = Sha512::digest(seed);
        let mut expanded = [0u8; 64];
        expanded.copy_from_slice(&digest);
        let esk = ExpandedSecretKey::from_bytes(&expanded);
        expanded.zeroize();
        Self {
            scalar: esk.scalar,
            prefix: esk.hash_prefix,
        }
    }

    /// Generate a zone key from a fresh random seed.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        let key = Self::from_seed(&seed);
        seed.zeroize();
        key
    }

    /// The public key naming this zone.
    pub fn public_key(&self) -> ZonePublicKey {
        ZonePublicKey(EdwardsPoint::mul_base(&self.scalar).compress().to_bytes())
    }

    /// Derive the private key for `label` under context `ctx`.
    ///
    /// The derived scalar is `h·a mod ℓ`; the nonce prefix is re-derived so
    /// distinct labels never share signing nonces.
    pub fn derive(&self, label: &str, ctx: &str) -> Result<ZonePrivateKey> {
        let factor = derive_factor(&self.public_key(), label, ctx)?;
        let mut prefix_input = [0u8; 64];
        prefix_input[..32].copy_from_slice(&factor.to_bytes());
        prefix_input[32..].copy_from_slice(&self.prefix);
        let prefix_digest = Sha512::digest(prefix_input);
        let mut prefix = [0u8; 32];
        prefix.copy_from_slice(&prefix_digest[..32]);
        prefix_input.zeroize();
        Ok(ZonePrivateKey {
            scalar: factor * self.scalar,
            prefix,
        })
    }

    /// Sign `payload` under the given purpose with this (possibly derived)
    /// key.
    pub fn sign(&self, purpose: SignaturePurpose, payload: &[u8]) -> Result<Signature> {
        let esk = ExpandedSecretKey {
            scalar: self.scalar,
            hash_prefix: self.prefix,
        };
        let vk = ed25519_dalek::VerifyingKey::from_bytes(&self.public_key().to_bytes())
            .map_err(|_| CryptoError::MalformedKey)?;
        let sig = raw_sign::<Sha512>(&esk, &purpose_envelope(purpose, payload), &vk);
        Ok(Signature::from_inner(sig))
    }
}

impl ZonePublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    /// Derive the public key for `label` under context `ctx`: `h·A`.
    pub fn derive(&self, label: &str, ctx: &str) -> Result<ZonePublicKey> {
        let factor = derive_factor(self, label, ctx)?;
        let point = CompressedEdwardsY(self.0)
            .decompress()
            .ok_or(CryptoError::MalformedKey)?;
        Ok(ZonePublicKey((factor * point).compress().to_bytes()))
    }

    /// Verify a purpose-scoped signature against this (possibly derived)
    /// key.
    pub fn verify(
        &self,
        purpose: SignaturePurpose,
        payload: &[u8],
        signature: &Signature,
    ) -> Result<()> {
        let vk = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|_| CryptoError::MalformedKey)?;
        ed25519_dalek::Verifier::verify(
            &vk,
            &purpose_envelope(purpose, payload),
            signature.inner(),
        )
        .map_err(|_| CryptoError::SignatureVerification)
    }
}

impl std::fmt::Debug for ZonePublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ZonePublicKey({})", warren_types::base32::encode(&self.0[..8]))
    }
}

impl std::fmt::Debug for ZonePrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZonePrivateKey")
            .field("public", &self.public_key())
            .finish()
    }
}

/// The label blinding factor: 64 bytes of HKDF-SHA512 reduced mod ℓ.
fn derive_factor(zone_pub: &ZonePublicKey, label: &str, ctx: &str) -> Result<Scalar> {
    let mut okm = [0u8; 64];
    kdf::hkdf_sha512(
        zone_pub.as_bytes(),
        label.as_bytes(),
        ctx.as_bytes(),
        &mut okm,
    )?;
    Ok(Scalar::from_bytes_mod_order_wide(&okm))
}
