//! X25519 key agreement, bridged to Ed25519 identities (RFC 7748).
//!
//! The handshake performs ECDH between a fresh X25519 ephemeral key on the
//! initiator side and the responder's long-lived Ed25519 identity key. The
//! Ed25519 key is mapped to Montgomery form for the exchange: the initiator
//! multiplies its ephemeral scalar by the birational image of the identity
//! point, the responder multiplies its expanded identity scalar by the
//! ephemeral public key. Both arrive at the same u-coordinate.
//!
//! The 32-byte master secret handed to the session layer is the SHA-256 of
//! that shared u-coordinate.

use curve25519_dalek::edwards::CompressedEdwardsY;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use warren_types::PeerId;

use crate::eddsa::SigningKey;
use crate::{CryptoError, Result};

/// A fresh X25519 keypair used for exactly one handshake.
pub struct EphemeralKey {
    secret: StaticSecret,
}

/// The 32-byte master secret a handshake produces.
///
/// All per-sequence keys, kids and the cmac are HKDF outputs of this value.
#[derive(Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct MasterSecret(pub [u8; 32]);

impl MasterSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterSecret(..)")
    }
}

impl EphemeralKey {
    /// Generate a fresh ephemeral key.
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Create from raw bytes. Test fixtures only; handshakes must use
    /// [`EphemeralKey::generate`].
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(bytes),
        }
    }

    /// The public half sent in the clear at the front of the KX datagram.
    pub fn public_bytes(&self) -> [u8; 32] {
        PublicKey::from(&self.secret).to_bytes()
    }

    /// Initiator side: agree with the responder's Ed25519 identity.
    pub fn agree_with_identity(&self, responder: &PeerId) -> Result<MasterSecret> {
        let point = CompressedEdwardsY(*responder.as_bytes())
            .decompress()
            .ok_or(CryptoError::MalformedKey)?;
        let montgomery = point.to_montgomery();
        let shared = x25519_dalek::x25519(self.secret.to_bytes(), montgomery.to_bytes());
        master_from_shared(shared)
    }
}

/// Responder side: agree with an initiator's ephemeral public key using
/// our Ed25519 identity key.
pub fn agree_with_ephemeral(
    identity: &SigningKey,
    ephemeral_pub: &[u8; 32],
) -> Result<MasterSecret> {
    let shared = x25519_dalek::x25519(identity.dh_scalar_bytes(), *ephemeral_pub);
    master_from_shared(shared)
}

fn master_from_shared(shared: [u8; 32]) -> Result<MasterSecret> {
    // An all-zero u-coordinate means the peer fed us a low-order point.
    if shared == [0u8; 32] {
        return Err(CryptoError::MalformedKey);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(shared));
    Ok(MasterSecret(out))
}
