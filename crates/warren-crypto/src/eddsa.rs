//! Ed25519 identity keys and purpose-scoped signatures (RFC 8032).
//!
//! Every signature in the Warren protocols covers a purpose envelope, not
//! the raw payload: `size_be32 ‖ purpose_be32 ‖ payload`, where `size`
//! counts the whole envelope. The purpose constants are fixed integers
//! shared with any interoperating implementation and are never reused
//! across protocol roles.

use ed25519_dalek::{Signer, Verifier};
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

use warren_types::PeerId;

use crate::{CryptoError, Result};

/// Domain-separation constants for signatures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum SignaturePurpose {
    /// Zone revocation statements.
    ZoneRevocation = 3,
    /// Record-block signatures by label-derived zone keys.
    GnsRecordSign = 15,
    /// UDP communicator handshake confirmations.
    UdpHandshake = 30,
    /// UDP communicator LAN broadcast announcements.
    UdpBroadcast = 31,
}

/// Build the signed envelope: `size_be32 ‖ purpose_be32 ‖ payload`.
pub fn purpose_envelope(purpose: SignaturePurpose, payload: &[u8]) -> Vec<u8> {
    let size = 8 + payload.len();
    let mut out = Vec::with_capacity(size);
    out.extend_from_slice(&(size as u32).to_be_bytes());
    out.extend_from_slice(&(purpose as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// An Ed25519 signing key (private identity key).
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl Clone for SigningKey {
    fn clone(&self) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(&self.inner.to_bytes()),
        }
    }
}

impl Drop for SigningKey {
    fn drop(&mut self) {
        let mut bytes = self.inner.to_bytes();
        bytes.zeroize();
    }
}

/// An Ed25519 verification key (public identity key).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyingKey {
    inner: ed25519_dalek::VerifyingKey,
}

/// An Ed25519 signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    inner: ed25519_dalek::Signature,
}

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Create a signing key from a raw 32-byte seed.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(bytes),
        }
    }

    /// Get the raw seed bytes of this signing key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Get the corresponding verification key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// The peer identity named by this key.
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_bytes(self.inner.verifying_key().to_bytes())
    }

    /// Sign `payload` under the given purpose.
    pub fn sign(&self, purpose: SignaturePurpose, payload: &[u8]) -> Signature {
        Signature {
            inner: self.inner.sign(&purpose_envelope(purpose, payload)),
        }
    }

    /// The clamped scalar half of the expanded secret, for X25519 ECDH
    /// against this identity. See [`crate::ecdh`].
    pub(crate) fn dh_scalar_bytes(&self) -> [u8; 32] {
        let digest = Sha512::digest(self.inner.to_bytes());
        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(&digest[..32]);
        scalar
    }
}

impl VerifyingKey {
    /// Create a verification key from raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let inner = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|_| CryptoError::MalformedKey)?;
        Ok(Self { inner })
    }

    /// Create a verification key from a peer identity.
    pub fn from_peer_id(peer: &PeerId) -> Result<Self> {
        Self::from_bytes(peer.as_bytes())
    }

    /// Get the raw bytes of this verification key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// The peer identity named by this key.
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_bytes(self.inner.to_bytes())
    }

    /// Verify a purpose-scoped signature.
    pub fn verify(
        &self,
        purpose: SignaturePurpose,
        payload: &[u8],
        signature: &Signature,
    ) -> Result<()> {
        self.inner
            .verify(&purpose_envelope(purpose, payload), &signature.inner)
            .map_err(|_| CryptoError::SignatureVerification)
    }
}

impl Signature {
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self {
            inner: ed25519_dalek::Signature::from_bytes(bytes),
        }
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }

    pub(crate) fn from_inner(inner: ed25519_dalek::Signature) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &ed25519_dalek::Signature {
        &self.inner
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public", &self.verifying_key())
            .finish()
    }
}
