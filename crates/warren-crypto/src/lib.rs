//! # warren-crypto
//!
//! Cryptographic primitives for the Warren protocols. No algorithm
//! negotiation happens anywhere on the wire — the suite is fixed:
//!
//! - [`eddsa`] — Ed25519 identity keys and purpose-scoped signatures
//! - [`zone`] — zone keys and per-label derived keys (scalar blinding)
//! - [`ecdh`] — X25519 key agreement, bridged to Ed25519 identities
//! - [`kdf`] — HKDF-SHA256/512 with the registered context strings
//! - [`aead`] — AES-256-GCM sealing and opening

pub mod aead;
pub mod ecdh;
pub mod eddsa;
pub mod kdf;
pub mod zone;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// AEAD open failed (authentication tag mismatch).
    #[error("AEAD decryption failed")]
    AeadDecryption,

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// A public key did not decode to a valid curve point.
    #[error("malformed public key")]
    MalformedKey,

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
