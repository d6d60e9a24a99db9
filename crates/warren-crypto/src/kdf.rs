//! HKDF key derivation with the registered context strings.
//!
//! Every key-derivation call in the Warren protocols is domain-separated by
//! a context string from [`contexts`]. The strings are part of the wire
//! format: changing one changes every derived key, kid and cmac, so they
//! must match any interoperating implementation byte for byte.

use hkdf::Hkdf;
use sha2::{Sha256, Sha512};

use crate::{CryptoError, Result};

/// Registered key-derivation context strings.
///
/// Using a context string not listed here is a protocol violation.
pub mod contexts {
    /// Zone label-key derivation factor.
    pub const GNS: &str = "gns";
    /// AES key for record-block payload encryption.
    pub const GNS_AES_KEY: &str = "gns-aes-ctx-key";
    /// AES nonce for record-block payload encryption.
    pub const GNS_AES_IV: &str = "gns-aes-ctx-iv";
    /// Per-sequence box key and nonce.
    pub const UDP_IV_KEY: &str = "UDP-IV-KEY";
    /// Per-sequence key identifier.
    pub const UDP_KID: &str = "UDP-KID";
    /// Shared-secret name carried in ACKs.
    pub const UDP_CMAC: &str = "UDP-CMAC";
    /// Salt for the cmac derivation.
    pub const CMAC_SALT: &str = "CMAC";
}

/// HKDF-SHA256: extract with `salt`, expand `info` into `out`.
pub fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8], out: &mut [u8]) -> Result<()> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    hk.expand(info, out)
        .map_err(|_| CryptoError::KeyDerivation(format!("output length {}", out.len())))
}

/// HKDF-SHA512: extract with `salt`, expand `info` into `out`.
pub fn hkdf_sha512(salt: &[u8], ikm: &[u8], info: &[u8], out: &mut [u8]) -> Result<()> {
    let hk = Hkdf::<Sha512>::new(Some(salt), ikm);
    hk.expand(info, out)
        .map_err(|_| CryptoError::KeyDerivation(format!("output length {}", out.len())))
}
