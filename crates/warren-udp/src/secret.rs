//! Shared secrets and per-sequence key material.
//!
//! A handshake yields a 32-byte master secret. Everything else is HKDF:
//!
//! - `cmac = HKDF-SHA256(salt = "CMAC", ikm = master, info = "UDP-CMAC")`
//!   names the secret in ACKs;
//! - for sequence `n`, `key ‖ iv = HKDF-SHA256(salt = be(n), ikm = master,
//!   info = "UDP-IV-KEY")` and `kid(n) = HKDF-SHA256(salt = be(n),
//!   ikm = master, info = "UDP-KID")`.
//!
//! Sequence 0 is reserved for the KX datagram itself; boxes start at 1.
//!
//! On the receiving side each secret keeps the sequences it has offered
//! but not yet consumed; each offered sequence has a key cache entry in
//! the session-wide kid map so an incoming box is identified in O(1).

use std::collections::VecDeque;

use warren_crypto::ecdh::MasterSecret;
use warren_crypto::kdf::{self, contexts};
use warren_crypto::{aead, CryptoError};
use warren_types::{AbsoluteTime, ShortHash};

/// The kid for sequence `sequence` under `master`.
pub fn derive_kid(
    master: &MasterSecret,
    sequence: u32,
) -> std::result::Result<ShortHash, CryptoError> {
    let mut out = [0u8; 32];
    kdf::hkdf_sha256(
        &sequence.to_be_bytes(),
        master.as_bytes(),
        contexts::UDP_KID.as_bytes(),
        &mut out,
    )?;
    Ok(ShortHash::from_bytes(out))
}

/// The AES key and nonce for sequence `sequence` under `master`.
pub fn derive_box_keys(
    master: &MasterSecret,
    sequence: u32,
) -> std::result::Result<([u8; aead::KEY_SIZE], [u8; aead::NONCE_SIZE]), CryptoError> {
    let mut okm = [0u8; aead::KEY_SIZE + aead::NONCE_SIZE];
    kdf::hkdf_sha256(
        &sequence.to_be_bytes(),
        master.as_bytes(),
        contexts::UDP_IV_KEY.as_bytes(),
        &mut okm,
    )?;
    let mut key = [0u8; aead::KEY_SIZE];
    key.copy_from_slice(&okm[..aead::KEY_SIZE]);
    let mut nonce = [0u8; aead::NONCE_SIZE];
    nonce.copy_from_slice(&okm[aead::KEY_SIZE..]);
    Ok((key, nonce))
}

/// The secret's name in ACKs.
pub fn derive_cmac(master: &MasterSecret) -> std::result::Result<ShortHash, CryptoError> {
    let mut out = [0u8; 32];
    kdf::hkdf_sha256(
        contexts::CMAC_SALT.as_bytes(),
        master.as_bytes(),
        contexts::UDP_CMAC.as_bytes(),
        &mut out,
    )?;
    Ok(ShortHash::from_bytes(out))
}

/// One master secret with its sequence bookkeeping.
///
/// On the sending side `sequence_used` is the highest sequence sent and
/// `sequence_allowed` the highest the peer has ACKed. On the receiving
/// side `sequence_allowed` is the highest sequence offered via key cache
/// entries and `kcn_sequences` holds the outstanding offers, oldest first.
pub struct SharedSecret {
    master: MasterSecret,
    cmac: ShortHash,
    pub sequence_used: u32,
    pub sequence_allowed: u32,
    /// Payload bytes sent under this secret; drives byte-based rekey.
    pub bytes_sent: u64,
    pub created_at: AbsoluteTime,
    /// Receiver side: sequences with a live key cache entry, ascending.
    pub kcn_sequences: VecDeque<u32>,
    /// Sender side: the peer has ACKed this secret at least once.
    pub ack_seen: bool,
}

impl SharedSecret {
    pub fn new(master: MasterSecret, now: AbsoluteTime) -> std::result::Result<Self, CryptoError> {
        let cmac = derive_cmac(&master)?;
        Ok(Self {
            master,
            cmac,
            sequence_used: 0,
            sequence_allowed: 0,
            bytes_sent: 0,
            created_at: now,
            kcn_sequences: VecDeque::new(),
            ack_seen: false,
        })
    }

    pub fn cmac(&self) -> &ShortHash {
        &self.cmac
    }

    pub fn kid(&self, sequence: u32) -> std::result::Result<ShortHash, CryptoError> {
        derive_kid(&self.master, sequence)
    }

    pub fn box_keys(
        &self,
        sequence: u32,
    ) -> std::result::Result<([u8; aead::KEY_SIZE], [u8; aead::NONCE_SIZE]), CryptoError> {
        derive_box_keys(&self.master, sequence)
    }

    /// Sequences this secret may still send: `allowed - used`.
    pub fn remaining_budget(&self) -> u32 {
        self.sequence_allowed.saturating_sub(self.sequence_used)
    }

    /// Whether the secret must be retired under the rekey policy.
    pub fn needs_rekey(
        &self,
        now: AbsoluteTime,
        max_bytes: u64,
        max_age: warren_types::RelativeTime,
    ) -> bool {
        self.bytes_sent >= max_bytes
            || now.saturating_duration_since(self.created_at) >= max_age
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret")
            .field("cmac", &self.cmac)
            .field("sequence_used", &self.sequence_used)
            .field("sequence_allowed", &self.sequence_allowed)
            .field("kcn_outstanding", &self.kcn_sequences.len())
            .finish()
    }
}
