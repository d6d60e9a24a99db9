//! Datagram wire formats.
//!
//! All multi-byte integers are big-endian. The five datagram types:
//!
//! ```text
//! InitialKX       ephemeral_pub[32] gcm_tag[16]            (ciphertext follows)
//! UDPConfirmation sender_peer_id[32] sender_sig[64] monotonic_time[8]
//! UDPBox          kid[32] gcm_tag[16] ciphertext[..]
//! UDPAck          type_be[2] size_be[2] sequence_max_be[4] cmac[32]
//! UDPBroadcast    sender_peer_id[32] sender_sig[64]
//! ```
//!
//! The `UDPConfirmation` is the leading 104 bytes of the KX plaintext; it
//! binds the sender, the intended receiver, the ephemeral key and a
//! monotonic timestamp under the handshake signature purpose.

use warren_crypto::eddsa::{Signature, SignaturePurpose, SigningKey, VerifyingKey};
use warren_types::{AbsoluteTime, HashCode, PeerId, ShortHash};

use crate::{Result, UdpError};

/// Size of an X25519 ephemeral public key.
pub const EPHEMERAL_SIZE: usize = 32;

/// Size of an AES-GCM authentication tag.
pub const TAG_SIZE: usize = 16;

/// Size of the `InitialKX` header (ephemeral key + tag).
pub const INITIAL_KX_SIZE: usize = EPHEMERAL_SIZE + TAG_SIZE;

/// Size of a `UDPConfirmation`.
pub const CONFIRMATION_SIZE: usize = 32 + 64 + 8;

/// Minimum size of a KX datagram: header plus the encrypted confirmation.
pub const KX_MIN_SIZE: usize = INITIAL_KX_SIZE + CONFIRMATION_SIZE;

/// Size of a `UDPBox` header (kid + tag).
pub const BOX_HEADER_SIZE: usize = 32 + TAG_SIZE;

/// Size of a `UDPAck`.
pub const ACK_SIZE: usize = 4 + 4 + 32;

/// Size of a `UDPBroadcast`.
pub const BROADCAST_SIZE: usize = 32 + 64;

/// Message type tag of a `UDPAck`.
pub const MESSAGE_TYPE_ACK: u16 = 0x0551;

/// The decrypted confirmation carried at the front of a KX datagram.
#[derive(Clone, Debug)]
pub struct Confirmation {
    pub sender: PeerId,
    pub signature: Signature,
    pub monotonic_time: AbsoluteTime,
}

/// The signed payload of a handshake: `sender ‖ receiver ‖ ephemeral ‖
/// monotonic_time`.
pub fn kx_signed_payload(
    sender: &PeerId,
    receiver: &PeerId,
    ephemeral: &[u8; EPHEMERAL_SIZE],
    monotonic_time: AbsoluteTime,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + 32 + EPHEMERAL_SIZE + 8);
    out.extend_from_slice(sender.as_bytes());
    out.extend_from_slice(receiver.as_bytes());
    out.extend_from_slice(ephemeral);
    out.extend_from_slice(&monotonic_time.as_micros().to_be_bytes());
    out
}

impl Confirmation {
    /// Build and sign a confirmation for a handshake towards `receiver`.
    pub fn build(
        identity: &SigningKey,
        receiver: &PeerId,
        ephemeral: &[u8; EPHEMERAL_SIZE],
        monotonic_time: AbsoluteTime,
    ) -> Self {
        let sender = identity.peer_id();
        let payload = kx_signed_payload(&sender, receiver, ephemeral, monotonic_time);
        Self {
            sender,
            signature: identity.sign(SignaturePurpose::UdpHandshake, &payload),
            monotonic_time,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CONFIRMATION_SIZE);
        out.extend_from_slice(self.sender.as_bytes());
        out.extend_from_slice(&self.signature.to_bytes());
        out.extend_from_slice(&self.monotonic_time.as_micros().to_be_bytes());
        out
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < CONFIRMATION_SIZE {
            return Err(UdpError::WireFormat(format!(
                "confirmation too short: {} bytes",
                data.len()
            )));
        }
        let mut sender = [0u8; 32];
        sender.copy_from_slice(&data[..32]);
        let mut sig = [0u8; 64];
        sig.copy_from_slice(&data[32..96]);
        let time = u64::from_be_bytes(
            data[96..104]
                .try_into()
                .map_err(|_| UdpError::WireFormat("monotonic time".into()))?,
        );
        Ok(Self {
            sender: PeerId::from_bytes(sender),
            signature: Signature::from_bytes(&sig),
            monotonic_time: AbsoluteTime(time),
        })
    }

    /// Verify the handshake signature, given the receiver and ephemeral
    /// key from the datagram context.
    pub fn verify(
        &self,
        receiver: &PeerId,
        ephemeral: &[u8; EPHEMERAL_SIZE],
    ) -> Result<()> {
        let key =
            VerifyingKey::from_peer_id(&self.sender).map_err(|_| UdpError::Authentication)?;
        let payload = kx_signed_payload(&self.sender, receiver, ephemeral, self.monotonic_time);
        key.verify(SignaturePurpose::UdpHandshake, &payload, &self.signature)
            .map_err(|_| UdpError::Authentication)
    }
}

/// A parsed `UDPAck`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ack {
    pub sequence_max: u32,
    pub cmac: ShortHash,
}

impl Ack {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ACK_SIZE);
        out.extend_from_slice(&MESSAGE_TYPE_ACK.to_be_bytes());
        out.extend_from_slice(&(ACK_SIZE as u16).to_be_bytes());
        out.extend_from_slice(&self.sequence_max.to_be_bytes());
        out.extend_from_slice(self.cmac.as_bytes());
        out
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != ACK_SIZE {
            return Err(UdpError::WireFormat(format!(
                "ack size {} != {ACK_SIZE}",
                data.len()
            )));
        }
        let msg_type = u16::from_be_bytes(
            data[..2]
                .try_into()
                .map_err(|_| UdpError::WireFormat("ack type".into()))?,
        );
        if msg_type != MESSAGE_TYPE_ACK {
            return Err(UdpError::WireFormat(format!(
                "unexpected message type {msg_type:#06x}"
            )));
        }
        let size = u16::from_be_bytes(
            data[2..4]
                .try_into()
                .map_err(|_| UdpError::WireFormat("ack size".into()))?,
        );
        if usize::from(size) != ACK_SIZE {
            return Err(UdpError::WireFormat(format!("ack header size {size}")));
        }
        let sequence_max = u32::from_be_bytes(
            data[4..8]
                .try_into()
                .map_err(|_| UdpError::WireFormat("ack sequence".into()))?,
        );
        let mut cmac = [0u8; 32];
        cmac.copy_from_slice(&data[8..40]);
        Ok(Self {
            sequence_max,
            cmac: ShortHash::from_bytes(cmac),
        })
    }
}

/// Assemble a KX datagram: `ephemeral ‖ tag ‖ ciphertext_body`.
///
/// `sealed` is AEAD output with the tag appended; the tag moves into the
/// fixed header.
pub fn encode_kx(ephemeral: &[u8; EPHEMERAL_SIZE], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < TAG_SIZE {
        return Err(UdpError::WireFormat("sealed KX shorter than tag".into()));
    }
    let (body, tag) = sealed.split_at(sealed.len() - TAG_SIZE);
    let mut out = Vec::with_capacity(INITIAL_KX_SIZE + body.len());
    out.extend_from_slice(ephemeral);
    out.extend_from_slice(tag);
    out.extend_from_slice(body);
    Ok(out)
}

/// Assemble a box datagram: `kid ‖ tag ‖ ciphertext_body`.
pub fn encode_box(kid: &ShortHash, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < TAG_SIZE {
        return Err(UdpError::WireFormat("sealed box shorter than tag".into()));
    }
    let (body, tag) = sealed.split_at(sealed.len() - TAG_SIZE);
    let mut out = Vec::with_capacity(BOX_HEADER_SIZE + body.len());
    out.extend_from_slice(kid.as_bytes());
    out.extend_from_slice(tag);
    out.extend_from_slice(body);
    Ok(out)
}

/// Reassemble AEAD input (`body ‖ tag`) from a datagram with the tag at
/// `tag_offset`.
pub fn sealed_from_datagram(data: &[u8], tag_offset: usize) -> Result<Vec<u8>> {
    if data.len() < tag_offset + TAG_SIZE {
        return Err(UdpError::WireFormat("datagram shorter than tag".into()));
    }
    let tag = &data[tag_offset..tag_offset + TAG_SIZE];
    let body = &data[tag_offset + TAG_SIZE..];
    let mut sealed = Vec::with_capacity(body.len() + TAG_SIZE);
    sealed.extend_from_slice(body);
    sealed.extend_from_slice(tag);
    Ok(sealed)
}

/// Build a signed LAN broadcast announcing `address_hash` (the SHA-512 of
/// our `udp-…` address string).
pub fn encode_broadcast(identity: &SigningKey, address_hash: &HashCode) -> Vec<u8> {
    let signature = identity.sign(SignaturePurpose::UdpBroadcast, address_hash.as_bytes());
    let mut out = Vec::with_capacity(BROADCAST_SIZE);
    out.extend_from_slice(identity.peer_id().as_bytes());
    out.extend_from_slice(&signature.to_bytes());
    out
}

/// Verify a received broadcast against the address hash the receiver
/// computed from the datagram's source. Returns the announcing peer.
pub fn verify_broadcast(data: &[u8], address_hash: &HashCode) -> Result<PeerId> {
    if data.len() != BROADCAST_SIZE {
        return Err(UdpError::WireFormat(format!(
            "broadcast size {} != {BROADCAST_SIZE}",
            data.len()
        )));
    }
    let mut sender = [0u8; 32];
    sender.copy_from_slice(&data[..32]);
    let sender = PeerId::from_bytes(sender);
    let mut sig = [0u8; 64];
    sig.copy_from_slice(&data[32..96]);

    let key = VerifyingKey::from_peer_id(&sender).map_err(|_| UdpError::Authentication)?;
    key.verify(
        SignaturePurpose::UdpBroadcast,
        address_hash.as_bytes(),
        &Signature::from_bytes(&sig),
    )
    .map_err(|_| UdpError::Authentication)?;
    Ok(sender)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_roundtrip_and_verify() {
        let identity = SigningKey::from_bytes(&[1u8; 32]);
        let receiver = PeerId::from_bytes([2u8; 32]);
        let ephemeral = [3u8; EPHEMERAL_SIZE];
        let conf = Confirmation::build(&identity, &receiver, &ephemeral, AbsoluteTime(1000));

        let bytes = conf.encode();
        assert_eq!(bytes.len(), CONFIRMATION_SIZE);

        let parsed = Confirmation::parse(&bytes).expect("parse");
        assert_eq!(parsed.sender, identity.peer_id());
        assert_eq!(parsed.monotonic_time, AbsoluteTime(1000));
        assert!(parsed.verify(&receiver, &ephemeral).is_ok());
    }

    #[test]
    fn test_confirmation_binds_receiver() {
        let identity = SigningKey::from_bytes(&[1u8; 32]);
        let receiver = PeerId::from_bytes([2u8; 32]);
        let other = PeerId::from_bytes([9u8; 32]);
        let ephemeral = [3u8; EPHEMERAL_SIZE];
        let conf = Confirmation::build(&identity, &receiver, &ephemeral, AbsoluteTime(1000));
        assert!(conf.verify(&other, &ephemeral).is_err());
    }

    #[test]
    fn test_confirmation_binds_ephemeral() {
        let identity = SigningKey::from_bytes(&[1u8; 32]);
        let receiver = PeerId::from_bytes([2u8; 32]);
        let conf =
            Confirmation::build(&identity, &receiver, &[3u8; 32], AbsoluteTime(1000));
        assert!(conf.verify(&receiver, &[4u8; 32]).is_err());
    }

    #[test]
    fn test_ack_roundtrip() {
        let ack = Ack {
            sequence_max: 128,
            cmac: ShortHash::from_bytes([7u8; 32]),
        };
        let bytes = ack.encode();
        assert_eq!(bytes.len(), ACK_SIZE);
        assert_eq!(&bytes[..2], &MESSAGE_TYPE_ACK.to_be_bytes());
        assert_eq!(Ack::parse(&bytes).expect("parse"), ack);
    }

    #[test]
    fn test_ack_rejects_wrong_type() {
        let ack = Ack {
            sequence_max: 1,
            cmac: ShortHash::from_bytes([0u8; 32]),
        };
        let mut bytes = ack.encode();
        bytes[0] = 0xff;
        assert!(Ack::parse(&bytes).is_err());
    }

    #[test]
    fn test_box_encode_layout() {
        let kid = ShortHash::from_bytes([0xabu8; 32]);
        // Sealed = 5 bytes body + 16 bytes tag.
        let sealed: Vec<u8> = (0u8..21).collect();
        let datagram = encode_box(&kid, &sealed).expect("encode");
        assert_eq!(datagram.len(), BOX_HEADER_SIZE + 5);
        assert_eq!(&datagram[..32], kid.as_bytes());
        assert_eq!(&datagram[32..48], &sealed[5..]);
        assert_eq!(&datagram[48..], &sealed[..5]);

        // And back.
        let reassembled = sealed_from_datagram(&datagram, 32).expect("reassemble");
        assert_eq!(reassembled, sealed);
    }

    #[test]
    fn test_kx_encode_layout() {
        let ephemeral = [0x11u8; EPHEMERAL_SIZE];
        let sealed: Vec<u8> = (0u8..120).collect();
        let datagram = encode_kx(&ephemeral, &sealed).expect("encode");
        assert_eq!(datagram.len(), INITIAL_KX_SIZE + 104);
        assert_eq!(&datagram[..32], &ephemeral);
        let reassembled = sealed_from_datagram(&datagram, 32).expect("reassemble");
        assert_eq!(reassembled, sealed);
    }

    #[test]
    fn test_broadcast_roundtrip() {
        let identity = SigningKey::from_bytes(&[5u8; 32]);
        let hash = HashCode::digest(b"udp-192.0.2.1:2086");
        let bytes = encode_broadcast(&identity, &hash);
        assert_eq!(bytes.len(), BROADCAST_SIZE);
        let sender = verify_broadcast(&bytes, &hash).expect("verify");
        assert_eq!(sender, identity.peer_id());
    }

    #[test]
    fn test_broadcast_wrong_address_rejected() {
        let identity = SigningKey::from_bytes(&[5u8; 32]);
        let hash = HashCode::digest(b"udp-192.0.2.1:2086");
        let bytes = encode_broadcast(&identity, &hash);
        let other = HashCode::digest(b"udp-198.51.100.7:2086");
        assert!(verify_broadcast(&bytes, &other).is_err());
    }
}
