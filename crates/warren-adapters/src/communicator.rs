//! Transport-communicator host interface.
//!
//! The communicator plugs into a transport service that owns peer
//! routing. The service delivers inbound plaintext to the core, carries
//! ACKs over an authenticated backchannel (possibly routed via other
//! peers), and learns about usable addresses and send-budget changes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use warren_types::PeerId;

/// Callbacks from the communicator into its hosting transport service.
#[async_trait]
pub trait CommunicatorHost: Send + Sync {
    /// Deliver decrypted application payload from `peer`.
    async fn deliver(&self, peer: PeerId, message: Vec<u8>);

    /// Send an ACK (or other control payload) to `peer` over the
    /// backchannel.
    async fn send_backchannel(&self, peer: PeerId, payload: Vec<u8>);

    /// Announce or revoke one of our own addresses
    /// (`udp-<ip>:<port>` strings).
    async fn notify_address(&self, added: bool, address: String);

    /// The send budget towards `peer` changed.
    async fn notify_credit(&self, peer: PeerId, credit: u32);

    /// A LAN broadcast advertised `address` for `peer`; the transport
    /// should validate and dial it.
    async fn validate_address(&self, peer: PeerId, address: String);
}

/// Everything the host observed, for assertions in tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostEvent {
    Delivered { peer: PeerId, message: Vec<u8> },
    Backchannel { peer: PeerId, payload: Vec<u8> },
    Address { added: bool, address: String },
    Credit { peer: PeerId, credit: u32 },
    ValidateAddress { peer: PeerId, address: String },
}

/// A host that forwards every callback into an mpsc channel.
pub struct ChannelHost {
    events: mpsc::UnboundedSender<HostEvent>,
}

impl ChannelHost {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { events: tx }, rx)
    }

    fn emit(&self, event: HostEvent) {
        // A closed receiver just means the test is done listening.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl CommunicatorHost for ChannelHost {
    async fn deliver(&self, peer: PeerId, message: Vec<u8>) {
        self.emit(HostEvent::Delivered { peer, message });
    }

    async fn send_backchannel(&self, peer: PeerId, payload: Vec<u8>) {
        self.emit(HostEvent::Backchannel { peer, payload });
    }

    async fn notify_address(&self, added: bool, address: String) {
        self.emit(HostEvent::Address { added, address });
    }

    async fn notify_credit(&self, peer: PeerId, credit: u32) {
        self.emit(HostEvent::Credit { peer, credit });
    }

    async fn validate_address(&self, peer: PeerId, address: String) {
        self.emit(HostEvent::ValidateAddress { peer, address });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_host_forwards_events() {
        let (host, mut rx) = ChannelHost::new();
        let peer = PeerId::from_bytes([1u8; 32]);
        host.deliver(peer, b"hello".to_vec()).await;
        host.notify_credit(peer, 128).await;

        assert_eq!(
            rx.recv().await,
            Some(HostEvent::Delivered {
                peer,
                message: b"hello".to_vec()
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(HostEvent::Credit { peer, credit: 128 })
        );
    }
}
