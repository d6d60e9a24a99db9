//! The daemon's communicator host.
//!
//! A full deployment hosts the communicator inside a transport service
//! that routes deliveries and carries ACKs between peers. Standalone, the
//! daemon feeds every peer sighting into the topology task, dials back
//! addresses that LAN broadcasts advertise, and logs the rest.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use warren_adapters::CommunicatorHost;
use warren_types::PeerId;
use warren_udp::io::CommunicatorHandle;

use crate::peers::PeerEvent;

/// Standalone host: topology event feed, broadcast-driven queue opening.
pub struct DaemonHost {
    /// Set once the communicator is bound; used to dial back addresses
    /// that LAN broadcasts advertise.
    handle: Mutex<Option<CommunicatorHandle>>,
    /// Peer sightings for the topology task.
    events: mpsc::UnboundedSender<PeerEvent>,
}

impl DaemonHost {
    pub fn new(events: mpsc::UnboundedSender<PeerEvent>) -> Arc<Self> {
        Arc::new(Self {
            handle: Mutex::new(None),
            events,
        })
    }

    pub async fn attach(&self, handle: CommunicatorHandle) {
        *self.handle.lock().await = Some(handle);
    }

    fn report(&self, event: PeerEvent) {
        // A closed receiver means the topology task is shutting down.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl CommunicatorHost for DaemonHost {
    async fn deliver(&self, peer: PeerId, message: Vec<u8>) {
        tracing::info!(?peer, bytes = message.len(), "payload delivered");
        self.report(PeerEvent::Seen {
            peer,
            address: None,
        });
    }

    async fn send_backchannel(&self, peer: PeerId, _payload: Vec<u8>) {
        // Without a hosting transport there is no backchannel route; the
        // peer will fall back to a fresh KX once its budget runs out.
        tracing::debug!(?peer, "no transport backchannel, dropping ACK");
    }

    async fn notify_address(&self, added: bool, address: String) {
        if added {
            tracing::info!(%address, "address usable");
        } else {
            tracing::info!(%address, "address withdrawn");
        }
    }

    async fn notify_credit(&self, peer: PeerId, credit: u32) {
        tracing::debug!(?peer, credit, "send budget changed");
    }

    async fn validate_address(&self, peer: PeerId, address: String) {
        tracing::info!(?peer, %address, "LAN broadcast advertised peer");
        {
            let handle = self.handle.lock().await;
            if let Some(handle) = handle.as_ref() {
                if let Err(error) = handle.open_queue(peer, address.clone()).await {
                    tracing::warn!(?peer, %error, "queue open for broadcast peer failed");
                    return;
                }
            }
        }
        self.report(PeerEvent::Seen {
            peer,
            address: Some(address),
        });
    }
}
