//! Live peer tracking and descriptor gossip.
//!
//! Bridges the communicator's host callbacks into the topology
//! controller: delivered traffic and validated LAN broadcasts mark peers
//! connected, and a periodic pass expires idle ones and forwards one
//! advertisable descriptor per neighbour, honoring the controller's
//! pacing and Bloom filters. In standalone mode a peer's descriptor is
//! its advertised `udp-…` address string.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use warren_topology::controller::TopologyController;
use warren_types::{AbsoluteTime, PeerId};
use warren_udp::io::CommunicatorHandle;

/// Sightings reported by the communicator host.
#[derive(Debug)]
pub enum PeerEvent {
    /// Traffic or a validated broadcast proved the peer alive. Broadcasts
    /// carry the advertised address, which doubles as the descriptor.
    Seen {
        peer: PeerId,
        address: Option<String>,
    },
}

/// Gossip pass frequency.
const GOSSIP_TICK: Duration = Duration::from_secs(30);

/// Drop peers unseen for this long (twice the communicator's own
/// queue timeout, so session state lapses first).
const PEER_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Descriptor size limit per advertisement.
const HELLO_MTU: usize = 1200;

/// Drive the topology controller until the event channel closes.
pub async fn run(
    controller: TopologyController,
    events: mpsc::UnboundedReceiver<PeerEvent>,
    handle: CommunicatorHandle,
) {
    run_with_timing(controller, events, handle, GOSSIP_TICK, PEER_IDLE_TIMEOUT).await;
}

async fn run_with_timing(
    mut controller: TopologyController,
    mut events: mpsc::UnboundedReceiver<PeerEvent>,
    handle: CommunicatorHandle,
    tick: Duration,
    idle_timeout: Duration,
) {
    controller.start().await;
    let mut last_seen: HashMap<PeerId, Instant> = HashMap::new();
    let mut ticker = tokio::time::interval(tick);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                match event {
                    PeerEvent::Seen { peer, address } => {
                        if !controller.is_connection_allowed(&peer) {
                            tracing::debug!(?peer, "blacklisted peer ignored");
                            continue;
                        }
                        let now = AbsoluteTime::now();
                        if let Some(address) = address {
                            controller.set_hello(peer, address.into_bytes(), now);
                        }
                        last_seen.insert(peer, Instant::now());
                        controller.on_peer_connected(peer, now).await;
                    }
                }
            }
            _ = ticker.tick() => {
                let now = AbsoluteTime::now();

                let idle: Vec<PeerId> = last_seen
                    .iter()
                    .filter(|(_, seen)| seen.elapsed() > idle_timeout)
                    .map(|(peer, _)| *peer)
                    .collect();
                for peer in idle {
                    last_seen.remove(&peer);
                    controller.on_peer_disconnected(peer).await;
                    tracing::debug!(?peer, "peer idle, dropped from topology");
                }

                for receiver in controller.connected_peers() {
                    let Some((subject, hello)) =
                        controller.find_advertisable_hello(&receiver, HELLO_MTU, now)
                    else {
                        continue;
                    };
                    if handle.send(receiver, hello).await.is_ok() {
                        controller.hello_sent(&subject, &receiver, now);
                    }
                }
            }
        }
    }
}
