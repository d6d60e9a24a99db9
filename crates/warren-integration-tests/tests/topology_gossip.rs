//! Integration test: friends file to gossip loop.
//!
//! Parses a friends file, builds the topology controller from it, and
//! walks the descriptor-gossip scenario: strength suggestions, the
//! friends-only blacklist, per-receiver pacing, and Bloom-filter
//! rotation.

use std::sync::Arc;

use warren_adapters::connectivity::MemoryConnectivity;
use warren_topology::controller::{TopologyConfig, TopologyController};
use warren_topology::friends;
use warren_topology::{FILTER_EXPIRATION, HELLO_ADVERTISEMENT_MIN_FREQUENCY};
use warren_types::{AbsoluteTime, PeerId, RelativeTime};

fn peer(byte: u8) -> PeerId {
    PeerId::from_bytes([byte; 32])
}

#[tokio::test]
async fn friends_file_drives_gossip_and_blacklist() {
    // Friends file names B; one token is garbage and gets skipped.
    let content = format!("{}\nnot-a-peer-id\n", peer(0xb));
    let friend_list = friends::parse(&content);
    assert_eq!(friend_list, vec![peer(0xb)]);

    let control = Arc::new(MemoryConnectivity::new());
    let mut topo = TopologyController::new(
        peer(0xa),
        TopologyConfig {
            friends_only: false,
            minimum_friends: 1,
            target_connection_count: 2,
        },
        control.clone(),
        friend_list,
        AbsoluteTime::ZERO,
    );
    topo.start().await;

    // Below the friend minimum: only B may connect.
    assert!(*control.blacklist.lock().await);
    assert!(topo.is_connection_allowed(&peer(0xb)));
    assert!(!topo.is_connection_allowed(&peer(0xc)));

    let now = AbsoluteTime(1_000_000);
    topo.on_peer_connected(peer(0xb), now).await;
    assert!(!*control.blacklist.lock().await, "minimum met, blacklist gone");
    topo.on_peer_connected(peer(0xc), now).await;

    // B's descriptor circulates to C, once per pacing window.
    topo.set_hello(peer(0xb), b"hello-b".to_vec(), now);
    let first = topo.find_advertisable_hello(&peer(0xc), 1200, now);
    assert_eq!(first, Some((peer(0xb), b"hello-b".to_vec())));
    topo.hello_sent(&peer(0xb), &peer(0xc), now);

    // Paced out for the receiver, and the filter blocks the repeat even
    // after the pacing window.
    assert!(topo.find_advertisable_hello(&peer(0xc), 1200, now).is_none());
    let after_pacing = now.saturating_add(HELLO_ADVERTISEMENT_MIN_FREQUENCY);
    assert!(topo
        .find_advertisable_hello(&peer(0xc), 1200, after_pacing)
        .is_none());

    // Never back to B itself.
    assert!(topo
        .find_advertisable_hello(&peer(0xb), 1200, after_pacing)
        .is_none());

    // Once the filter rotates, the repeat is permissible again.
    let after_rotation = now
        .saturating_add(FILTER_EXPIRATION)
        .saturating_add(RelativeTime::from_secs(1));
    assert_eq!(
        topo.find_advertisable_hello(&peer(0xc), 1200, after_rotation),
        Some((peer(0xb), b"hello-b".to_vec()))
    );

    // Strength suggestions reached the connection manager along the way.
    let suggestions = control.suggestions.lock().await;
    assert!(suggestions.iter().any(|(p, s)| p == &peer(0xb) && *s > 0));
}
