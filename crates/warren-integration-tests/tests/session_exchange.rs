//! Integration test: two communicator session cores wired back to back.
//!
//! Drives the complete datagram protocol without sockets:
//! 1. KX establishes a shared secret and the receiver grants a full
//!    sequence budget with one ACK
//! 2. The sender drains the entire budget in boxes before needing
//!    another ACK
//! 3. Replays are suppressed, secrets rotate under the cap, and idle
//!    peers expire

use std::net::SocketAddr;
use std::sync::Arc;

use warren_adapters::statistics::MemoryStats;
use warren_crypto::eddsa::SigningKey;
use warren_types::{AbsoluteTime, RelativeTime};
use warren_udp::session::{Action, SessionConfig, SessionCore};
use warren_udp::{KCN_TARGET, PROTO_QUEUE_TIMEOUT};

struct Node {
    core: SessionCore,
    stats: Arc<MemoryStats>,
    addr: SocketAddr,
}

fn node(seed: u8, port: u16, config: SessionConfig) -> Node {
    let stats = Arc::new(MemoryStats::new());
    Node {
        core: SessionCore::new(SigningKey::from_bytes(&[seed; 32]), config, stats.clone()),
        stats,
        addr: SocketAddr::from(([127, 0, 0, 1], port)),
    }
}

/// Deliver every `Send` action from `from` into `to`, feeding ACKs back
/// to `from`. Returns the payloads `to` delivered upwards.
fn pump(from: &mut Node, to: &mut Node, actions: Vec<Action>, now: AbsoluteTime) -> Vec<Vec<u8>> {
    let mut delivered = Vec::new();
    for action in actions {
        if let Action::Send { datagram, .. } = action {
            for reaction in to.core.handle_datagram(from.addr, &datagram, now) {
                match reaction {
                    Action::Deliver { message, .. } => delivered.push(message),
                    Action::SendAck { payload, .. } => {
                        from.core
                            .handle_backchannel(&to.core.local_peer(), &payload, now)
                            .expect("ack handled");
                    }
                    _ => {}
                }
            }
        }
    }
    delivered
}

#[test]
fn full_budget_flows_from_one_ack() {
    let mut a = node(1, 1001, SessionConfig::default());
    let mut b = node(2, 1002, SessionConfig::default());
    let now = AbsoluteTime(1_000_000);

    a.core.open_queue(b.core.local_peer(), b.addr, now);
    let kx = a.core.send(&b.core.local_peer(), b"handshake payload", now).expect("kx");
    let delivered = pump(&mut a, &mut b, kx, now);
    assert_eq!(delivered, vec![b"handshake payload".to_vec()]);
    assert_eq!(a.core.ack_credit(&b.core.local_peer()), KCN_TARGET);

    // The sender can push at least the full target budget in boxes
    // before any further ACK is required.
    for i in 0..KCN_TARGET {
        let actions = a
            .core
            .send_box(&b.core.local_peer(), format!("box {i}").as_bytes(), now)
            .expect("box within budget");
        // Feed the datagram through without returning ACKs.
        for action in actions {
            if let Action::Send { datagram, .. } = action {
                let reactions = b.core.handle_datagram(a.addr, &datagram, now);
                assert!(reactions
                    .iter()
                    .any(|r| matches!(r, Action::Deliver { .. })));
            }
        }
    }
    assert_eq!(a.core.ack_credit(&b.core.local_peer()), 0);

    // One more is out of credit and budget; send() falls back to KX.
    let fallback = a
        .core
        .send(&b.core.local_peer(), b"over budget", now)
        .expect("fallback");
    assert!(matches!(&fallback[0], Action::Send { datagram, .. }
        if datagram.len() >= warren_udp::wire::KX_MIN_SIZE));
    assert_eq!(a.stats.get("# KX initiated"), 2);
    assert_eq!(b.stats.get("# boxes received"), u64::from(KCN_TARGET));
}

#[test]
fn replayed_box_never_delivers_twice() {
    let mut a = node(1, 1001, SessionConfig::default());
    let mut b = node(2, 1002, SessionConfig::default());
    let now = AbsoluteTime(1_000_000);

    a.core.open_queue(b.core.local_peer(), b.addr, now);
    let kx = a.core.send(&b.core.local_peer(), b"hello", now).expect("kx");
    pump(&mut a, &mut b, kx, now);

    let actions = a
        .core
        .send_box(&b.core.local_peer(), b"exactly once", now)
        .expect("box");
    let Action::Send { datagram, .. } = &actions[0] else {
        unreachable!("box send emits a datagram");
    };

    let mut deliveries = 0;
    for _ in 0..3 {
        for reaction in b.core.handle_datagram(a.addr, datagram, now) {
            if matches!(reaction, Action::Deliver { .. }) {
                deliveries += 1;
            }
        }
    }
    assert_eq!(deliveries, 1, "replays are silently dropped");
}

#[test]
fn secret_rotation_stays_within_cap() {
    let config = SessionConfig {
        max_secrets: 2,
        kcn_threshold: 4,
        kcn_target: 4,
        max_sqn_delta: 8,
        ..SessionConfig::default()
    };
    let mut a = node(1, 1001, config.clone());
    let mut b = node(2, 1002, config);
    let now = AbsoluteTime(1_000_000);

    a.core.open_queue(b.core.local_peer(), b.addr, now);

    // Exhaust several generations of secrets.
    for round in 0..5 {
        let kx = a
            .core
            .send_kx(&b.core.local_peer(), format!("round {round}").as_bytes(), now)
            .expect("kx");
        pump(&mut a, &mut b, kx, now);
        // Drain without returning ACKs, so the credit really runs out.
        while a.core.ack_credit(&b.core.local_peer()) > 0 {
            let Ok(actions) = a.core.send_box(&b.core.local_peer(), b"drain", now) else {
                break;
            };
            for action in actions {
                if let Action::Send { datagram, .. } = action {
                    let _ = b.core.handle_datagram(a.addr, &datagram, now);
                }
            }
        }
        assert!(a.core.receiver_secret_count(&b.core.local_peer()) <= 2);
        assert!(b.core.sender_secret_count(&a.core.local_peer()) <= 2);
    }
}

#[test]
fn idle_peers_expire_with_their_key_cache() {
    let mut a = node(1, 1001, SessionConfig::default());
    let mut b = node(2, 1002, SessionConfig::default());
    let now = AbsoluteTime(1_000_000);

    a.core.open_queue(b.core.local_peer(), b.addr, now);
    let kx = a.core.send(&b.core.local_peer(), b"hi", now).expect("kx");
    pump(&mut a, &mut b, kx, now);
    assert!(b.core.kid_cache_len() > 0);

    let idle = now
        .saturating_add(PROTO_QUEUE_TIMEOUT)
        .saturating_add(RelativeTime::from_secs(1));
    a.core.expire(idle);
    b.core.expire(idle);

    assert_eq!(a.core.receiver_secret_count(&b.core.local_peer()), 0);
    assert_eq!(b.core.sender_secret_count(&a.core.local_peer()), 0);
    assert_eq!(b.core.kid_cache_len(), 0, "no dangling key cache entries");
}
