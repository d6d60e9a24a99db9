//! The peer map and connectivity controller.
//!
//! Keeps one entry per known peer: friendship, connection state, the
//! cached peer descriptor (HELLO), and the gossip Bloom filter marking
//! which neighbours already received that descriptor. Connection
//! strengths go to the bandwidth allocator through
//! [`ConnectivityControl`]; a friends-only blacklist is installed
//! whenever the connected-friend count is below the configured minimum.

use std::collections::HashMap;
use std::sync::Arc;

use warren_adapters::ConnectivityControl;
use warren_types::{AbsoluteTime, PeerId};

use crate::bloom::BloomFilter;
use crate::{FILTER_EXPIRATION, HELLO_ADVERTISEMENT_MIN_FREQUENCY};

/// Topology options from the configuration surface.
#[derive(Clone, Debug)]
pub struct TopologyConfig {
    /// Never connect to anything but friends.
    pub friends_only: bool,
    /// Require this many connected friends before accepting strangers.
    pub minimum_friends: u32,
    /// Stop asking for more connections beyond this count.
    pub target_connection_count: u32,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            friends_only: false,
            minimum_friends: 0,
            target_connection_count: 16,
        }
    }
}

struct PeerEntry {
    connected: bool,
    is_friend: bool,
    /// Cached peer descriptor, gossiped to neighbours.
    hello: Option<Vec<u8>>,
    /// Neighbours that already received this peer's descriptor.
    filter: BloomFilter,
    filter_expires: AbsoluteTime,
    /// Receiver-side pacing: no descriptor towards this peer before then.
    next_hello_allowed: AbsoluteTime,
    strength: u32,
}

impl PeerEntry {
    fn new(peer: &PeerId, now: AbsoluteTime) -> Self {
        let mut filter = BloomFilter::new();
        // A peer must never receive its own descriptor.
        filter.insert(peer.as_bytes());
        Self {
            connected: false,
            is_friend: false,
            hello: None,
            filter,
            filter_expires: now.saturating_add(FILTER_EXPIRATION),
            next_hello_allowed: AbsoluteTime::ZERO,
            strength: 0,
        }
    }

    fn rotate_filter_if_due(&mut self, peer: &PeerId, now: AbsoluteTime) {
        if now >= self.filter_expires {
            self.filter.clear();
            self.filter.insert(peer.as_bytes());
            self.filter_expires = now.saturating_add(FILTER_EXPIRATION);
        }
    }
}

/// The topology controller.
pub struct TopologyController {
    my_id: PeerId,
    config: TopologyConfig,
    control: Arc<dyn ConnectivityControl>,
    peers: HashMap<PeerId, PeerEntry>,
    connection_count: u32,
    /// Connected friends only.
    friend_count: u32,
    blacklist_installed: bool,
}

impl TopologyController {
    pub fn new(
        my_id: PeerId,
        config: TopologyConfig,
        control: Arc<dyn ConnectivityControl>,
        friends: Vec<PeerId>,
        now: AbsoluteTime,
    ) -> Self {
        let mut controller = Self {
            my_id,
            config,
            control,
            peers: HashMap::new(),
            connection_count: 0,
            friend_count: 0,
            blacklist_installed: false,
        };
        for friend in friends {
            controller.entry_mut(friend, now).is_friend = true;
        }
        controller
    }

    /// Issue initial suggestions and install the blacklist if required.
    /// Call once after construction.
    pub async fn start(&mut self) {
        self.reconsider_blacklist().await;
        self.refresh_all().await;
    }

    fn entry_mut(&mut self, peer: PeerId, now: AbsoluteTime) -> &mut PeerEntry {
        self.peers
            .entry(peer)
            .or_insert_with(|| PeerEntry::new(&peer, now))
    }

    /// The desired-strength formula.
    fn compute_strength(&self, entry: &PeerEntry) -> u32 {
        let mut strength = u32::from(self.connection_count < self.config.target_connection_count);
        if self.friend_count < self.config.minimum_friends || self.config.friends_only {
            strength = if entry.is_friend { 10 } else { 0 };
        }
        if entry.is_friend {
            strength *= 2;
        }
        if entry.connected {
            strength *= 2;
        }
        strength
    }

    async fn refresh_peer(&mut self, peer: PeerId) {
        let Some(entry) = self.peers.get(&peer) else {
            return;
        };
        let strength = self.compute_strength(entry);
        if let Some(entry) = self.peers.get_mut(&peer) {
            if entry.strength != strength {
                entry.strength = strength;
                self.control.suggest_connect(peer, strength).await;
            }
        }
    }

    async fn refresh_all(&mut self) {
        let peers: Vec<PeerId> = self.peers.keys().copied().collect();
        for peer in peers {
            self.refresh_peer(peer).await;
        }
    }

    async fn reconsider_blacklist(&mut self) {
        let wanted =
            self.friend_count < self.config.minimum_friends || self.config.friends_only;
        if wanted != self.blacklist_installed {
            self.blacklist_installed = wanted;
            self.control.set_blacklist(wanted).await;
            tracing::debug!(installed = wanted, "friends-only blacklist changed");
        }
    }

    /// Whether an inbound connection attempt passes the blacklist.
    pub fn is_connection_allowed(&self, peer: &PeerId) -> bool {
        if !self.blacklist_installed {
            return true;
        }
        self.peers.get(peer).is_some_and(|entry| entry.is_friend)
    }

    /// Record a new connection and recompute.
    pub async fn on_peer_connected(&mut self, peer: PeerId, now: AbsoluteTime) {
        let entry = self.entry_mut(peer, now);
        if entry.connected {
            return;
        }
        entry.connected = true;
        let is_friend = entry.is_friend;
        self.connection_count += 1;
        if is_friend {
            self.friend_count += 1;
        }
        self.reconsider_blacklist().await;
        self.refresh_all().await;
    }

    /// Record a disconnect and recompute.
    pub async fn on_peer_disconnected(&mut self, peer: PeerId) {
        let Some(entry) = self.peers.get_mut(&peer) else {
            return;
        };
        if !entry.connected {
            return;
        }
        entry.connected = false;
        let is_friend = entry.is_friend;
        self.connection_count = self.connection_count.saturating_sub(1);
        if is_friend {
            self.friend_count = self.friend_count.saturating_sub(1);
        }
        self.reconsider_blacklist().await;
        self.refresh_all().await;
    }

    /// Cache a fresh descriptor for `peer`.
    pub fn set_hello(&mut self, peer: PeerId, hello: Vec<u8>, now: AbsoluteTime) {
        self.entry_mut(peer, now).hello = Some(hello);
    }

    /// Pick a descriptor worth sending to `receiver`.
    ///
    /// Scans all peer entries for the first whose descriptor fits `mtu`,
    /// is not our own or the receiver's, and is not already marked in
    /// that descriptor's Bloom filter. Honors the per-receiver pacing.
    pub fn find_advertisable_hello(
        &mut self,
        receiver: &PeerId,
        mtu: usize,
        now: AbsoluteTime,
    ) -> Option<(PeerId, Vec<u8>)> {
        let receiver_entry = self.peers.get(receiver)?;
        if now < receiver_entry.next_hello_allowed {
            return None;
        }

        for (peer, entry) in self.peers.iter_mut() {
            if peer == &self.my_id || peer == receiver {
                continue;
            }
            entry.rotate_filter_if_due(peer, now);
            let Some(hello) = &entry.hello else {
                continue;
            };
            if hello.len() > mtu {
                continue;
            }
            if entry.filter.contains(receiver.as_bytes()) {
                continue;
            }
            return Some((*peer, hello.clone()));
        }
        None
    }

    /// Record that `subject`'s descriptor went to `receiver`: mark the
    /// filter and push the receiver's next advertisement out by the
    /// minimum frequency.
    pub fn hello_sent(&mut self, subject: &PeerId, receiver: &PeerId, now: AbsoluteTime) {
        if let Some(entry) = self.peers.get_mut(subject) {
            entry.filter.insert(receiver.as_bytes());
        }
        if let Some(entry) = self.peers.get_mut(receiver) {
            entry.next_hello_allowed =
                now.saturating_add(HELLO_ADVERTISEMENT_MIN_FREQUENCY);
        }
    }

    /// The peers currently marked connected; gossip passes iterate these
    /// as receivers.
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.peers
            .iter()
            .filter(|(_, entry)| entry.connected)
            .map(|(peer, _)| *peer)
            .collect()
    }

    pub fn connection_count(&self) -> u32 {
        self.connection_count
    }

    pub fn friend_count(&self) -> u32 {
        self.friend_count
    }
}
