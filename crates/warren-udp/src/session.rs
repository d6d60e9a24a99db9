//! The sans-I/O session core.
//!
//! All communicator state lives here: per-peer shared-secret lists, the
//! session-wide kid map, ack credit, and the timeout heap. Entry points
//! take the current time and return [`Action`] values; the socket driver
//! in [`crate::io`] performs them. Nothing in this module blocks or does
//! I/O, so the whole protocol is testable with two cores wired back to
//! back.
//!
//! ## Peer roles
//!
//! For each neighbour we keep up to two independent states:
//!
//! - a *receiver* entry for traffic we send (their identity key plus our
//!   ephemeral secrets, ack credit, and the sequence budget the peer has
//!   granted us);
//! - a *sender* entry for traffic they send (the secrets their handshakes
//!   established, with outstanding key cache offers).
//!
//! Secret lists are most-recently-used first; eviction takes the tail.
//!
//! ## Failure policy
//!
//! Wire-level failures are never answered: the datagram is dropped, a
//! statistics counter is bumped, and no state is created until a
//! handshake signature verifies.

use std::collections::{BinaryHeap, HashMap};
use std::cmp::Reverse;
use std::net::SocketAddr;
use std::sync::Arc;

use warren_adapters::Statistics;
use warren_crypto::aead;
use warren_crypto::ecdh::{self, EphemeralKey};
use warren_crypto::eddsa::SigningKey;
use warren_types::{AbsoluteTime, PeerId, RelativeTime, ShortHash};

use crate::secret::SharedSecret;
use crate::wire::{self, Ack, Confirmation};
use crate::{address, Result, UdpError};

/// Tunables, all defaulting to the wire-fixed values in [`crate`].
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub kcn_threshold: u32,
    pub kcn_target: u32,
    pub max_sqn_delta: u32,
    pub max_secrets: usize,
    pub rekey_max_bytes: u64,
    pub rekey_interval: RelativeTime,
    pub queue_timeout: RelativeTime,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kcn_threshold: crate::KCN_THRESHOLD,
            kcn_target: crate::KCN_TARGET,
            max_sqn_delta: crate::MAX_SQN_DELTA,
            max_secrets: crate::MAX_SECRETS,
            rekey_max_bytes: crate::REKEY_MAX_BYTES,
            rekey_interval: crate::REKEY_TIME_INTERVAL,
            queue_timeout: crate::PROTO_QUEUE_TIMEOUT,
        }
    }
}

/// What the driver must do after a core entry point returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Write a datagram to the socket.
    Send { dst: SocketAddr, datagram: Vec<u8> },
    /// Hand decrypted payload to the upper layer.
    Deliver { peer: PeerId, message: Vec<u8> },
    /// Send an ACK to `peer` over the backchannel.
    SendAck { peer: PeerId, payload: Vec<u8> },
    /// The send budget towards `peer` changed.
    NotifyCredit { peer: PeerId, credit: u32 },
    /// A LAN broadcast advertised `address` for `peer`.
    ValidateAddress { peer: PeerId, address: String },
}

/// Which of the two per-peer states a heap entry refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Side {
    Receiver,
    Sender,
}

/// Sender-side state: a peer we transmit to.
struct ReceiverPeer {
    addr: SocketAddr,
    /// Most recently used first.
    secrets: Vec<SharedSecret>,
    ack_credit: u32,
    deadline: AbsoluteTime,
}

/// Receiver-side state: a peer that transmits to us.
struct SenderPeer {
    addr: SocketAddr,
    secrets: Vec<SharedSecret>,
    /// Highest monotonic time seen in a verified handshake; stale
    /// handshakes are replays.
    last_monotonic: AbsoluteTime,
    deadline: AbsoluteTime,
}

/// A key cache entry: resolves an incoming kid to its secret and
/// sequence in O(1).
struct KidEntry {
    peer: PeerId,
    cmac: ShortHash,
    sequence: u32,
}

/// The communicator session core.
pub struct SessionCore {
    identity: SigningKey,
    local_peer: PeerId,
    config: SessionConfig,
    receivers: HashMap<PeerId, ReceiverPeer>,
    senders: HashMap<PeerId, SenderPeer>,
    kid_map: HashMap<[u8; 32], KidEntry>,
    /// Lazy deletion heap: entries may be stale, the current deadline in
    /// the peer state is authoritative.
    deadlines: BinaryHeap<Reverse<(AbsoluteTime, Side, PeerId)>>,
    stats: Arc<dyn Statistics>,
}

impl SessionCore {
    pub fn new(identity: SigningKey, config: SessionConfig, stats: Arc<dyn Statistics>) -> Self {
        let local_peer = identity.peer_id();
        Self {
            identity,
            local_peer,
            config,
            receivers: HashMap::new(),
            senders: HashMap::new(),
            kid_map: HashMap::new(),
            deadlines: BinaryHeap::new(),
            stats,
        }
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    /// Register a peer address so we can transmit to it (the transport's
    /// "connect an MQ for peer P via address A").
    pub fn open_queue(&mut self, peer: PeerId, addr: SocketAddr, now: AbsoluteTime) {
        let deadline = now.saturating_add(self.config.queue_timeout);
        self.receivers.entry(peer).or_insert(ReceiverPeer {
            addr,
            secrets: Vec::new(),
            ack_credit: 0,
            deadline,
        });
        self.deadlines
            .push(Reverse((deadline, Side::Receiver, peer)));
    }

    /// Send `payload` to `peer`: box if credit and budget allow, fresh KX
    /// otherwise.
    pub fn send(
        &mut self,
        peer: &PeerId,
        payload: &[u8],
        now: AbsoluteTime,
    ) -> Result<Vec<Action>> {
        match self.send_box(peer, payload, now) {
            Err(UdpError::ResourceExhaustion(_)) => self.send_kx(peer, payload, now),
            other => other,
        }
    }

    /// Box path: pick the oldest secret with remaining sequence budget.
    pub fn send_box(
        &mut self,
        peer: &PeerId,
        payload: &[u8],
        now: AbsoluteTime,
    ) -> Result<Vec<Action>> {
        let config = self.config.clone();
        let stats = Arc::clone(&self.stats);
        let state = self
            .receivers
            .get_mut(peer)
            .ok_or(UdpError::UnknownPeer)?;
        if state.ack_credit == 0 {
            return Err(UdpError::ResourceExhaustion("ack credit"));
        }

        // Retire secrets past the rekey limits before selecting.
        let before = state.secrets.len();
        state
            .secrets
            .retain(|ss| !ss.needs_rekey(now, config.rekey_max_bytes, config.rekey_interval));
        let evicted = before - state.secrets.len();
        if evicted > 0 {
            stats.update("# secrets evicted", evicted as u64);
        }

        // Tail to head: drain old secrets before touching fresh ones.
        let Some(index) = state
            .secrets
            .iter()
            .rposition(|ss| ss.sequence_used < ss.sequence_allowed)
        else {
            return Err(UdpError::ResourceExhaustion("sequence budget"));
        };

        let ss = &mut state.secrets[index];
        let sequence = ss.sequence_used + 1;
        let (key, nonce) = ss.box_keys(sequence)?;
        let kid = ss.kid(sequence)?;
        let sealed = aead::seal(&key, &nonce, payload, b"")?;
        let datagram = wire::encode_box(&kid, &sealed)?;
        ss.sequence_used = sequence;
        ss.bytes_sent += payload.len() as u64;
        state.ack_credit -= 1;

        let dst = state.addr;
        let credit = state.ack_credit;
        let deadline = now.saturating_add(config.queue_timeout);
        state.deadline = deadline;
        self.deadlines
            .push(Reverse((deadline, Side::Receiver, *peer)));
        stats.update("# boxes sent", 1);

        let mut actions = vec![Action::Send { dst, datagram }];
        if credit == 0 {
            actions.push(Action::NotifyCredit {
                peer: *peer,
                credit,
            });
        }
        Ok(actions)
    }

    /// KX path: fresh ephemeral, new shared secret, confirmation plus
    /// payload encrypted at sequence 0.
    pub fn send_kx(
        &mut self,
        peer: &PeerId,
        payload: &[u8],
        now: AbsoluteTime,
    ) -> Result<Vec<Action>> {
        let config = self.config.clone();
        let stats = Arc::clone(&self.stats);
        let identity = self.identity.clone();
        let state = self
            .receivers
            .get_mut(peer)
            .ok_or(UdpError::UnknownPeer)?;

        let ephemeral = EphemeralKey::generate();
        let ephemeral_pub = ephemeral.public_bytes();
        let master = ephemeral.agree_with_identity(peer)?;
        let ss = SharedSecret::new(master, now)?;

        let confirmation = Confirmation::build(&identity, peer, &ephemeral_pub, now);
        let mut plaintext = confirmation.encode();
        plaintext.extend_from_slice(payload);

        let (key, nonce) = ss.box_keys(0)?;
        let sealed = aead::seal(&key, &nonce, &plaintext, b"")?;
        let datagram = wire::encode_kx(&ephemeral_pub, &sealed)?;

        state.secrets.insert(0, ss);
        while state.secrets.len() > config.max_secrets {
            state.secrets.pop();
            stats.update("# secrets evicted", 1);
        }

        let dst = state.addr;
        let deadline = now.saturating_add(config.queue_timeout);
        state.deadline = deadline;
        self.deadlines
            .push(Reverse((deadline, Side::Receiver, *peer)));
        stats.update("# KX initiated", 1);

        Ok(vec![Action::Send { dst, datagram }])
    }

    /// Dispatch one received datagram.
    ///
    /// Heuristic per the protocol: a kid-map hit is a box; a
    /// broadcast-sized datagram with a valid signature is a broadcast;
    /// anything long enough to hold a confirmation is tried as KX; the
    /// rest is dropped.
    pub fn handle_datagram(
        &mut self,
        src: SocketAddr,
        data: &[u8],
        now: AbsoluteTime,
    ) -> Vec<Action> {
        if data.len() >= wire::BOX_HEADER_SIZE {
            let mut kid = [0u8; 32];
            kid.copy_from_slice(&data[..32]);
            if self.kid_map.contains_key(&kid) {
                return self.handle_box(&kid, data, now).unwrap_or_else(|error| {
                    tracing::debug!(%src, %error, "box dropped");
                    Vec::new()
                });
            }
        }
        if data.len() == wire::BROADCAST_SIZE {
            if let Ok(actions) = self.handle_broadcast(src, data) {
                return actions;
            }
            // Not a valid broadcast; fall through to the KX size check.
        }
        if data.len() >= wire::KX_MIN_SIZE {
            return self.handle_kx(src, data, now).unwrap_or_else(|error| {
                tracing::debug!(%src, %error, "KX dropped");
                Vec::new()
            });
        }
        self.stats
            .update("# messages dropped (no kid, too small for KX)", 1);
        Vec::new()
    }

    fn handle_box(
        &mut self,
        kid: &[u8; 32],
        data: &[u8],
        now: AbsoluteTime,
    ) -> Result<Vec<Action>> {
        let stats = Arc::clone(&self.stats);
        let entry = self
            .kid_map
            .remove(kid)
            .ok_or(UdpError::Internal("kid vanished between lookup and use"))?;

        let Some(state) = self.senders.get_mut(&entry.peer) else {
            return Err(UdpError::UnknownPeer);
        };
        let Some(index) = state
            .secrets
            .iter()
            .position(|ss| ss.cmac() == &entry.cmac)
        else {
            return Err(UdpError::UnknownPeer);
        };

        // The entry is single-use either way.
        let ss = &mut state.secrets[index];
        ss.kcn_sequences.retain(|&s| s != entry.sequence);

        let (key, nonce) = ss.box_keys(entry.sequence)?;
        let sealed = wire::sealed_from_datagram(data, 32)?;
        let plaintext = match aead::open(&key, &nonce, &sealed, b"") {
            Ok(plaintext) => plaintext,
            Err(_) => {
                stats.update("# decryption failures with valid KCE", 1);
                return Err(UdpError::Authentication);
            }
        };

        let peer = entry.peer;
        let deadline = now.saturating_add(self.config.queue_timeout);
        state.deadline = deadline;
        self.deadlines.push(Reverse((deadline, Side::Sender, peer)));
        stats.update("# boxes received", 1);

        let mut actions = vec![Action::Deliver {
            peer,
            message: plaintext,
        }];
        actions.extend(self.consider_ack(peer, entry.cmac)?);
        Ok(actions)
    }

    fn handle_kx(
        &mut self,
        src: SocketAddr,
        data: &[u8],
        now: AbsoluteTime,
    ) -> Result<Vec<Action>> {
        let stats = Arc::clone(&self.stats);
        let mut ephemeral = [0u8; wire::EPHEMERAL_SIZE];
        ephemeral.copy_from_slice(&data[..wire::EPHEMERAL_SIZE]);

        let master = ecdh::agree_with_ephemeral(&self.identity, &ephemeral)?;
        let (key, nonce) = crate::secret::derive_box_keys(&master, 0)?;
        let sealed = wire::sealed_from_datagram(data, wire::EPHEMERAL_SIZE)?;
        let plaintext = match aead::open(&key, &nonce, &sealed, b"") {
            Ok(plaintext) => plaintext,
            Err(_) => {
                stats.update("# AEAD decryption failed", 1);
                return Err(UdpError::Authentication);
            }
        };
        if plaintext.len() < wire::CONFIRMATION_SIZE {
            stats.update("# malformed KX dropped", 1);
            return Err(UdpError::WireFormat("KX plaintext too short".into()));
        }

        let confirmation = Confirmation::parse(&plaintext[..wire::CONFIRMATION_SIZE])?;
        if confirmation.verify(&self.local_peer, &ephemeral).is_err() {
            stats.update("# sender signature invalid", 1);
            return Err(UdpError::Authentication);
        }
        let peer = confirmation.sender;

        if let Some(existing) = self.senders.get(&peer) {
            if confirmation.monotonic_time < existing.last_monotonic {
                stats.update("# KX dropped (stale monotonic time)", 1);
                return Err(UdpError::Authentication);
            }
        }

        let ss = SharedSecret::new(master, now)?;
        let cmac = *ss.cmac();
        let deadline = now.saturating_add(self.config.queue_timeout);
        let state = self.senders.entry(peer).or_insert(SenderPeer {
            addr: src,
            secrets: Vec::new(),
            last_monotonic: AbsoluteTime::ZERO,
            deadline,
        });
        state.addr = src;
        state.last_monotonic = confirmation.monotonic_time;
        state.deadline = deadline;
        state.secrets.insert(0, ss);

        while state.secrets.len() > self.config.max_secrets {
            if let Some(removed) = state.secrets.pop() {
                purge_kid_entries(&mut self.kid_map, &removed);
                stats.update("# secrets evicted", 1);
            }
        }

        self.deadlines.push(Reverse((deadline, Side::Sender, peer)));
        stats.update("# KX received", 1);

        let mut actions = Vec::new();
        if plaintext.len() > wire::CONFIRMATION_SIZE {
            actions.push(Action::Deliver {
                peer,
                message: plaintext[wire::CONFIRMATION_SIZE..].to_vec(),
            });
        }
        actions.extend(self.consider_ack(peer, cmac)?);
        Ok(actions)
    }

    fn handle_broadcast(&mut self, src: SocketAddr, data: &[u8]) -> Result<Vec<Action>> {
        let addr_string = address::address_string(&src);
        let hash = address::address_hash(&addr_string);
        let peer = match wire::verify_broadcast(data, &hash) {
            Ok(peer) => peer,
            Err(error) => {
                self.stats
                    .update("# broadcasts dropped (address mismatch)", 1);
                return Err(error);
            }
        };
        if peer == self.local_peer {
            return Ok(Vec::new());
        }
        self.stats.update("# broadcasts received", 1);
        Ok(vec![Action::ValidateAddress {
            peer,
            address: addr_string,
        }])
    }

    /// Top up the key cache for a receiving secret and announce the new
    /// sequence ceiling.
    ///
    /// Keeps the gap between the oldest and newest outstanding offer
    /// within `max_sqn_delta` by discarding old entries, then generates
    /// fresh entries up to `kcn_target` once the count falls below
    /// `kcn_threshold`.
    fn consider_ack(&mut self, peer: PeerId, cmac: ShortHash) -> Result<Vec<Action>> {
        let config = &self.config;
        let kid_map = &mut self.kid_map;
        let Some(state) = self.senders.get_mut(&peer) else {
            return Ok(Vec::new());
        };
        let Some(ss) = state.secrets.iter_mut().find(|ss| ss.cmac() == &cmac) else {
            return Ok(Vec::new());
        };

        // Bound the cache window.
        while let (Some(&oldest), Some(&newest)) =
            (ss.kcn_sequences.front(), ss.kcn_sequences.back())
        {
            if newest - oldest <= config.max_sqn_delta {
                break;
            }
            let kid = ss.kid(oldest)?;
            kid_map.remove(kid.as_bytes());
            ss.kcn_sequences.pop_front();
        }

        if (ss.kcn_sequences.len() as u32) >= config.kcn_threshold {
            return Ok(Vec::new());
        }

        while (ss.kcn_sequences.len() as u32) < config.kcn_target {
            let sequence = ss.sequence_allowed + 1;
            let kid = ss.kid(sequence)?;
            kid_map.insert(
                kid.to_bytes(),
                KidEntry {
                    peer,
                    cmac,
                    sequence,
                },
            );
            ss.kcn_sequences.push_back(sequence);
            ss.sequence_allowed = sequence;
        }

        let ack = Ack {
            sequence_max: ss.sequence_allowed,
            cmac,
        };
        Ok(vec![Action::SendAck {
            peer,
            payload: ack.encode(),
        }])
    }

    /// Handle a backchannel message from `peer` (currently only ACKs).
    pub fn handle_backchannel(
        &mut self,
        peer: &PeerId,
        data: &[u8],
        now: AbsoluteTime,
    ) -> Result<Vec<Action>> {
        let ack = Ack::parse(data)?;
        self.handle_ack(peer, &ack, now)
    }

    /// Apply an ACK: raise credit by the newly allowed sequences and
    /// promote the secret to the head of the list.
    pub fn handle_ack(
        &mut self,
        peer: &PeerId,
        ack: &Ack,
        now: AbsoluteTime,
    ) -> Result<Vec<Action>> {
        let state = self
            .receivers
            .get_mut(peer)
            .ok_or(UdpError::UnknownPeer)?;
        let Some(index) = state
            .secrets
            .iter()
            .position(|ss| ss.cmac() == &ack.cmac)
        else {
            // ACK for a secret we already evicted; harmless.
            return Ok(Vec::new());
        };

        let ss = &mut state.secrets[index];
        if ack.sequence_max <= ss.sequence_allowed {
            return Ok(Vec::new());
        }
        let delta = ack.sequence_max - ss.sequence_allowed;
        ss.sequence_allowed = ack.sequence_max;
        ss.ack_seen = true;
        state.ack_credit = state.ack_credit.saturating_add(delta);

        let promoted = state.secrets.remove(index);
        state.secrets.insert(0, promoted);

        let credit = state.ack_credit;
        let deadline = now.saturating_add(self.config.queue_timeout);
        state.deadline = deadline;
        self.deadlines
            .push(Reverse((deadline, Side::Receiver, *peer)));
        self.stats.update("# acks received", 1);

        Ok(vec![Action::NotifyCredit {
            peer: *peer,
            credit,
        }])
    }

    /// The earliest pending deadline, for timer arming.
    pub fn next_deadline(&self) -> Option<AbsoluteTime> {
        self.deadlines.peek().map(|Reverse((at, _, _))| *at)
    }

    /// Evict peers whose deadline passed without traffic.
    pub fn expire(&mut self, now: AbsoluteTime) {
        while let Some(Reverse((deadline, side, peer))) = self.deadlines.peek().copied() {
            if deadline > now {
                break;
            }
            self.deadlines.pop();
            match side {
                Side::Receiver => {
                    let current = self.receivers.get(&peer).map(|s| s.deadline);
                    match current {
                        Some(actual) if actual <= now => {
                            if let Some(state) = self.receivers.remove(&peer) {
                                for ss in &state.secrets {
                                    purge_kid_entries(&mut self.kid_map, ss);
                                }
                            }
                            self.stats.update("# peers timed out", 1);
                            tracing::debug!(?peer, "receiver state expired");
                        }
                        Some(actual) => {
                            // Refreshed since this entry was pushed.
                            self.deadlines
                                .push(Reverse((actual, Side::Receiver, peer)));
                        }
                        None => {}
                    }
                }
                Side::Sender => {
                    let current = self.senders.get(&peer).map(|s| s.deadline);
                    match current {
                        Some(actual) if actual <= now => {
                            if let Some(state) = self.senders.remove(&peer) {
                                for ss in &state.secrets {
                                    purge_kid_entries(&mut self.kid_map, ss);
                                }
                            }
                            self.stats.update("# peers timed out", 1);
                            tracing::debug!(?peer, "sender state expired");
                        }
                        Some(actual) => {
                            self.deadlines.push(Reverse((actual, Side::Sender, peer)));
                        }
                        None => {}
                    }
                }
            }
        }
    }

    /// Current send credit towards `peer`; the upper layer must not
    /// submit boxes at zero.
    pub fn ack_credit(&self, peer: &PeerId) -> u32 {
        self.receivers.get(peer).map_or(0, |s| s.ack_credit)
    }

    /// Number of live secrets on the sending side towards `peer`.
    pub fn receiver_secret_count(&self, peer: &PeerId) -> usize {
        self.receivers.get(peer).map_or(0, |s| s.secrets.len())
    }

    /// Number of live secrets established by `peer` towards us.
    pub fn sender_secret_count(&self, peer: &PeerId) -> usize {
        self.senders.get(peer).map_or(0, |s| s.secrets.len())
    }

    /// Outstanding key cache entries across all peers.
    pub fn kid_cache_len(&self) -> usize {
        self.kid_map.len()
    }

    /// A signed broadcast announcing `local_address` (our `udp-…` string).
    pub fn broadcast_datagram(&self, local_address: &str) -> Vec<u8> {
        wire::encode_broadcast(&self.identity, &address::address_hash(local_address))
    }
}

/// Remove every outstanding key cache entry belonging to `ss`.
///
/// Runs before the secret is dropped, so the cache never holds a dangling
/// reference.
fn purge_kid_entries(kid_map: &mut HashMap<[u8; 32], KidEntry>, ss: &SharedSecret) {
    for &sequence in &ss.kcn_sequences {
        if let Ok(kid) = ss.kid(sequence) {
            kid_map.remove(kid.as_bytes());
        }
    }
}
