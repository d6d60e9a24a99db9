//! The tokio socket driver.
//!
//! One task owns the socket and the [`SessionCore`]; everything else
//! talks to it through a [`CommunicatorHandle`]. The loop multiplexes
//! four wake sources: datagram arrival, commands from the transport
//! layer, the earliest session deadline, and the broadcast schedule.
//! Between wakeups nothing runs, matching the cooperative single-threaded
//! model of the protocol.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use warren_adapters::{CommunicatorHost, NatEvent, NatMonitor, Statistics};
use warren_crypto::eddsa::SigningKey;
use warren_types::{AbsoluteTime, PeerId, RelativeTime};

use crate::address;
use crate::broadcast::{BroadcastSchedule, MULTICAST_GROUP_V6};
use crate::session::{Action, SessionConfig, SessionCore};
use crate::{Result, UdpError};

/// Largest datagram the driver will read.
const RECV_BUFFER_SIZE: usize = 65536;

/// Sleep horizon when no deadline is pending.
const IDLE_SLEEP: RelativeTime = RelativeTime::from_hours(1);

/// Communicator configuration derived from the `[udp]` config section.
#[derive(Clone, Debug)]
pub struct CommunicatorConfig {
    /// Bind specification per [`address::parse_bind_spec`].
    pub bind_spec: String,
    pub disable_v6: bool,
    pub disable_broadcast: bool,
    pub session: SessionConfig,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            bind_spec: String::new(),
            disable_v6: false,
            disable_broadcast: false,
            session: SessionConfig::default(),
        }
    }
}

/// Commands from the transport layer into the driver task.
#[derive(Debug)]
pub enum Command {
    /// Make `peer` reachable at `address` (a `udp-…` string).
    OpenQueue { peer: PeerId, address: String },
    /// Send a payload to an opened peer.
    Send { peer: PeerId, payload: Vec<u8> },
    /// A backchannel message (ACK) arrived from `peer`.
    Backchannel { peer: PeerId, payload: Vec<u8> },
}

/// Cheap cloneable handle to a running communicator.
#[derive(Clone)]
pub struct CommunicatorHandle {
    commands: mpsc::Sender<Command>,
    local_addr: SocketAddr,
    local_peer: PeerId,
}

impl CommunicatorHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    pub async fn open_queue(&self, peer: PeerId, address: String) -> Result<()> {
        self.commands
            .send(Command::OpenQueue { peer, address })
            .await
            .map_err(|_| UdpError::Internal("communicator task gone"))
    }

    pub async fn send(&self, peer: PeerId, payload: Vec<u8>) -> Result<()> {
        self.commands
            .send(Command::Send { peer, payload })
            .await
            .map_err(|_| UdpError::Internal("communicator task gone"))
    }

    pub async fn backchannel(&self, peer: PeerId, payload: Vec<u8>) -> Result<()> {
        self.commands
            .send(Command::Backchannel { peer, payload })
            .await
            .map_err(|_| UdpError::Internal("communicator task gone"))
    }
}

/// The socket driver. Create with [`UdpCommunicator::bind`], then [`run`]
/// it on the runtime.
///
/// [`run`]: UdpCommunicator::run
pub struct UdpCommunicator {
    socket: UdpSocket,
    local_addr: SocketAddr,
    core: SessionCore,
    host: Arc<dyn CommunicatorHost>,
    nat: Option<Arc<dyn NatMonitor>>,
    commands: mpsc::Receiver<Command>,
    broadcasts: Vec<BroadcastSchedule>,
}

impl UdpCommunicator {
    /// Bind the socket and assemble the driver.
    pub async fn bind(
        identity: SigningKey,
        config: CommunicatorConfig,
        host: Arc<dyn CommunicatorHost>,
        nat: Option<Arc<dyn NatMonitor>>,
        stats: Arc<dyn Statistics>,
    ) -> Result<(Self, CommunicatorHandle)> {
        let bind_addr = address::parse_bind_spec(&config.bind_spec, config.disable_v6)?;
        let socket = UdpSocket::bind(bind_addr).await?;
        let local_addr = socket.local_addr()?;
        tracing::info!(%local_addr, "UDP communicator bound");

        let mut broadcasts = Vec::new();
        if !config.disable_broadcast {
            if let Err(error) = socket.set_broadcast(true) {
                tracing::warn!(%error, "broadcast unavailable on this socket");
            } else {
                let now = AbsoluteTime::now();
                broadcasts.push(BroadcastSchedule::new(
                    SocketAddr::new(IpAddr::V4(std::net::Ipv4Addr::BROADCAST), local_addr.port()),
                    crate::BROADCAST_FREQUENCY,
                    now,
                ));
                if !config.disable_v6 {
                    match socket.join_multicast_v6(&MULTICAST_GROUP_V6, 0) {
                        Ok(()) => broadcasts.push(BroadcastSchedule::new(
                            SocketAddr::new(IpAddr::V6(MULTICAST_GROUP_V6), local_addr.port()),
                            crate::BROADCAST_FREQUENCY,
                            now,
                        )),
                        Err(error) => {
                            tracing::debug!(%error, "IPv6 multicast group join failed")
                        }
                    }
                }
            }
        }

        let core = SessionCore::new(identity, config.session, stats);
        let (tx, rx) = mpsc::channel(1024);
        let handle = CommunicatorHandle {
            commands: tx,
            local_addr,
            local_peer: core.local_peer(),
        };
        Ok((
            Self {
                socket,
                local_addr,
                core,
                host,
                nat,
                commands: rx,
                broadcasts,
            },
            handle,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Drive the communicator until every handle is dropped.
    pub async fn run(mut self) -> Result<()> {
        // The bound address is usable immediately; NAT-discovered ones
        // follow asynchronously.
        self.host
            .notify_address(true, address::address_string(&self.local_addr))
            .await;

        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            let now = AbsoluteTime::now();
            let sleep_for = self.next_wakeup(now);

            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, src)) => {
                            let now = AbsoluteTime::now();
                            let actions = self.core.handle_datagram(src, &buf[..len], now);
                            self.perform(actions).await;
                        }
                        Err(error) => {
                            tracing::warn!(%error, "socket receive failed");
                        }
                    }
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    self.handle_command(command).await;
                }
                event = poll_nat(&self.nat) => {
                    match event {
                        Some(event) => self.handle_nat_event(event).await,
                        None => self.nat = None,
                    }
                }
                () = tokio::time::sleep(sleep_for.to_duration()) => {
                    let now = AbsoluteTime::now();
                    self.core.expire(now);
                    self.send_due_broadcasts(now).await;
                }
            }
        }

        self.host
            .notify_address(false, address::address_string(&self.local_addr))
            .await;
        Ok(())
    }

    /// The earlier of the session deadline and the broadcast schedule.
    fn next_wakeup(&self, now: AbsoluteTime) -> RelativeTime {
        let mut earliest = now.saturating_add(IDLE_SLEEP);
        if let Some(deadline) = self.core.next_deadline() {
            earliest = earliest.min(deadline);
        }
        for schedule in &self.broadcasts {
            earliest = earliest.min(schedule.next_due());
        }
        earliest.saturating_duration_since(now)
    }

    async fn handle_command(&mut self, command: Command) {
        let now = AbsoluteTime::now();
        match command {
            Command::OpenQueue { peer, address } => {
                match address::parse_address_string(&address) {
                    Ok(addr) => self.core.open_queue(peer, addr, now),
                    Err(error) => {
                        tracing::warn!(?peer, %address, %error, "queue open rejected");
                    }
                }
            }
            Command::Send { peer, payload } => match self.core.send(&peer, &payload, now) {
                Ok(actions) => self.perform(actions).await,
                Err(error) => {
                    tracing::debug!(?peer, %error, "send failed");
                }
            },
            Command::Backchannel { peer, payload } => {
                match self.core.handle_backchannel(&peer, &payload, now) {
                    Ok(actions) => self.perform(actions).await,
                    Err(error) => {
                        tracing::debug!(?peer, %error, "backchannel message rejected");
                    }
                }
            }
        }
    }

    async fn handle_nat_event(&mut self, event: NatEvent) {
        match event {
            NatEvent::Added { address } => {
                self.host
                    .notify_address(true, address::address_string(&address))
                    .await;
            }
            NatEvent::Removed { address } => {
                self.host
                    .notify_address(false, address::address_string(&address))
                    .await;
            }
        }
    }

    async fn send_due_broadcasts(&mut self, now: AbsoluteTime) {
        let local = address::address_string(&self.local_addr);
        for schedule in &mut self.broadcasts {
            if !schedule.is_due(now) {
                continue;
            }
            let datagram = self.core.broadcast_datagram(&local);
            if let Err(error) = self.socket.send_to(&datagram, schedule.destination()).await {
                tracing::debug!(%error, dst = %schedule.destination(), "broadcast send failed");
            }
            schedule.mark_sent(now, &mut rand::thread_rng());
        }
    }

    async fn perform(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send { dst, datagram } => {
                    if let Err(error) = self.socket.send_to(&datagram, dst).await {
                        tracing::debug!(%error, %dst, "datagram send failed");
                    }
                }
                Action::Deliver { peer, message } => {
                    self.host.deliver(peer, message).await;
                }
                Action::SendAck { peer, payload } => {
                    self.host.send_backchannel(peer, payload).await;
                }
                Action::NotifyCredit { peer, credit } => {
                    self.host.notify_credit(peer, credit).await;
                }
                Action::ValidateAddress { peer, address } => {
                    self.host.validate_address(peer, address).await;
                }
            }
        }
    }
}

/// Wait on the NAT monitor, or forever once it is gone.
async fn poll_nat(nat: &Option<Arc<dyn NatMonitor>>) -> Option<NatEvent> {
    match nat {
        Some(monitor) => monitor.next_event().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_adapters::communicator::{ChannelHost, HostEvent};
    use warren_adapters::statistics::MemoryStats;

    async fn start_node(
        seed: u8,
    ) -> (
        CommunicatorHandle,
        mpsc::UnboundedReceiver<HostEvent>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let (host, events) = ChannelHost::new();
        let config = CommunicatorConfig {
            bind_spec: "127.0.0.1:0".to_string(),
            disable_v6: true,
            disable_broadcast: true,
            ..CommunicatorConfig::default()
        };
        let (driver, handle) = UdpCommunicator::bind(
            SigningKey::from_bytes(&[seed; 32]),
            config,
            Arc::new(host),
            None,
            Arc::new(MemoryStats::new()),
        )
        .await
        .expect("bind");
        let task = tokio::spawn(driver.run());
        (handle, events, task)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<HostEvent>) -> HostEvent {
        tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("event within timeout")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_two_nodes_exchange_over_loopback() {
        let (a, mut a_events, _a_task) = start_node(0x21).await;
        let (b, mut b_events, _b_task) = start_node(0x22).await;

        // Both announce their bound address first.
        assert!(matches!(
            next_event(&mut a_events).await,
            HostEvent::Address { added: true, .. }
        ));
        assert!(matches!(
            next_event(&mut b_events).await,
            HostEvent::Address { added: true, .. }
        ));

        a.open_queue(
            b.local_peer(),
            address::address_string(&b.local_addr()),
        )
        .await
        .expect("open queue");
        a.send(b.local_peer(), b"ping over loopback".to_vec())
            .await
            .expect("send");

        // B delivers the payload and emits an ACK for the backchannel.
        let mut delivered = None;
        let mut ack = None;
        for _ in 0..2 {
            match next_event(&mut b_events).await {
                HostEvent::Delivered { peer, message } => {
                    assert_eq!(peer, a.local_peer());
                    delivered = Some(message);
                }
                HostEvent::Backchannel { peer, payload } => {
                    assert_eq!(peer, a.local_peer());
                    ack = Some(payload);
                }
                other => unreachable!("unexpected event {other:?}"),
            }
        }
        assert_eq!(delivered.expect("delivered"), b"ping over loopback");

        // Route the ACK back to A; A's credit notification follows.
        a.backchannel(b.local_peer(), ack.expect("ack")).await.expect("route ack");
        assert!(matches!(
            next_event(&mut a_events).await,
            HostEvent::Credit { credit, .. } if credit == crate::KCN_TARGET
        ));

        // Subsequent messages ride boxes and still arrive.
        a.send(b.local_peer(), b"boxed".to_vec()).await.expect("send");
        assert!(matches!(
            next_event(&mut b_events).await,
            HostEvent::Delivered { message, .. } if message == b"boxed"
        ));
    }
}
