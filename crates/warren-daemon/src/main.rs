//! warren-daemon: the Warren node daemon.
//!
//! Composition root for a single node: binds the UDP communicator,
//! drives the topology controller from the communicator's peer
//! sightings, and keeps the zone's own record published through the
//! naming service. All services share one Tokio runtime; the
//! communicator core itself is single-threaded.

mod config;
mod host;
mod keys;
mod naming;
mod peers;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use warren_adapters::statistics::MemoryStats;
use warren_crypto::eddsa::SigningKey;
use warren_crypto::zone::ZonePrivateKey;
use warren_topology::controller::{TopologyConfig, TopologyController};
use warren_topology::friends;
use warren_udp::io::{CommunicatorConfig, UdpCommunicator};
use warren_udp::session::SessionConfig;
use warren_types::AbsoluteTime;

use crate::config::DaemonConfig;
use crate::host::DaemonHost;
use crate::naming::NamingService;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("warren=info".parse()?),
        )
        .init();

    info!("Warren daemon starting");

    // 1. Load config and prepare the data directory
    let config = DaemonConfig::load()?;
    let data_dir = DaemonConfig::data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 2. Load (or create) the identity and zone keys
    let identity_seed = keys::load_or_create_seed(&data_dir.join("identity.key"))?;
    let identity = SigningKey::from_bytes(&identity_seed);
    let zone_seed = keys::load_or_create_seed(&data_dir.join("zone.key"))?;
    let zone = ZonePrivateKey::from_seed(&zone_seed);
    info!(peer = %identity.peer_id(), "node identity loaded");
    info!(zone = ?zone.public_key(), "zone key loaded");

    // 3. Statistics service (in-process)
    let stats = Arc::new(MemoryStats::new());

    // 4. Bind the UDP communicator; peer sightings flow into the
    //    topology task through the event channel
    let (peer_events_tx, peer_events_rx) = mpsc::unbounded_channel();
    let daemon_host = DaemonHost::new(peer_events_tx);
    let communicator_config = CommunicatorConfig {
        bind_spec: config.udp.bindto.clone(),
        disable_v6: config.udp.disable_v6,
        disable_broadcast: config.udp.disable_broadcast,
        session: SessionConfig::default(),
    };
    let (communicator, handle) = UdpCommunicator::bind(
        identity,
        communicator_config,
        daemon_host.clone(),
        None,
        stats.clone(),
    )
    .await?;
    daemon_host.attach(handle.clone()).await;
    let communicator_task = tokio::spawn(communicator.run());

    // 5. Topology controller over the friends file, driven by the peer
    //    events and a periodic gossip pass
    let friend_list = friends::load(&config.friends_path())?;
    info!(friends = friend_list.len(), "friends file loaded");
    let connectivity = Arc::new(warren_adapters::connectivity::MemoryConnectivity::new());
    let topology = TopologyController::new(
        handle.local_peer(),
        TopologyConfig {
            friends_only: config.topology.friends_only,
            minimum_friends: config.topology.minimum_friends,
            target_connection_count: config.topology.target_connection_count,
        },
        connectivity,
        friend_list,
        AbsoluteTime::now(),
    );
    tokio::spawn(peers::run(topology, peer_events_rx, handle.clone()));

    // 6. Naming service over the DHT client; the publisher task keeps the
    //    zone's own record alive
    let dht = Arc::new(warren_adapters::dht::MemoryDht::new());
    let naming = Arc::new(NamingService::new(dht, &config.gns));
    let nickname = if config.gns.nickname.is_empty() {
        handle.local_peer().to_string()
    } else {
        config.gns.nickname.clone()
    };
    tokio::spawn(naming.run_zone_publisher(zone, nickname));
    info!("naming service running");

    // 7. Run until interrupted
    tokio::select! {
        result = communicator_task => {
            match result {
                Ok(Ok(())) => info!("communicator finished"),
                Ok(Err(error)) => tracing::error!(%error, "communicator failed"),
                Err(error) => tracing::error!(%error, "communicator task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    Ok(())
}
