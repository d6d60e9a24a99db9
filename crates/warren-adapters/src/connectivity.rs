//! Connectivity-suggestion interface.
//!
//! The topology controller does not dial peers itself; it hands desired
//! connection strengths to a bandwidth-allocation collaborator and tells
//! it when a friends-only blacklist applies.

use async_trait::async_trait;
use tokio::sync::Mutex;

use warren_types::PeerId;

/// Callbacks from the topology controller into the connection manager.
#[async_trait]
pub trait ConnectivityControl: Send + Sync {
    /// Ask for a connection to `peer` with the given strength; zero
    /// withdraws the suggestion.
    async fn suggest_connect(&self, peer: PeerId, strength: u32);

    /// Install or remove the friends-only blacklist. While installed, the
    /// connection manager must consult the topology controller before
    /// accepting any inbound peer.
    async fn set_blacklist(&self, installed: bool);
}

/// Records every suggestion for test assertions.
#[derive(Default)]
pub struct MemoryConnectivity {
    pub suggestions: Mutex<Vec<(PeerId, u32)>>,
    pub blacklist: Mutex<bool>,
}

impl MemoryConnectivity {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectivityControl for MemoryConnectivity {
    async fn suggest_connect(&self, peer: PeerId, strength: u32) {
        self.suggestions.lock().await.push((peer, strength));
    }

    async fn set_blacklist(&self, installed: bool) {
        *self.blacklist.lock().await = installed;
    }
}
