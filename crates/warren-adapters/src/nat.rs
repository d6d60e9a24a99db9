//! NAT traversal client interface.
//!
//! The NAT service observes externally visible addresses for a bound
//! socket and reports them asynchronously as they come and go.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// One address observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NatEvent {
    /// `address` became externally reachable.
    Added { address: SocketAddr },
    /// `address` is no longer reachable.
    Removed { address: SocketAddr },
}

/// Asynchronous NAT monitor; yields events until the service shuts down.
#[async_trait]
pub trait NatMonitor: Send + Sync {
    /// Next address event, or `None` on shutdown.
    async fn next_event(&self) -> Option<NatEvent>;
}

/// A monitor that reports the bound address once and then stays silent.
///
/// This is what a deployment without a NAT service uses: the socket's own
/// address is assumed reachable.
pub struct StaticNat {
    pending: Mutex<Option<SocketAddr>>,
}

impl StaticNat {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            pending: Mutex::new(Some(address)),
        }
    }
}

#[async_trait]
impl NatMonitor for StaticNat {
    async fn next_event(&self) -> Option<NatEvent> {
        let mut pending = self.pending.lock().await;
        pending.take().map(|address| NatEvent::Added { address })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_nat_reports_once() {
        let addr: SocketAddr = "127.0.0.1:2086".parse().expect("addr");
        let nat = StaticNat::new(addr);
        assert_eq!(nat.next_event().await, Some(NatEvent::Added { address: addr }));
        assert_eq!(nat.next_event().await, None);
    }
}
