//! DHT client interface.
//!
//! The real DHT is an external service; the core only puts and gets
//! opaque signed blocks under 64-byte keys. [`MemoryDht`] backs tests and
//! single-process operation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use warren_types::{AbsoluteTime, HashCode};

use crate::Result;

/// Options for a DHT put.
#[derive(Clone, Copy, Debug)]
pub struct PutOptions {
    /// Desired replication level.
    pub replication: u32,
    /// Entry expiration; storage nodes drop the block afterwards.
    pub expiration: AbsoluteTime,
}

/// Asynchronous DHT client.
#[async_trait]
pub trait Dht: Send + Sync {
    /// Publish `data` under `key`.
    async fn put(&self, key: HashCode, data: Vec<u8>, options: PutOptions) -> Result<()>;

    /// Fetch all known blocks under `key`. An empty result is not an
    /// error; lookups race replication.
    async fn get(&self, key: HashCode) -> Result<Vec<Vec<u8>>>;
}

/// In-memory DHT: a map from key to stored blocks with expirations.
#[derive(Default)]
pub struct MemoryDht {
    entries: Mutex<HashMap<[u8; 64], Vec<(Vec<u8>, AbsoluteTime)>>>,
}

impl MemoryDht {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Dht for MemoryDht {
    async fn put(&self, key: HashCode, data: Vec<u8>, options: PutOptions) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries
            .entry(key.to_bytes())
            .or_default()
            .push((data, options.expiration));
        Ok(())
    }

    async fn get(&self, key: HashCode) -> Result<Vec<Vec<u8>>> {
        let now = AbsoluteTime::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key.as_bytes())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|(_, expiration)| *expiration >= now)
                    .map(|(data, _)| data.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
