//! Namecache client interface.
//!
//! The namecache keeps validated blocks fetched from the network so
//! repeated lookups for popular names skip the DHT. Entries are keyed by
//! the derived query hash and expire with their block; the cache never
//! stores anything a resolver has not verified.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use warren_types::{AbsoluteTime, HashCode};

use crate::Result;

/// Asynchronous block cache.
#[async_trait]
pub trait Namecache: Send + Sync {
    /// Cache a validated block under its query hash.
    async fn cache_block(
        &self,
        query: HashCode,
        block: Vec<u8>,
        expiration: AbsoluteTime,
    ) -> Result<()>;

    /// Fetch a cached, unexpired block.
    async fn lookup_block(&self, query: &HashCode) -> Result<Option<Vec<u8>>>;
}

/// In-memory namecache.
#[derive(Default)]
pub struct MemoryNamecache {
    entries: Mutex<HashMap<[u8; 64], (Vec<u8>, AbsoluteTime)>>,
}

impl MemoryNamecache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Namecache for MemoryNamecache {
    async fn cache_block(
        &self,
        query: HashCode,
        block: Vec<u8>,
        expiration: AbsoluteTime,
    ) -> Result<()> {
        let mut entries = self.entries.lock().await;
        // A newer block for the same query replaces the old one only if
        // it lives longer; blocks with later expirations supersede.
        match entries.get(query.as_bytes()) {
            Some((_, existing)) if *existing > expiration => {}
            _ => {
                entries.insert(query.to_bytes(), (block, expiration));
            }
        }
        Ok(())
    }

    async fn lookup_block(&self, query: &HashCode) -> Result<Option<Vec<u8>>> {
        let now = AbsoluteTime::now();
        let entries = self.entries.lock().await;
        Ok(entries.get(query.as_bytes()).and_then(|(block, expiration)| {
            if *expiration >= now {
                Some(block.clone())
            } else {
                None
            }
        }))
    }
}
