//! Namestore / namecache client interface.
//!
//! The namestore persists a zone's own records; the namecache keeps
//! validated blocks from the network. Both are external services; the
//! interface here is the record-lookup contract the resolver and
//! publisher rely on.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use warren_crypto::zone::ZonePublicKey;
use warren_gns::records::Record;
use warren_types::AbsoluteTime;

use crate::{AdapterError, Result};

/// One lookup result: the tuple delivered to resolution callbacks.
#[derive(Clone, Debug)]
pub struct RecordSet {
    pub zone: ZonePublicKey,
    pub expiration: AbsoluteTime,
    pub label: String,
    pub records: Vec<Record>,
}

/// Asynchronous namestore client.
#[async_trait]
pub trait Namestore: Send + Sync {
    /// Store records under `(zone, label)`.
    ///
    /// First writer wins: storing over an existing non-empty record set
    /// fails with [`AdapterError::AlreadyExists`]; the second writer
    /// observes the earlier records via [`Namestore::lookup`] and backs
    /// off. Storing an empty set deletes the label.
    async fn store(&self, set: RecordSet) -> Result<()>;

    /// Look up the records under `(zone, label)`, optionally filtered by
    /// record type ([`warren_gns::records::record_types::ANY`] matches
    /// all).
    async fn lookup(
        &self,
        zone: &ZonePublicKey,
        label: &str,
        record_type: u32,
    ) -> Result<RecordSet>;
}

/// In-memory namestore.
#[derive(Default)]
pub struct MemoryNamestore {
    entries: Mutex<HashMap<([u8; 32], String), RecordSet>>,
}

impl MemoryNamestore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Namestore for MemoryNamestore {
    async fn store(&self, set: RecordSet) -> Result<()> {
        let key = (set.zone.to_bytes(), set.label.clone());
        let mut entries = self.entries.lock().await;
        if set.records.is_empty() {
            entries.remove(&key);
            return Ok(());
        }
        if let Some(existing) = entries.get(&key) {
            if !existing.records.is_empty() {
                return Err(AdapterError::AlreadyExists);
            }
        }
        entries.insert(key, set);
        Ok(())
    }

    async fn lookup(
        &self,
        zone: &ZonePublicKey,
        label: &str,
        record_type: u32,
    ) -> Result<RecordSet> {
        let key = (zone.to_bytes(), label.to_string());
        let entries = self.entries.lock().await;
        let set = entries.get(&key).ok_or(AdapterError::NotFound)?;
        if record_type == warren_gns::records::record_types::ANY {
            return Ok(set.clone());
        }
        let filtered: Vec<Record> = set
            .records
            .iter()
            .filter(|r| r.record_type == record_type)
            .cloned()
            .collect();
        if filtered.is_empty() {
            return Err(AdapterError::NotFound);
        }
        Ok(RecordSet {
            zone: set.zone,
            expiration: set.expiration,
            label: set.label.clone(),
            records: filtered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_crypto::zone::ZonePrivateKey;
    use warren_gns::records::record_types;

    fn record(record_type: u32, data: &[u8]) -> Record {
        Record {
            record_type,
            expiration: u64::MAX,
            flags: 0,
            data: data.to_vec(),
        }
    }

    fn set(zone: &ZonePrivateKey, label: &str, records: Vec<Record>) -> RecordSet {
        RecordSet {
            zone: zone.public_key(),
            expiration: AbsoluteTime::NEVER,
            label: label.to_string(),
            records,
        }
    }

    #[tokio::test]
    async fn test_store_lookup_roundtrip() {
        let store = MemoryNamestore::new();
        let zone = ZonePrivateKey::from_seed(&[1u8; 32]);
        store
            .store(set(&zone, "www", vec![record(record_types::NICK, b"n")]))
            .await
            .expect("store");

        let found = store
            .lookup(&zone.public_key(), "www", record_types::ANY)
            .await
            .expect("lookup");
        assert_eq!(found.records.len(), 1);
    }

    #[tokio::test]
    async fn test_first_writer_wins() {
        let store = MemoryNamestore::new();
        let zone = ZonePrivateKey::from_seed(&[1u8; 32]);
        store
            .store(set(&zone, "www", vec![record(1, b"first")]))
            .await
            .expect("store");

        let second = store
            .store(set(&zone, "www", vec![record(1, b"second")]))
            .await;
        assert!(matches!(second, Err(AdapterError::AlreadyExists)));

        // The second writer observes the first writer's records.
        let found = store
            .lookup(&zone.public_key(), "www", record_types::ANY)
            .await
            .expect("lookup");
        assert_eq!(found.records[0].data, b"first");
    }

    #[tokio::test]
    async fn test_type_filter() {
        let store = MemoryNamestore::new();
        let zone = ZonePrivateKey::from_seed(&[2u8; 32]);
        store
            .store(set(
                &zone,
                "www",
                vec![record(record_types::NICK, b"n"), record(record_types::LEHO, b"l")],
            ))
            .await
            .expect("store");

        let nick = store
            .lookup(&zone.public_key(), "www", record_types::NICK)
            .await
            .expect("lookup");
        assert_eq!(nick.records.len(), 1);
        assert_eq!(nick.records[0].data, b"n");

        let missing = store
            .lookup(&zone.public_key(), "www", record_types::BOX)
            .await;
        assert!(matches!(missing, Err(AdapterError::NotFound)));
    }

    #[tokio::test]
    async fn test_empty_store_deletes() {
        let store = MemoryNamestore::new();
        let zone = ZonePrivateKey::from_seed(&[3u8; 32]);
        store
            .store(set(&zone, "www", vec![record(1, b"x")]))
            .await
            .expect("store");
        store
            .store(set(&zone, "www", vec![]))
            .await
            .expect("delete");
        assert!(store
            .lookup(&zone.public_key(), "www", record_types::ANY)
            .await
            .is_err());
    }
}
