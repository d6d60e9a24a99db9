//! The naming service: publisher and resolver glue.
//!
//! Publishing serializes a label's records, seals and signs them into a
//! block, and puts the block into the DHT under the derived query key.
//! Resolution derives the same query from the public zone key, consults
//! the namecache, falls back to the DHT, and keeps the first block that
//! verifies and decrypts. Multi-label names resolve by walking
//! delegation records zone by zone. Revoked zones never resolve.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::Semaphore;

use warren_adapters::dht::{Dht, PutOptions};
use warren_adapters::namecache::{MemoryNamecache, Namecache};
use warren_crypto::zone::{ZonePrivateKey, ZonePublicKey};
use warren_gns::block;
use warren_gns::records::{self, flags, record_types, Record};
use warren_gns::revocation::{RevocationStatement, RevocationStore};
use warren_types::{AbsoluteTime, RelativeTime};

use crate::config::GnsConfig;

/// Ceiling on delegation hops during multi-label resolution.
const MAX_RESOLUTION_DEPTH: usize = 32;

/// The root label a zone's own nickname record lives under.
const ZONE_NICK_LABEL: &str = "+";

/// Lifetime of the self-published nickname record.
const ZONE_NICK_LIFETIME: RelativeTime = RelativeTime::from_hours(4);

/// Republish well inside the record lifetime so the name never lapses.
const REPUBLISH_INTERVAL: Duration = Duration::from_secs(3600);

/// Publisher + resolver over one DHT client.
pub struct NamingService {
    dht: Arc<dyn Dht>,
    cache: Arc<dyn Namecache>,
    revocations: Mutex<RevocationStore>,
    replication: u32,
    lookup_timeout: Duration,
    dht_timeout: Duration,
    /// Bounds concurrent background lookups.
    queries: Arc<Semaphore>,
}

impl NamingService {
    pub fn new(dht: Arc<dyn Dht>, config: &GnsConfig) -> Self {
        Self::with_cache(dht, Arc::new(MemoryNamecache::new()), config)
    }

    pub fn with_cache(
        dht: Arc<dyn Dht>,
        cache: Arc<dyn Namecache>,
        config: &GnsConfig,
    ) -> Self {
        Self {
            dht,
            cache,
            revocations: Mutex::new(RevocationStore::new()),
            replication: config.dht_replication_level,
            lookup_timeout: Duration::from_secs(config.lookup_timeout_secs),
            dht_timeout: Duration::from_secs(config.dht_timeout_secs),
            queries: Arc::new(Semaphore::new(
                config.max_parallel_background_queries as usize,
            )),
        }
    }

    /// Publish `records` under `(zone, label)`.
    pub async fn publish(
        &self,
        zone: &ZonePrivateKey,
        label: &str,
        records: &[Record],
    ) -> anyhow::Result<()> {
        let now = AbsoluteTime::now();
        let expiration = records::block_expiration(records, now);
        let block = block::create(zone, expiration, label, records, now)
            .context("creating record block")?;
        let query = block::query_from_private_key(zone, label)?;

        tokio::time::timeout(
            self.dht_timeout,
            self.dht.put(
                query,
                block.to_bytes(),
                PutOptions {
                    replication: self.replication,
                    expiration,
                },
            ),
        )
        .await
        .context("DHT put timed out")?
        .context("DHT put failed")?;

        tracing::debug!(label, records = records.len(), "block published");
        Ok(())
    }

    /// Publish the zone's nickname record under the root label.
    ///
    /// The record carries a relative expiration; block creation pins it
    /// to the publish time, so each republish extends the name's life.
    pub async fn publish_zone_nick(
        &self,
        zone: &ZonePrivateKey,
        nickname: &str,
    ) -> anyhow::Result<()> {
        let record = Record {
            record_type: record_types::NICK,
            expiration: ZONE_NICK_LIFETIME.as_micros(),
            flags: flags::RELATIVE_EXPIRATION,
            data: nickname.as_bytes().to_vec(),
        };
        self.publish(zone, ZONE_NICK_LABEL, std::slice::from_ref(&record))
            .await
    }

    /// Keep the zone's nickname record alive: publish immediately, then
    /// once an hour, verifying after each pass that the record resolves
    /// through the regular lookup path.
    pub async fn run_zone_publisher(self: Arc<Self>, zone: ZonePrivateKey, nickname: String) {
        let mut ticker = tokio::time::interval(REPUBLISH_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(error) = self.publish_zone_nick(&zone, &nickname).await {
                tracing::warn!(%error, "zone republish failed");
                continue;
            }
            match self
                .lookup(&zone.public_key(), ZONE_NICK_LABEL, record_types::NICK)
                .await
            {
                Ok(found) if !found.is_empty() => {
                    tracing::debug!(nickname = %nickname, "zone record republished and resolvable");
                }
                Ok(_) => {
                    tracing::warn!("own zone record did not resolve after publish");
                }
                Err(error) => {
                    tracing::warn!(%error, "self-lookup after publish failed");
                }
            }
        }
    }

    /// Admit a revocation statement; subsequent lookups under that zone
    /// yield nothing.
    pub fn revoke(&self, statement: &RevocationStatement) -> anyhow::Result<()> {
        let mut store = self
            .revocations
            .lock()
            .map_err(|_| anyhow::anyhow!("revocation store poisoned"))?;
        store.add(statement).context("admitting revocation")?;
        Ok(())
    }

    fn is_revoked(&self, zone: &ZonePublicKey) -> bool {
        self.revocations
            .lock()
            .map(|store| store.is_revoked(zone))
            .unwrap_or(false)
    }

    /// Resolve a single label under `zone_pub`, keeping records of
    /// `record_type` ([`record_types::ANY`] keeps all).
    ///
    /// An empty result means nothing resolvable was found; a timeout
    /// surfaces as an error for the caller's completion callback.
    pub async fn lookup(
        &self,
        zone_pub: &ZonePublicKey,
        label: &str,
        record_type: u32,
    ) -> anyhow::Result<Vec<Record>> {
        if self.is_revoked(zone_pub) {
            tracing::debug!(label, "zone is revoked, refusing lookup");
            return Ok(Vec::new());
        }

        let _permit = self
            .queries
            .acquire()
            .await
            .context("query limiter closed")?;
        let query = block::query_from_public_key(zone_pub, label)?;
        let now = AbsoluteTime::now();

        // Cached blocks skip the DHT entirely.
        if let Ok(Some(raw)) = self.cache.lookup_block(&query).await {
            if let Some((_, records)) = decode_candidate(&raw, zone_pub, label, now) {
                return Ok(filter_records(records, record_type));
            }
        }

        let candidates = tokio::time::timeout(self.lookup_timeout, self.dht.get(query))
            .await
            .context("lookup timed out")?
            .context("DHT get failed")?;

        for raw in candidates {
            let Some((parsed, records)) = decode_candidate(&raw, zone_pub, label, now) else {
                continue;
            };
            if let Err(error) = self
                .cache
                .cache_block(query, raw.clone(), parsed.expiration)
                .await
            {
                tracing::debug!(%error, "namecache store failed");
            }
            return Ok(filter_records(records, record_type));
        }
        Ok(Vec::new())
    }

    /// Resolve a dotted name under `root`, following delegation records
    /// right to left: `"www.alice"` looks up the delegation for
    /// `"alice"` in the root zone, then `"www"` in Alice's zone.
    pub async fn resolve(
        &self,
        root: &ZonePublicKey,
        name: &str,
        record_type: u32,
    ) -> anyhow::Result<Vec<Record>> {
        let labels: Vec<&str> = name.split('.').filter(|l| !l.is_empty()).collect();
        if labels.is_empty() {
            anyhow::bail!("empty name");
        }
        if labels.len() > MAX_RESOLUTION_DEPTH {
            anyhow::bail!("name has more than {MAX_RESOLUTION_DEPTH} labels");
        }

        let mut zone = *root;
        for (hop, label) in labels.iter().rev().enumerate() {
            let terminal = hop == labels.len() - 1;
            if terminal {
                return self.lookup(&zone, label, record_type).await;
            }

            let delegations = self
                .lookup(&zone, label, record_types::DELEGATION)
                .await?;
            let Some(delegation) = delegations.first() else {
                tracing::debug!(label, "no delegation, name does not resolve");
                return Ok(Vec::new());
            };
            let key: [u8; 32] = delegation.data.as_slice().try_into().map_err(|_| {
                anyhow::anyhow!(
                    "delegation record has {} bytes, expected 32",
                    delegation.data.len()
                )
            })?;
            zone = ZonePublicKey::from_bytes(key);
        }
        Ok(Vec::new())
    }
}

/// Parse, verify and decrypt one candidate block; `None` discards it.
fn decode_candidate(
    raw: &[u8],
    zone_pub: &ZonePublicKey,
    label: &str,
    now: AbsoluteTime,
) -> Option<(block::Block, Vec<Record>)> {
    let parsed = match block::Block::from_bytes(raw) {
        Ok(parsed) => parsed,
        Err(error) => {
            tracing::debug!(%error, "discarding malformed block");
            return None;
        }
    };
    if block::verify(&parsed).is_err() {
        tracing::debug!(label, "discarding block with bad signature");
        return None;
    }
    match block::decrypt(&parsed, zone_pub, label, now) {
        Ok(records) => Some((parsed, records)),
        Err(error) => {
            tracing::debug!(%error, "discarding undecryptable block");
            None
        }
    }
}

fn filter_records(records: Vec<Record>, record_type: u32) -> Vec<Record> {
    records
        .into_iter()
        .filter(|r| record_type == record_types::ANY || r.record_type == record_type)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_adapters::dht::MemoryDht;
    use warren_gns::records::flags;

    fn service() -> NamingService {
        NamingService::new(Arc::new(MemoryDht::new()), &GnsConfig::default())
    }

    fn record(record_type: u32, data: &[u8]) -> Record {
        Record {
            record_type,
            expiration: u64::MAX,
            flags: 0,
            data: data.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_publish_then_lookup() {
        let naming = service();
        let zone = ZonePrivateKey::from_seed(&[0x42u8; 32]);
        let rds = vec![record(record_types::NICK, b"alice")];

        naming.publish(&zone, "www", &rds).await.expect("publish");
        let found = naming
            .lookup(&zone.public_key(), "www", record_types::ANY)
            .await
            .expect("lookup");
        assert_eq!(found, rds);
    }

    #[tokio::test]
    async fn test_lookup_type_filter() {
        let naming = service();
        let zone = ZonePrivateKey::from_seed(&[0x42u8; 32]);
        let rds = vec![
            record(record_types::NICK, b"alice"),
            record(record_types::LEHO, b"alice.example"),
        ];
        naming.publish(&zone, "www", &rds).await.expect("publish");

        let nick = naming
            .lookup(&zone.public_key(), "www", record_types::NICK)
            .await
            .expect("lookup");
        assert_eq!(nick.len(), 1);
        assert_eq!(nick[0].data, b"alice");
    }

    #[tokio::test]
    async fn test_lookup_unknown_label_empty() {
        let naming = service();
        let zone = ZonePrivateKey::from_seed(&[0x42u8; 32]);
        let found = naming
            .lookup(&zone.public_key(), "missing", record_types::ANY)
            .await
            .expect("lookup");
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_zone_resolves_nothing() {
        let naming = service();
        let zone = ZonePrivateKey::from_seed(&[0x42u8; 32]);
        let other = ZonePrivateKey::from_seed(&[0x43u8; 32]);
        naming
            .publish(&zone, "www", &[record(record_types::NICK, b"n")])
            .await
            .expect("publish");

        // A different zone derives a different query key entirely.
        let found = naming
            .lookup(&other.public_key(), "www", record_types::ANY)
            .await
            .expect("lookup");
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_shadow_records_publish_with_extended_expiration() {
        let naming = service();
        let zone = ZonePrivateKey::from_seed(&[0x42u8; 32]);
        let now = AbsoluteTime::now().as_micros();
        let rds = vec![
            Record {
                record_type: 1,
                expiration: now + 1_000_000,
                flags: 0,
                data: b"primary".to_vec(),
            },
            Record {
                record_type: 1,
                expiration: now + 60_000_000,
                flags: flags::SHADOW,
                data: b"alt".to_vec(),
            },
        ];
        naming.publish(&zone, "www", &rds).await.expect("publish");

        // While the primary lives, only it resolves.
        let found = naming
            .lookup(&zone.public_key(), "www", record_types::ANY)
            .await
            .expect("lookup");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].data, b"primary");
    }

    #[tokio::test]
    async fn test_zone_nick_publish_and_self_lookup() {
        let naming = service();
        let zone = ZonePrivateKey::from_seed(&[0x44u8; 32]);
        naming
            .publish_zone_nick(&zone, "warren-node")
            .await
            .expect("publish nick");

        let found = naming
            .lookup(&zone.public_key(), "+", record_types::NICK)
            .await
            .expect("lookup");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].data, b"warren-node");
        // Pinned to absolute time on publish.
        assert_eq!(found[0].flags & flags::RELATIVE_EXPIRATION, 0);

        // Republishing is idempotent from the resolver's view.
        naming
            .publish_zone_nick(&zone, "warren-node")
            .await
            .expect("republish nick");
        let again = naming
            .lookup(&zone.public_key(), "+", record_types::NICK)
            .await
            .expect("lookup");
        assert_eq!(again.len(), 1);
    }

    #[tokio::test]
    async fn test_recursive_resolution_follows_delegation() {
        let naming = service();
        let root = ZonePrivateKey::from_seed(&[0x50u8; 32]);
        let alice = ZonePrivateKey::from_seed(&[0x51u8; 32]);

        // Root delegates "alice"; Alice's zone holds "www".
        naming
            .publish(
                &root,
                "alice",
                &[record(
                    record_types::DELEGATION,
                    &alice.public_key().to_bytes(),
                )],
            )
            .await
            .expect("publish delegation");
        naming
            .publish(&alice, "www", &[record(record_types::LEHO, b"alice.example")])
            .await
            .expect("publish leaf");

        let found = naming
            .resolve(&root.public_key(), "www.alice", record_types::ANY)
            .await
            .expect("resolve");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].data, b"alice.example");

        // A missing delegation resolves to nothing.
        let missing = naming
            .resolve(&root.public_key(), "www.bob", record_types::ANY)
            .await
            .expect("resolve");
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_revoked_zone_stops_resolving() {
        let naming = service();
        let zone = ZonePrivateKey::from_seed(&[0x60u8; 32]);
        naming
            .publish(&zone, "www", &[record(record_types::NICK, b"n")])
            .await
            .expect("publish");

        // Resolvable before revocation.
        assert!(!naming
            .lookup(&zone.public_key(), "www", record_types::ANY)
            .await
            .expect("lookup")
            .is_empty());

        let statement = RevocationStatement::create(&zone, 8).expect("revoke");
        // The store enforces the default difficulty; admit through a
        // matching store instead.
        {
            let mut store = naming
                .revocations
                .lock()
                .expect("lock");
            *store = RevocationStore::with_difficulty(8);
        }
        naming.revoke(&statement).expect("admit");

        assert!(naming
            .lookup(&zone.public_key(), "www", record_types::ANY)
            .await
            .expect("lookup")
            .is_empty());
    }

    #[tokio::test]
    async fn test_lookup_is_served_from_cache_after_first_hit() {
        let dht = Arc::new(MemoryDht::new());
        let cache = Arc::new(MemoryNamecache::new());
        let naming = NamingService::with_cache(dht, cache.clone(), &GnsConfig::default());
        let zone = ZonePrivateKey::from_seed(&[0x70u8; 32]);
        naming
            .publish(&zone, "www", &[record(record_types::NICK, b"n")])
            .await
            .expect("publish");

        let query = block::query_from_private_key(&zone, "www").expect("query");
        assert!(cache.lookup_block(&query).await.expect("cache").is_none());

        naming
            .lookup(&zone.public_key(), "www", record_types::ANY)
            .await
            .expect("lookup");
        assert!(cache.lookup_block(&query).await.expect("cache").is_some());
    }
}
