//! Record sets and their wire codec.
//!
//! ## Wire format
//!
//! Records serialize back to back, each as
//!
//! ```text
//! expiration_be[8] data_size_be[4] record_type_be[4] flags_be[4] data[data_size]
//! ```
//!
//! with all integers big-endian. Input order is preserved; the codec never
//! reorders.
//!
//! ## Expiration and shadow semantics
//!
//! A record whose `RELATIVE_EXPIRATION` flag is set carries a span, not a
//! point in time; it becomes absolute only when a block is created. A
//! `SHADOW` record of type T stays invisible while a live non-shadow record
//! of type T exists, and takes over (flag cleared) once the primary
//! expires.

use warren_types::{AbsoluteTime, RelativeTime};

use crate::{GnsError, Result, MAX_BLOCK_SIZE, MAX_RD_COUNT};

/// Record flags.
pub mod flags {
    /// This peer is authoritative for the record.
    pub const AUTHORITY: u32 = 1;
    /// Never published to the DHT.
    pub const PRIVATE: u32 = 2;
    /// Not yet activated by its owner.
    pub const PENDING: u32 = 4;
    /// Visible only once the non-shadow record of the same type expired.
    pub const SHADOW: u32 = 8;
    /// `expiration` is relative to block creation, not absolute.
    pub const RELATIVE_EXPIRATION: u32 = 16;

    /// The flags that participate in record comparison. AUTHORITY, PRIVATE
    /// and PENDING are local bookkeeping and never distinguish records.
    pub const RCMP_MASK: u32 = SHADOW | RELATIVE_EXPIRATION;
}

/// Well-known record type numbers.
pub mod record_types {
    /// Wildcard used in queries; never stored in a record.
    pub const ANY: u32 = 0;
    /// Zone delegation.
    pub const DELEGATION: u32 = 65536;
    /// Zone nickname.
    pub const NICK: u32 = 65537;
    /// Legacy hostname.
    pub const LEHO: u32 = 65538;
    /// Boxed records for sub-labels.
    pub const BOX: u32 = 65541;

    /// Human-readable name for diagnostics.
    pub fn name(record_type: u32) -> &'static str {
        match record_type {
            ANY => "ANY",
            DELEGATION => "DELEGATION",
            NICK => "NICK",
            LEHO => "LEHO",
            BOX => "BOX",
            _ => "UNKNOWN",
        }
    }
}

/// Per-record wire overhead: expiration + data size + type + flags.
const RECORD_HEADER_SIZE: usize = 8 + 4 + 4 + 4;

/// One resource record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// 32-bit type tag. [`record_types::ANY`] is reserved for queries.
    pub record_type: u32,
    /// Expiration in microseconds: absolute, unless
    /// [`flags::RELATIVE_EXPIRATION`] is set, then relative to block
    /// creation.
    pub expiration: u64,
    /// Flag bitset, see [`flags`].
    pub flags: u32,
    /// Opaque record payload.
    pub data: Vec<u8>,
}

impl Record {
    /// Whether this record is past its expiration at `now`.
    ///
    /// Relative-expiration records have no fixed origin yet and are never
    /// considered expired.
    pub fn is_expired(&self, now: AbsoluteTime) -> bool {
        if self.flags & flags::RELATIVE_EXPIRATION != 0 {
            return false;
        }
        AbsoluteTime(self.expiration) < now
    }

    /// Effective absolute expiration with `now` as the origin for
    /// relative-expiration records.
    pub fn effective_expiration(&self, now: AbsoluteTime) -> AbsoluteTime {
        if self.flags & flags::RELATIVE_EXPIRATION != 0 {
            now.saturating_add(RelativeTime::from_micros(self.expiration))
        } else {
            AbsoluteTime(self.expiration)
        }
    }

    fn serialized_len(&self) -> usize {
        RECORD_HEADER_SIZE + self.data.len()
    }
}

/// Serialize a record set. Order is preserved.
///
/// Fails with [`GnsError::TooLarge`] once the aggregate exceeds
/// [`MAX_BLOCK_SIZE`] and with [`GnsError::TooManyRecords`] beyond
/// [`MAX_RD_COUNT`] entries.
pub fn serialize(records: &[Record]) -> Result<Vec<u8>> {
    if records.len() > MAX_RD_COUNT {
        return Err(GnsError::TooManyRecords {
            count: records.len(),
            max: MAX_RD_COUNT,
        });
    }
    let total: usize = records.iter().map(Record::serialized_len).sum();
    if total > MAX_BLOCK_SIZE {
        return Err(GnsError::TooLarge {
            size: total,
            max: MAX_BLOCK_SIZE,
        });
    }

    let mut out = Vec::with_capacity(total);
    for record in records {
        out.extend_from_slice(&record.expiration.to_be_bytes());
        out.extend_from_slice(&(record.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&record.record_type.to_be_bytes());
        out.extend_from_slice(&record.flags.to_be_bytes());
        out.extend_from_slice(&record.data);
    }
    Ok(out)
}

/// Deserialize exactly `count` records from `bytes`.
///
/// Fails if `count` exceeds [`MAX_RD_COUNT`], if any record's length field
/// overflows the available bytes, or if trailing bytes remain.
pub fn deserialize(bytes: &[u8], count: usize) -> Result<Vec<Record>> {
    if count > MAX_RD_COUNT {
        return Err(GnsError::TooManyRecords {
            count,
            max: MAX_RD_COUNT,
        });
    }

    let mut records = Vec::with_capacity(count);
    let mut offset = 0usize;
    for index in 0..count {
        if bytes.len() - offset < RECORD_HEADER_SIZE {
            return Err(GnsError::WireFormat(format!(
                "truncated header for record {index}"
            )));
        }
        let expiration = u64::from_be_bytes(
            bytes[offset..offset + 8]
                .try_into()
                .map_err(|_| GnsError::WireFormat("expiration".into()))?,
        );
        let data_size = u32::from_be_bytes(
            bytes[offset + 8..offset + 12]
                .try_into()
                .map_err(|_| GnsError::WireFormat("data size".into()))?,
        ) as usize;
        let record_type = u32::from_be_bytes(
            bytes[offset + 12..offset + 16]
                .try_into()
                .map_err(|_| GnsError::WireFormat("record type".into()))?,
        );
        let record_flags = u32::from_be_bytes(
            bytes[offset + 16..offset + 20]
                .try_into()
                .map_err(|_| GnsError::WireFormat("flags".into()))?,
        );
        offset += RECORD_HEADER_SIZE;

        if bytes.len() - offset < data_size {
            return Err(GnsError::WireFormat(format!(
                "record {index} data length {data_size} overflows {} remaining bytes",
                bytes.len() - offset
            )));
        }
        let data = bytes[offset..offset + data_size].to_vec();
        offset += data_size;

        records.push(Record {
            record_type,
            expiration,
            flags: record_flags,
            data,
        });
    }

    if offset != bytes.len() {
        return Err(GnsError::WireFormat(format!(
            "{} trailing bytes after {count} records",
            bytes.len() - offset
        )));
    }
    Ok(records)
}

/// Whether two records are the same for comparison purposes.
///
/// Type, data and the RCMP-masked flags must match. Expirations must match
/// unless either side is the zero sentinel, which means "don't compare".
pub fn records_match(a: &Record, b: &Record) -> bool {
    if a.record_type != b.record_type {
        return false;
    }
    if a.flags & flags::RCMP_MASK != b.flags & flags::RCMP_MASK {
        return false;
    }
    if a.expiration != 0 && b.expiration != 0 && a.expiration != b.expiration {
        return false;
    }
    a.data == b.data
}

/// The block-wide expiration for a record set: the minimum over all
/// records of their effective expiration, where a record's effective
/// expiration is extended by any shadow record of the same type.
///
/// Shadow records extend validity so a label keeps resolving from the
/// shadow's data after the primary expires. An empty set yields
/// [`AbsoluteTime::ZERO`].
pub fn block_expiration(records: &[Record], now: AbsoluteTime) -> AbsoluteTime {
    let mut result: Option<AbsoluteTime> = None;
    for record in records {
        let mut effective = record.effective_expiration(now);
        for other in records {
            if other.record_type == record.record_type && other.flags & flags::SHADOW != 0 {
                effective = effective.max(other.effective_expiration(now));
            }
        }
        result = Some(match result {
            Some(current) => current.min(effective),
            None => effective,
        });
    }
    result.unwrap_or(AbsoluteTime::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(record_type: u32, expiration: u64, record_flags: u32, data: &[u8]) -> Record {
        Record {
            record_type,
            expiration,
            flags: record_flags,
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_serialize_layout() {
        let rds = vec![record(65537, 0x0102030405060708, flags::PRIVATE, b"abc")];
        let bytes = serialize(&rds).expect("serialize");
        assert_eq!(bytes.len(), 20 + 3);
        assert_eq!(&bytes[..8], &0x0102030405060708u64.to_be_bytes());
        assert_eq!(&bytes[8..12], &3u32.to_be_bytes());
        assert_eq!(&bytes[12..16], &65537u32.to_be_bytes());
        assert_eq!(&bytes[16..20], &flags::PRIVATE.to_be_bytes());
        assert_eq!(&bytes[20..], b"abc");
    }

    #[test]
    fn test_roundtrip_preserves_order_and_bits() {
        let rds = vec![
            record(1, 100, flags::SHADOW, b"first"),
            record(2, 0, 0, b""),
            record(1, u64::MAX, flags::RELATIVE_EXPIRATION, b"third"),
        ];
        let bytes = serialize(&rds).expect("serialize");
        let back = deserialize(&bytes, rds.len()).expect("deserialize");
        assert_eq!(back, rds);
    }

    #[test]
    fn test_deserialize_rejects_overflowing_length() {
        let rds = vec![record(1, 1, 0, b"abcdef")];
        let mut bytes = serialize(&rds).expect("serialize");
        // Claim more data than present.
        bytes[8..12].copy_from_slice(&100u32.to_be_bytes());
        assert!(deserialize(&bytes, 1).is_err());
    }

    #[test]
    fn test_deserialize_rejects_trailing_bytes() {
        let rds = vec![record(1, 1, 0, b"x")];
        let mut bytes = serialize(&rds).expect("serialize");
        bytes.push(0);
        assert!(deserialize(&bytes, 1).is_err());
    }

    #[test]
    fn test_deserialize_rejects_excess_count() {
        assert!(matches!(
            deserialize(&[], MAX_RD_COUNT + 1),
            Err(GnsError::TooManyRecords { .. })
        ));
    }

    #[test]
    fn test_serialize_size_boundary() {
        // One record padded so the serialized form is exactly the ceiling.
        let data = vec![0u8; MAX_BLOCK_SIZE - 20];
        let exact = vec![record(1, 1, 0, &data)];
        assert!(serialize(&exact).is_ok());

        let data = vec![0u8; MAX_BLOCK_SIZE - 20 + 1];
        let over = vec![record(1, 1, 0, &data)];
        assert!(matches!(serialize(&over), Err(GnsError::TooLarge { .. })));
    }

    #[test]
    fn test_records_match_reflexive_symmetric() {
        let a = record(1, 5, flags::SHADOW, b"data");
        let b = record(1, 5, flags::SHADOW, b"data");
        assert!(records_match(&a, &a));
        assert!(records_match(&a, &b));
        assert!(records_match(&b, &a));
    }

    #[test]
    fn test_records_match_ignores_local_flags() {
        let a = record(1, 5, 0, b"data");
        let mut b = a.clone();
        b.flags = flags::AUTHORITY | flags::PRIVATE | flags::PENDING;
        assert!(records_match(&a, &b));
    }

    #[test]
    fn test_records_match_respects_rcmp_flags() {
        let a = record(1, 5, 0, b"data");
        let mut b = a.clone();
        b.flags = flags::SHADOW;
        assert!(!records_match(&a, &b));
    }

    #[test]
    fn test_records_match_zero_expiration_wildcard() {
        let a = record(1, 0, 0, b"data");
        let b = record(1, 12345, 0, b"data");
        assert!(records_match(&a, &b));

        let c = record(1, 99, 0, b"data");
        assert!(!records_match(&b, &c));
    }

    #[test]
    fn test_is_expired() {
        let now = AbsoluteTime(1_000);
        assert!(record(1, 999, 0, b"").is_expired(now));
        assert!(!record(1, 1_000, 0, b"").is_expired(now));
        // Relative records have no origin yet.
        assert!(!record(1, 1, flags::RELATIVE_EXPIRATION, b"").is_expired(now));
    }

    #[test]
    fn test_block_expiration_minimum() {
        let now = AbsoluteTime(0);
        let rds = vec![record(1, 500, 0, b"a"), record(2, 300, 0, b"b")];
        assert_eq!(block_expiration(&rds, now), AbsoluteTime(300));
    }

    #[test]
    fn test_block_expiration_shadow_extends() {
        let now = AbsoluteTime(0);
        let rds = vec![
            record(1, 100, 0, b"primary"),
            record(1, 200, flags::SHADOW, b"shadow"),
        ];
        // The shadow lifts the primary's effective expiration to 200; the
        // shadow itself also expires at 200.
        assert_eq!(block_expiration(&rds, now), AbsoluteTime(200));
    }

    #[test]
    fn test_block_expiration_relative_converts() {
        let now = AbsoluteTime(1_000);
        let rds = vec![record(1, 500, flags::RELATIVE_EXPIRATION, b"a")];
        assert_eq!(block_expiration(&rds, now), AbsoluteTime(1_500));
    }

    #[test]
    fn test_block_expiration_monotone() {
        // If every record's effective expiration is at least T, the block
        // expiration is at least T.
        let now = AbsoluteTime(50);
        let rds = vec![
            record(1, 400, 0, b"a"),
            record(2, 350, flags::RELATIVE_EXPIRATION, b"b"),
            record(1, 900, flags::SHADOW, b"c"),
        ];
        let t = AbsoluteTime(350);
        assert!(block_expiration(&rds, now) >= t);
    }

    #[test]
    fn test_block_expiration_empty() {
        assert_eq!(block_expiration(&[], AbsoluteTime(10)), AbsoluteTime::ZERO);
    }

    #[test]
    fn test_record_type_names() {
        assert_eq!(record_types::name(record_types::NICK), "NICK");
        assert_eq!(record_types::name(123), "UNKNOWN");
    }
}
