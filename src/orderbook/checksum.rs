//! Pluggable top-of-book checksums.
//!
//! The exact algorithm and the number of levels it covers are venue specific,
//! so the replica engine only knows the [`BookChecksum`] trait. The venue
//! protocol supplies the implementation.

use std::fmt;

use super::OrderBookReplica;

/// Checksum over a replica, compared against the one carried by book frames
pub trait BookChecksum: Send + Sync + fmt::Debug {
    /// Compute the checksum of the current replica state
    fn compute(&self, book: &OrderBookReplica) -> i64;
}

/// CRC32 over the top `depth` levels, interleaved bid/ask.
///
/// The payload is `bid1_price:bid1_amount:ask1_price:ask1_amount:...`, using
/// each level's original decimal string, and the CRC32 (IEEE) is read as a
/// signed 32-bit integer. When one side runs out of levels the other side
/// keeps contributing alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterleavedCrc32 {
    depth: usize,
}

impl InterleavedCrc32 {
    /// Checksum over the top `depth` levels per side
    pub const fn new(depth: usize) -> Self {
        Self { depth }
    }

    /// Levels per side covered by the checksum
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// The string the CRC is computed over
    pub fn payload(&self, book: &OrderBookReplica) -> String {
        let bids = book.top_bids(self.depth);
        let asks = book.top_asks(self.depth);
        let mut parts = Vec::with_capacity((bids.len() + asks.len()) * 2);

        for i in 0..self.depth {
            if let Some((price, amount)) = bids.get(i) {
                parts.push(price.to_string());
                parts.push(amount.to_string());
            }
            if let Some((price, amount)) = asks.get(i) {
                parts.push(price.to_string());
                parts.push(amount.to_string());
            }
        }

        parts.join(":")
    }
}

impl BookChecksum for InterleavedCrc32 {
    fn compute(&self, book: &OrderBookReplica) -> i64 {
        signed_crc32(self.payload(book).as_bytes())
    }
}

/// CRC32 (IEEE) reinterpreted as a signed 32-bit value
pub fn signed_crc32(bytes: &[u8]) -> i64 {
    i64::from(crc32fast::hash(bytes) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BookUpdate;

    fn book(bids: &[(&str, &str)], asks: &[(&str, &str)]) -> OrderBookReplica {
        let parse = |levels: &[(&str, &str)]| {
            levels
                .iter()
                .map(|(p, a)| (p.parse().unwrap(), a.parse().unwrap()))
                .collect()
        };
        let mut replica = OrderBookReplica::new("BTC/USDT");
        replica.apply_snapshot(&BookUpdate {
            bids: parse(bids),
            asks: parse(asks),
            ..Default::default()
        });
        replica
    }

    #[test]
    fn test_signed_crc32_check_value() {
        // Standard CRC-32 check value 0xCBF43926
        assert_eq!(signed_crc32(b"123456789"), -873_187_034);
    }

    #[test]
    fn test_payload_interleaves_and_keeps_scale() {
        let replica = book(
            &[("100.10", "1.5"), ("99.9", "2")],
            &[("100.2", "0.30")],
        );
        let checksum = InterleavedCrc32::new(25);
        assert_eq!(checksum.payload(&replica), "100.10:1.5:100.2:0.30:99.9:2");
    }

    #[test]
    fn test_payload_follows_latest_price_text() {
        let mut replica = book(&[("100.10", "1")], &[]);
        replica.apply_delta(&BookUpdate {
            bids: vec![("100.1".parse().unwrap(), "2".parse().unwrap())],
            ..Default::default()
        });
        assert_eq!(InterleavedCrc32::new(25).payload(&replica), "100.1:2");
    }

    #[test]
    fn test_depth_truncates() {
        let replica = book(&[("3", "1"), ("2", "1"), ("1", "1")], &[("4", "1"), ("5", "1")]);
        let checksum = InterleavedCrc32::new(1);
        assert_eq!(checksum.payload(&replica), "3:1:4:1");
        assert_eq!(checksum.compute(&replica), signed_crc32(b"3:1:4:1"));
    }

    #[test]
    fn test_mutated_price_changes_checksum() {
        let checksum = InterleavedCrc32::new(25);
        let a = book(&[("100", "1")], &[("101", "2")]);
        let b = book(&[("100", "1")], &[("102", "2")]);
        assert_ne!(checksum.compute(&a), checksum.compute(&b));
    }
}
