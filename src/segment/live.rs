//! Per-segment liveness bitmap.

use crate::config::CompressionType;
use crate::error::{Error, Result};
use crate::segment::codec::{bitmap_len, decode_region, encode_region};

/// One bit per local ordinal; 1 = live, 0 = deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveDocs {
    bits: Vec<u8>,
    max_doc: u32,
    live_count: u32,
}

impl LiveDocs {
    /// A bitmap with every ordinal live.
    pub fn all_live(max_doc: u32) -> Self {
        let mut bits = vec![0xFF; bitmap_len(max_doc as usize)];
        let tail = max_doc % 8;
        if tail != 0 {
            if let Some(last) = bits.last_mut() {
                *last = (1u8 << tail) - 1;
            }
        }
        Self { bits, max_doc, live_count: max_doc }
    }

    /// Number of ordinals covered.
    pub fn max_doc(&self) -> u32 {
        self.max_doc
    }

    /// Number of live ordinals.
    pub fn live_count(&self) -> u32 {
        self.live_count
    }

    /// Number of deleted ordinals.
    pub fn deleted_count(&self) -> u32 {
        self.max_doc - self.live_count
    }

    /// Returns true if any ordinal is deleted.
    pub fn has_deletions(&self) -> bool {
        self.live_count < self.max_doc
    }

    /// Returns true if `ordinal` is live. Out-of-range ordinals are not.
    pub fn is_live(&self, ordinal: u32) -> bool {
        ordinal < self.max_doc && self.bits[ordinal as usize / 8] & (1 << (ordinal % 8)) != 0
    }

    /// Clears the bit of `ordinal`. Returns true if it was live.
    pub fn delete(&mut self, ordinal: u32) -> bool {
        if !self.is_live(ordinal) {
            return false;
        }
        self.bits[ordinal as usize / 8] &= !(1 << (ordinal % 8));
        self.live_count -= 1;
        true
    }

    /// Iterates live ordinals in ascending order.
    pub fn iter_live(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.max_doc).filter(move |&ord| self.is_live(ord))
    }

    /// Encodes the framed liveness file.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(4 + self.bits.len());
        data.extend_from_slice(&self.max_doc.to_le_bytes());
        data.extend_from_slice(&self.bits);
        encode_region(&data, CompressionType::None)
    }

    /// Decodes a framed liveness file.
    pub fn decode(framed: &[u8]) -> Result<Self> {
        let data = decode_region(framed)?;
        if data.len() < 4 {
            return Err(Error::corruption("Liveness file truncated"));
        }
        let mut max_doc = [0u8; 4];
        max_doc.copy_from_slice(&data[..4]);
        let max_doc = u32::from_le_bytes(max_doc);

        let bits = data[4..].to_vec();
        if bits.len() != bitmap_len(max_doc as usize) {
            return Err(Error::corruption(format!(
                "Liveness bitmap size mismatch: expected {}, got {}",
                bitmap_len(max_doc as usize),
                bits.len()
            )));
        }

        let tail = max_doc % 8;
        if tail != 0 && bits.last().is_some_and(|b| b >> tail != 0) {
            return Err(Error::corruption("Liveness bitmap has bits past max_doc"));
        }

        let live_count = bits.iter().map(|b| b.count_ones()).sum();
        Ok(Self { bits, max_doc, live_count })
    }
}
