//! Segment footer implementation.
//!
//! The footer is a fixed-size (40 bytes) structure at the end of a segment
//! file. It points at the header region and repeats the generation and
//! document count so a reader can sanity-check the header against it.

use crate::error::{Error, Result};
use crate::segment::{FOOTER_SIZE, MAGIC_NUMBER};
use serde::{Deserialize, Serialize};

/// BlockHandle represents a pointer to a region in the segment file.
///
/// The size includes the 5-byte trailer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHandle {
    /// Offset of the region in the file
    pub offset: u64,
    /// Size of the region in bytes
    pub size: u64,
}

impl BlockHandle {
    /// Create a new BlockHandle
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Encode the BlockHandle to bytes (16 bytes: 8 for offset + 8 for size)
    pub fn encode(&self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..].copy_from_slice(&self.size.to_le_bytes());
        buf
    }

    /// Decode a BlockHandle from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 16 {
            return Err(Error::corruption("BlockHandle too short"));
        }
        Ok(Self { offset: read_u64(&data[0..8]), size: read_u64(&data[8..16]) })
    }

    /// Get the end offset of this region
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size
    }
}

/// Footer is the last 40 bytes of a segment file.
///
/// Format:
/// ```text
/// [header_handle: 16 bytes]
/// [generation: 8 bytes]
/// [doc_count: 8 bytes]
/// [magic: 8 bytes]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    /// Handle to the header region
    pub header_handle: BlockHandle,
    /// Segment generation
    pub generation: u64,
    /// Number of documents
    pub doc_count: u64,
}

impl Footer {
    /// Create a new Footer
    pub fn new(header_handle: BlockHandle, generation: u64, doc_count: u64) -> Self {
        Self { header_handle, generation, doc_count }
    }

    /// Encode the footer to bytes (40 bytes)
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FOOTER_SIZE);
        buf.extend_from_slice(&self.header_handle.encode());
        buf.extend_from_slice(&self.generation.to_le_bytes());
        buf.extend_from_slice(&self.doc_count.to_le_bytes());
        buf.extend_from_slice(&MAGIC_NUMBER.to_le_bytes());
        debug_assert_eq!(buf.len(), FOOTER_SIZE);
        buf
    }

    /// Decode a footer from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != FOOTER_SIZE {
            return Err(Error::corruption(format!(
                "Footer size mismatch: expected {}, got {}",
                FOOTER_SIZE,
                data.len()
            )));
        }

        let magic = read_u64(&data[32..40]);
        if magic != MAGIC_NUMBER {
            return Err(Error::corruption(format!(
                "Invalid segment magic number: expected {:#x}, got {:#x}",
                MAGIC_NUMBER, magic
            )));
        }

        Ok(Self {
            header_handle: BlockHandle::decode(&data[0..16])?,
            generation: read_u64(&data[16..24]),
            doc_count: read_u64(&data[24..32]),
        })
    }

    /// Read the footer from the tail of a whole segment file
    pub fn read_from(file: &[u8]) -> Result<Self> {
        if file.len() < FOOTER_SIZE {
            return Err(Error::corruption("File too small to be a valid segment"));
        }
        Self::decode(&file[file.len() - FOOTER_SIZE..])
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
