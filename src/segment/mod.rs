//! Sealed segments: the immutable unit of document storage.
//!
//! A segment holds N documents in index-sort order, addressed by local
//! ordinals `0..N`. Ordinals never change after sealing; deletions are kept in
//! a separate liveness file owned by the index state.
//!
//! ## File Format
//!
//! ```text
//! [Numeric Column 1]   // presence bitmap + N x i64
//! ...
//! [Numeric Column K]
//! [Stored Offsets]     // (N + 1) x u64
//! [Stored Data]        // concatenated documents, optionally compressed
//! [Header]             // bincode: generation, N, schema, sort, region handles
//! [Footer: 40B]        // header handle, generation, N, magic
//! ```
//!
//! Every region is framed as `data | compression type (1B) | crc32 (4B)`.
//!
//! ## Liveness Format
//!
//! `NNNNNN_D.liv`, one framed region: `max_doc (u32) | bitmap`, one bit per
//! ordinal, 1 = live.

pub mod builder;
pub mod codec;
pub mod footer;
pub mod live;
pub mod reader;
pub mod writer;

pub use builder::SegmentBuilder;
pub use footer::{BlockHandle, Footer};
pub use live::LiveDocs;
pub use reader::SegmentReader;
pub use writer::SegmentWriter;

use crate::schema::Schema;
use crate::sort::IndexSort;
use serde::{Deserialize, Serialize};

/// Footer size in bytes (fixed)
pub const FOOTER_SIZE: usize = 40;

/// Region trailer: compression type (1 byte) + crc32 (4 bytes)
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Magic number for segment files
pub const MAGIC_NUMBER: u64 = 0x5345_4744_4558_5347; // "SEGDEXSG"

/// Extension of sealed segment files.
pub const SEGMENT_EXTENSION: &str = "seg";

/// Extension of liveness files.
pub const LIVE_DOCS_EXTENSION: &str = "liv";

/// Returns the file name of the segment with `generation`.
pub fn segment_file_name(generation: u64) -> String {
    format!("{:06}.{}", generation, SEGMENT_EXTENSION)
}

/// Parses a segment file name back to its generation.
pub fn parse_segment_file_name(name: &str) -> Option<u64> {
    name.strip_suffix(".seg")?.parse().ok()
}

/// Returns the file name of a segment's liveness bitmap at `del_gen`.
pub fn live_docs_file_name(generation: u64, del_gen: u64) -> String {
    format!("{:06}_{}.{}", generation, del_gen, LIVE_DOCS_EXTENSION)
}

/// Parses a liveness file name into `(generation, del_gen)`.
pub fn parse_live_docs_file_name(name: &str) -> Option<(u64, u64)> {
    let stem = name.strip_suffix(".liv")?;
    let (generation, del_gen) = stem.split_once('_')?;
    Some((generation.parse().ok()?, del_gen.parse().ok()?))
}

/// Summary of a freshly sealed segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Generation id
    pub generation: u64,
    /// Published file name
    pub name: String,
    /// Number of documents
    pub doc_count: u32,
    /// Size of the published file in bytes
    pub file_size: u64,
}

/// Location of one numeric column region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnHandle {
    /// Schema id of the numeric field
    pub field_id: u16,
    /// Region location
    pub handle: BlockHandle,
}

/// Segment metadata, stored bincode-encoded just before the footer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentHeader {
    /// Generation id
    pub generation: u64,
    /// Number of documents
    pub doc_count: u32,
    /// Fields present in this segment
    pub schema: Schema,
    /// Sort the documents were sealed under
    pub sort: IndexSort,
    /// One region per numeric field
    pub columns: Vec<ColumnHandle>,
    /// Stored offset table region
    pub stored_offsets: BlockHandle,
    /// Stored data region
    pub stored_data: BlockHandle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_file_names() {
        assert_eq!(segment_file_name(7), "000007.seg");
        assert_eq!(parse_segment_file_name("000007.seg"), Some(7));
        assert_eq!(parse_segment_file_name("1234567.seg"), Some(1234567));
        assert_eq!(parse_segment_file_name("000007.liv"), None);
        assert_eq!(parse_segment_file_name("MANIFEST"), None);
    }

    #[test]
    fn test_live_docs_file_names() {
        assert_eq!(live_docs_file_name(3, 2), "000003_2.liv");
        assert_eq!(parse_live_docs_file_name("000003_2.liv"), Some((3, 2)));
        assert_eq!(parse_live_docs_file_name("000003.liv"), None);
        assert_eq!(parse_live_docs_file_name("000003_2.seg"), None);
    }
}
