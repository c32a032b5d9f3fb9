//! The MANIFEST file: the index's commit point.
//!
//! The manifest lists the ordered segments with their current liveness
//! generation. It is rewritten whole and published atomically, so after a
//! crash the index is exactly what the last published manifest describes.

use crate::error::{Error, Result};
use crate::sort::IndexSort;
use crate::store::{self, ByteStore};
use serde::{Deserialize, Serialize};

/// Name of the manifest file.
pub const MANIFEST_FILE: &str = "MANIFEST";

/// Current manifest format version.
pub const FORMAT_VERSION: u32 = 1;

/// Metadata for one segment in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecord {
    /// Segment generation
    pub generation: u64,
    /// Number of documents in the segment file
    pub doc_count: u32,
    /// Liveness generation; 0 means no liveness file (all live)
    pub del_gen: u64,
    /// Number of deleted documents
    pub del_count: u32,
}

/// Persisted list of segments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version
    pub version: u32,
    /// Index sort every segment was written with
    pub sort: IndexSort,
    /// Next unused segment generation
    pub next_generation: u64,
    /// Segments, oldest generation first
    pub segments: Vec<SegmentRecord>,
}

impl Manifest {
    /// Create an empty manifest
    pub fn new(sort: IndexSort) -> Self {
        Self { version: FORMAT_VERSION, sort, next_generation: 1, segments: Vec::new() }
    }

    /// Returns true if `store` holds a manifest
    pub fn exists(store: &dyn ByteStore) -> Result<bool> {
        store.exists(MANIFEST_FILE)
    }

    /// Load the manifest, or None if the store has none
    pub fn load(store: &dyn ByteStore) -> Result<Option<Self>> {
        if !Self::exists(store)? {
            return Ok(None);
        }

        let data = store.open(MANIFEST_FILE)?;
        let manifest: Manifest = serde_json::from_slice(&data)?;
        if manifest.version != FORMAT_VERSION {
            return Err(Error::corruption(format!(
                "Unsupported manifest version {} (expected {})",
                manifest.version, FORMAT_VERSION
            )));
        }
        Ok(Some(manifest))
    }

    /// Atomically replace the manifest in `store`
    pub fn store(&self, store: &dyn ByteStore) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        store::write_file(store, MANIFEST_FILE, &data)
    }

    /// Total documents, live or deleted
    pub fn max_doc(&self) -> u64 {
        self.segments.iter().map(|s| s.doc_count as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::SortField;
    use crate::store::MemoryStore;

    #[test]
    fn test_manifest_store_load() {
        let store = MemoryStore::new();
        assert!(Manifest::load(&store).unwrap().is_none());

        let mut manifest = Manifest::new(IndexSort::new(vec![SortField::descending("dense_int")]));
        manifest.next_generation = 4;
        manifest.segments.push(SegmentRecord { generation: 1, doc_count: 20, del_gen: 2, del_count: 2 });
        manifest.segments.push(SegmentRecord { generation: 3, doc_count: 2, del_gen: 0, del_count: 0 });
        manifest.store(&store).unwrap();

        let loaded = Manifest::load(&store).unwrap().unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.max_doc(), 22);
    }

    #[test]
    fn test_manifest_bad_version() {
        let store = MemoryStore::new();
        let mut manifest = Manifest::new(IndexSort::none());
        manifest.version = 99;
        manifest.store(&store).unwrap();

        assert!(matches!(Manifest::load(&store), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_manifest_garbage() {
        let store = MemoryStore::new();
        store::write_file(&store, MANIFEST_FILE, b"not json").unwrap();
        assert!(matches!(Manifest::load(&store), Err(Error::Serialization(_))));
    }
}
