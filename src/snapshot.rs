//! Snapshot implementation for point-in-time consistent reads.
//!
//! A snapshot pins one segment list together with its liveness bitmaps. Global
//! document ids are computed from that list alone: the id of a live document
//! is the number of live documents in preceding segments plus its rank among
//! the live documents of its own segment. Ids therefore run densely over
//! `0..num_docs()` and are only meaningful for the snapshot that produced them.

use crate::document::{Document, StoredFields, Term};
use crate::error::{Error, Result};
use crate::segment::SegmentReader;
use crate::sort::IndexSort;
use crate::state::SegmentEntry;
use std::sync::Arc;

/// A document id, valid within one snapshot.
pub type DocId = u64;

/// Location of a document: segment position in the snapshot and local ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocAddress {
    /// Position of the segment in the segment list
    pub segment: usize,
    /// Local ordinal inside the segment
    pub ordinal: u32,
}

/// A snapshot represents a point-in-time view of the index.
///
/// Segments referenced by a snapshot stay readable until the snapshot is
/// dropped, even if a merge has replaced them in the meantime.
///
/// # Example
///
/// ```rust
/// use segdex::{Document, Index, Options, Term};
/// use segdex::store::MemoryStore;
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), segdex::Error> {
/// let index = Index::open_with_store(Arc::new(MemoryStore::new()), Options::default())?;
/// index.add_document(Document::new().with_stored("id", "a"))?;
/// index.flush()?;
///
/// let snapshot = index.snapshot();
/// index.delete_documents(&Term::stored("id", "a"))?;
///
/// // The snapshot still sees the deleted document
/// assert_eq!(snapshot.num_docs(), 1);
/// assert_eq!(index.snapshot().num_docs(), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Snapshot {
    segments: Arc<Vec<SegmentEntry>>,
    /// Live documents before each segment
    doc_bases: Vec<DocId>,
    /// Live ordinals of segments with deletions, for rank/select
    live_ordinals: Vec<Option<Vec<u32>>>,
    num_docs: DocId,
}

impl Snapshot {
    pub(crate) fn new(segments: Arc<Vec<SegmentEntry>>) -> Self {
        let mut doc_bases = Vec::with_capacity(segments.len());
        let mut live_ordinals = Vec::with_capacity(segments.len());
        let mut num_docs: DocId = 0;

        for entry in segments.iter() {
            doc_bases.push(num_docs);
            num_docs += entry.live_count() as DocId;
            live_ordinals.push(entry.live.has_deletions().then(|| entry.live.iter_live().collect()));
        }

        Self { segments, doc_bases, live_ordinals, num_docs }
    }

    /// Returns the segments, oldest generation first.
    pub fn segments(&self) -> &[SegmentEntry] {
        &self.segments
    }

    /// Returns the reader of the segment at `segment`.
    pub fn reader(&self, segment: usize) -> Result<&Arc<SegmentReader>> {
        Ok(&self.entry(segment)?.reader)
    }

    fn entry(&self, segment: usize) -> Result<&SegmentEntry> {
        self.segments.get(segment).ok_or_else(|| Error::out_of_range(segment as u64, self.segments.len() as u64))
    }

    /// Number of live documents.
    pub fn num_docs(&self) -> DocId {
        self.num_docs
    }

    /// Number of documents, live or deleted.
    pub fn max_doc(&self) -> u64 {
        self.segments.iter().map(|s| s.max_doc() as u64).sum()
    }

    /// Number of deleted documents not yet merged away.
    pub fn num_deleted_docs(&self) -> u64 {
        self.segments.iter().map(|s| s.deleted_count() as u64).sum()
    }

    /// Number of segments.
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Live local ordinals of `segment`, ascending.
    pub fn enumerate_live(&self, segment: usize) -> Result<impl Iterator<Item = u32> + '_> {
        Ok(self.entry(segment)?.live.iter_live())
    }

    /// Returns true if the document at `address` is live in this snapshot.
    pub fn is_live(&self, address: DocAddress) -> bool {
        self.segments
            .get(address.segment)
            .is_some_and(|s| s.reader.is_live(address.ordinal, &s.live))
    }

    /// Maps a live `(segment, ordinal)` pair to its global id.
    ///
    /// Fails with `DocumentDeleted` if the document is not live here.
    pub fn global_id(&self, address: DocAddress) -> Result<DocId> {
        let entry = self.entry(address.segment)?;
        if address.ordinal >= entry.max_doc() {
            return Err(Error::out_of_range(address.ordinal, entry.max_doc()));
        }
        if !entry.live.is_live(address.ordinal) {
            return Err(Error::DocumentDeleted { generation: entry.generation(), ordinal: address.ordinal });
        }

        let rank = match &self.live_ordinals[address.segment] {
            None => address.ordinal as DocId,
            Some(ordinals) => {
                let rank = ordinals
                    .binary_search(&address.ordinal)
                    .map_err(|_| Error::internal("Live ordinal missing from rank table"))?;
                rank as DocId
            }
        };
        Ok(self.doc_bases[address.segment] + rank)
    }

    /// Maps a global id back to its `(segment, ordinal)` pair.
    pub fn resolve(&self, id: DocId) -> Result<DocAddress> {
        if id >= self.num_docs {
            return Err(Error::out_of_range(id, self.num_docs));
        }

        // First segment whose live range ends after `id`; skips empty segments
        let segment = self
            .doc_bases
            .iter()
            .zip(self.segments.iter())
            .position(|(base, entry)| base + entry.live_count() as DocId > id)
            .ok_or_else(|| Error::internal("Document id not covered by any segment"))?;

        let rank = (id - self.doc_bases[segment]) as usize;
        let ordinal = match &self.live_ordinals[segment] {
            None => rank as u32,
            Some(ordinals) => ordinals[rank],
        };
        Ok(DocAddress { segment, ordinal })
    }

    /// Numeric column value of `field` for document `id`.
    pub fn numeric_value(&self, id: DocId, field: &str) -> Result<Option<i64>> {
        let address = self.resolve(id)?;
        self.segments[address.segment].reader.numeric_value(field, address.ordinal)
    }

    /// Stored fields of document `id`.
    pub fn stored_fields(&self, id: DocId) -> Result<StoredFields> {
        let address = self.resolve(id)?;
        self.segments[address.segment].reader.stored_fields(address.ordinal)
    }

    /// The full document `id`.
    pub fn document(&self, id: DocId) -> Result<Document> {
        let address = self.resolve(id)?;
        self.segments[address.segment].reader.document(address.ordinal)
    }

    /// Iterates live documents in global id order.
    pub fn iter(&self) -> impl Iterator<Item = DocAddress> + '_ {
        self.segments.iter().enumerate().flat_map(|(segment, entry)| {
            entry.live.iter_live().map(move |ordinal| DocAddress { segment, ordinal })
        })
    }

    /// Ids of live documents carrying `term`, ascending.
    pub fn find(&self, term: &Term) -> Result<Vec<DocId>> {
        let mut ids = Vec::new();
        let mut id: DocId = 0;
        for entry in self.segments.iter() {
            if !entry.reader.may_contain(term) {
                id += entry.live_count() as DocId;
                continue;
            }
            for ordinal in entry.live.iter_live() {
                if entry.reader.matches(term, ordinal)? {
                    ids.push(id);
                }
                id += 1;
            }
        }
        Ok(ids)
    }

    /// Full scan of live documents ordered by `sort`, ties by global id.
    ///
    /// Returns at most `limit` ids.
    pub fn search_sorted(&self, sort: &IndexSort, limit: usize) -> Result<Vec<DocId>> {
        let mut hits = Vec::with_capacity(self.num_docs as usize);
        for (id, address) in self.iter().enumerate() {
            let key = self.segments[address.segment].reader.sort_key(sort, address.ordinal)?;
            hits.push((key, id as DocId));
        }
        hits.sort();
        Ok(hits.into_iter().take(limit).map(|(_, id)| id).collect())
    }
}
