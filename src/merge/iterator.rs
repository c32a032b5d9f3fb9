//! K-way merge over the live documents of sorted segments.
//!
//! Each input segment is already in index-sort order, so a min-heap holding
//! one cursor per segment yields the merged order. Ties are broken by
//! (segment generation, local ordinal) ascending.

use crate::error::Result;
use crate::segment::{LiveDocs, SegmentReader};
use crate::snapshot::DocAddress;
use crate::sort::{IndexSort, SortKey};
use crate::state::SegmentEntry;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Entry in the merge heap
struct MergeEntry {
    key: SortKey,
    generation: u64,
    ordinal: u32,
    input: usize,
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (smallest key first)
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.generation.cmp(&self.generation))
            .then_with(|| other.ordinal.cmp(&self.ordinal))
    }
}

/// Position inside one input segment
struct Cursor {
    reader: Arc<SegmentReader>,
    live: Arc<LiveDocs>,
    next: u32,
}

impl Cursor {
    fn next_live(&mut self) -> Option<u32> {
        while self.next < self.reader.max_doc() {
            let ordinal = self.next;
            self.next += 1;
            if self.live.is_live(ordinal) {
                return Some(ordinal);
            }
        }
        None
    }
}

/// Multi-way merge iterator over the live documents of several segments.
///
/// Yields `DocAddress`es whose `segment` is the position of the input in the
/// slice passed to `new`.
pub struct MergeIterator {
    heap: BinaryHeap<MergeEntry>,
    cursors: Vec<Cursor>,
    sort: IndexSort,
}

impl MergeIterator {
    /// Create a new merge iterator over `inputs` ordered by `sort`.
    pub fn new(inputs: &[SegmentEntry], sort: IndexSort) -> Result<Self> {
        let cursors = inputs
            .iter()
            .map(|entry| Cursor { reader: entry.reader.clone(), live: entry.live.clone(), next: 0 })
            .collect::<Vec<_>>();

        let mut iter = Self { heap: BinaryHeap::with_capacity(cursors.len()), cursors, sort };
        for input in 0..iter.cursors.len() {
            iter.advance_input(input)?;
        }
        Ok(iter)
    }

    /// Advance the cursor at the given index and add its next entry to the heap
    fn advance_input(&mut self, input: usize) -> Result<()> {
        let cursor = &mut self.cursors[input];
        if let Some(ordinal) = cursor.next_live() {
            let key = cursor.reader.sort_key(&self.sort, ordinal)?;
            self.heap.push(MergeEntry { key, generation: cursor.reader.generation(), ordinal, input });
        }
        Ok(())
    }
}

impl Iterator for MergeIterator {
    type Item = Result<DocAddress>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.heap.pop()?;

        if let Err(e) = self.advance_input(entry.input) {
            return Some(Err(e));
        }

        Some(Ok(DocAddress { segment: entry.input, ordinal: entry.ordinal }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentConfig;
    use crate::document::Document;
    use crate::segment::SegmentWriter;
    use crate::sort::SortField;
    use crate::store::{ByteStore, MemoryStore};

    fn sort() -> IndexSort {
        IndexSort::new(vec![SortField::descending("v")])
    }

    fn segment(store: &Arc<MemoryStore>, generation: u64, values: &[i64]) -> SegmentEntry {
        let mut writer = SegmentWriter::new();
        for &v in values {
            writer.add(Document::new().with_numeric("v", v).with_stored("g", generation as i64)).unwrap();
        }
        let config = SegmentConfig { sort: sort(), ..Default::default() };
        let info = writer.flush(store.as_ref(), generation, &config).unwrap();
        let dyn_store: Arc<dyn ByteStore> = store.clone();
        SegmentEntry::new(Arc::new(SegmentReader::open(dyn_store, &info.name).unwrap()))
    }

    fn values(inputs: &[SegmentEntry]) -> Vec<(i64, u64)> {
        MergeIterator::new(inputs, sort())
            .unwrap()
            .map(|addr| {
                let addr = addr.unwrap();
                let reader = &inputs[addr.segment].reader;
                (reader.numeric_value("v", addr.ordinal).unwrap().unwrap(), reader.generation())
            })
            .collect()
    }

    #[test]
    fn test_merge_two_segments() {
        let store = Arc::new(MemoryStore::new());
        let inputs = vec![segment(&store, 1, &[9, 5, 1]), segment(&store, 2, &[8, 5, 2])];

        assert_eq!(
            values(&inputs),
            vec![(9, 1), (8, 2), (5, 1), (5, 2), (2, 2), (1, 1)]
        );
    }

    #[test]
    fn test_ties_broken_by_generation() {
        let store = Arc::new(MemoryStore::new());
        // Input order must not matter, only generation
        let inputs = vec![segment(&store, 7, &[3, 3]), segment(&store, 4, &[3])];

        assert_eq!(values(&inputs), vec![(3, 4), (3, 7), (3, 7)]);
    }

    #[test]
    fn test_deleted_documents_skipped() {
        let store = Arc::new(MemoryStore::new());
        let mut first = segment(&store, 1, &[9, 5, 1]);
        let mut live = (*first.live).clone();
        live.delete(1);
        first.live = Arc::new(live);

        let second = segment(&store, 2, &[4]);
        assert_eq!(values(&[first, second]), vec![(9, 1), (4, 2), (1, 1)]);
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(MergeIterator::new(&[], sort()).unwrap().count(), 0);
    }
}
