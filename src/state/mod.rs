//! Index state: the live segment list and per-segment liveness.
//!
//! The segment list is copy-on-write: every change builds a new
//! `Arc<Vec<SegmentEntry>>` and swaps it in, so snapshots keep reading the
//! list they were taken from. Liveness changes are visible to new snapshots
//! immediately and become durable at the next commit, which writes new
//! liveness files and then the manifest.

pub mod manifest;

pub use manifest::{Manifest, SegmentRecord, FORMAT_VERSION, MANIFEST_FILE};

use crate::document::Term;
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::segment::{
    live_docs_file_name, parse_live_docs_file_name, parse_segment_file_name, segment_file_name, LiveDocs,
    SegmentReader,
};
use crate::snapshot::Snapshot;
use crate::sort::IndexSort;
use crate::store::{self, fs::TEMP_EXTENSION, ByteStore};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One segment of the index together with its liveness overlay.
#[derive(Debug, Clone)]
pub struct SegmentEntry {
    /// The sealed segment
    pub reader: Arc<SegmentReader>,
    /// Liveness bitmap at this point in time
    pub live: Arc<LiveDocs>,
    /// Generation of the persisted liveness file (0 = none)
    pub del_gen: u64,
    /// True if `live` has changes not yet written to a liveness file
    pub dirty: bool,
}

impl SegmentEntry {
    /// An entry for a freshly sealed segment, all documents live.
    pub fn new(reader: Arc<SegmentReader>) -> Self {
        let live = Arc::new(LiveDocs::all_live(reader.max_doc()));
        Self { reader, live, del_gen: 0, dirty: false }
    }

    /// Segment generation.
    pub fn generation(&self) -> u64 {
        self.reader.generation()
    }

    /// Number of documents, live or deleted.
    pub fn max_doc(&self) -> u32 {
        self.reader.max_doc()
    }

    /// Number of live documents.
    pub fn live_count(&self) -> u32 {
        self.live.live_count()
    }

    /// Number of deleted documents.
    pub fn deleted_count(&self) -> u32 {
        self.live.deleted_count()
    }

    /// Fraction of documents deleted.
    pub fn delete_ratio(&self) -> f64 {
        if self.max_doc() == 0 {
            return 0.0;
        }
        self.deleted_count() as f64 / self.max_doc() as f64
    }

    fn live_docs_file(&self) -> Option<String> {
        (self.del_gen > 0).then(|| live_docs_file_name(self.generation(), self.del_gen))
    }

    fn record(&self) -> SegmentRecord {
        SegmentRecord {
            generation: self.generation(),
            doc_count: self.max_doc(),
            del_gen: self.del_gen,
            del_count: self.deleted_count(),
        }
    }
}

/// Owns the segment list, liveness bitmaps and the manifest.
///
/// All mutations are serialized internally; readers only take a short read
/// lock to clone the current list.
#[derive(Debug)]
pub struct IndexState {
    store: Arc<dyn ByteStore>,
    sort: IndexSort,
    segments: RwLock<Arc<Vec<SegmentEntry>>>,
    next_generation: AtomicU64,
    mutation: Mutex<()>,
}

impl IndexState {
    /// Creates a new, empty index in `store` and commits its first manifest.
    pub fn create(store: Arc<dyn ByteStore>, sort: IndexSort) -> Result<Self> {
        if Manifest::exists(store.as_ref())? {
            return Err(Error::AlreadyExists("Index manifest already exists".to_string()));
        }

        Manifest::new(sort.clone()).store(store.as_ref())?;
        log::info!("Created new index with sort {}", sort);

        Ok(Self::from_parts(store, sort, Vec::new(), 1))
    }

    /// Opens the index described by the manifest in `store`.
    ///
    /// Fails with `InvalidArgument` if the index was written with a different
    /// sort. Files not referenced by the manifest are deleted.
    pub fn open(store: Arc<dyn ByteStore>, sort: IndexSort) -> Result<Self> {
        let manifest = Manifest::load(store.as_ref())?
            .ok_or_else(|| Error::not_found("Index manifest does not exist"))?;

        if manifest.sort != sort {
            return Err(Error::invalid_argument(format!(
                "Index was written with sort {}, opened with sort {}",
                manifest.sort, sort
            )));
        }

        let mut segments = Vec::with_capacity(manifest.segments.len());
        for record in &manifest.segments {
            let reader = SegmentReader::open(store.clone(), &segment_file_name(record.generation))?;
            if reader.max_doc() != record.doc_count {
                return Err(Error::corruption(format!(
                    "Segment {} has {} documents, manifest says {}",
                    record.generation,
                    reader.max_doc(),
                    record.doc_count
                )));
            }

            let live = if record.del_gen > 0 {
                let name = live_docs_file_name(record.generation, record.del_gen);
                let live = LiveDocs::decode(&store.open(&name)?)?;
                if live.max_doc() != record.doc_count || live.deleted_count() != record.del_count {
                    return Err(Error::corruption(format!("Liveness file {} disagrees with manifest", name)));
                }
                live
            } else {
                LiveDocs::all_live(record.doc_count)
            };

            segments.push(SegmentEntry {
                reader: Arc::new(reader),
                live: Arc::new(live),
                del_gen: record.del_gen,
                dirty: false,
            });
        }

        let max_generation = segments.iter().map(SegmentEntry::generation).max().unwrap_or(0);
        let next_generation = manifest.next_generation.max(max_generation + 1);

        log::info!(
            "Opened index: {} segments, {} documents, next generation {}",
            segments.len(),
            manifest.max_doc(),
            next_generation
        );

        let state = Self::from_parts(store, sort, segments, next_generation);
        state.remove_unreferenced_files()?;
        Ok(state)
    }

    fn from_parts(
        store: Arc<dyn ByteStore>,
        sort: IndexSort,
        segments: Vec<SegmentEntry>,
        next_generation: u64,
    ) -> Self {
        Self {
            store,
            sort,
            segments: RwLock::new(Arc::new(segments)),
            next_generation: AtomicU64::new(next_generation),
            mutation: Mutex::new(()),
        }
    }

    /// Deletes segment, liveness and temp files the manifest does not reference.
    fn remove_unreferenced_files(&self) -> Result<()> {
        let segments = self.segments();
        let referenced: HashSet<String> = segments
            .iter()
            .flat_map(|s| std::iter::once(s.reader.name().to_string()).chain(s.live_docs_file()))
            .collect();

        for name in self.store.list()? {
            let ours = parse_segment_file_name(&name).is_some()
                || parse_live_docs_file_name(&name).is_some()
                || name.ends_with(&format!(".{}", TEMP_EXTENSION));
            if ours && !referenced.contains(&name) {
                log::info!("Removing unreferenced file {}", name);
                self.store.delete(&name)?;
            }
        }
        Ok(())
    }

    /// Returns the index sort.
    pub fn sort(&self) -> &IndexSort {
        &self.sort
    }

    /// Returns the byte store.
    pub fn store(&self) -> &Arc<dyn ByteStore> {
        &self.store
    }

    /// Allocates a fresh segment generation.
    pub fn allocate_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst)
    }

    /// Returns the current segment list.
    pub fn segments(&self) -> Arc<Vec<SegmentEntry>> {
        self.segments.read().clone()
    }

    /// Returns an immutable view of the current segments and liveness.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.segments())
    }

    /// Union of the schemas of all segments.
    pub fn schema(&self) -> Result<Schema> {
        let mut schema = Schema::new();
        for entry in self.segments().iter() {
            schema.merge_from(entry.reader.schema())?;
        }
        Ok(schema)
    }

    /// Appends a newly sealed segment and commits.
    ///
    /// On failure the segment list is unchanged.
    pub fn publish(&self, reader: Arc<SegmentReader>) -> Result<()> {
        let _guard = self.mutation.lock();
        let mut segments = self.segments().as_ref().clone();
        let generation = reader.generation();
        segments.push(SegmentEntry::new(reader));
        self.commit_with(segments)?;
        log::info!("Published segment {}", generation);
        Ok(())
    }

    /// Marks every live document matching `term` as deleted.
    ///
    /// Returns the number of documents deleted. The change is visible to new
    /// snapshots at once and persisted at the next commit. If scanning a
    /// segment fails, segments scanned before it keep their deletions and the
    /// failing segment is left untouched.
    pub fn mark_deleted(&self, term: &Term) -> Result<usize> {
        let _guard = self.mutation.lock();
        let current = self.segments();
        let mut updated = current.as_ref().clone();
        let mut deleted = 0usize;
        let mut failure = None;

        for (i, entry) in current.iter().enumerate() {
            if !entry.reader.may_contain(term) || entry.live_count() == 0 {
                continue;
            }

            match Self::scan_segment(entry, term) {
                Ok(Some((live, count))) => {
                    updated[i].live = Arc::new(live);
                    updated[i].dirty = true;
                    deleted += count;
                }
                Ok(None) => {}
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if deleted > 0 {
            *self.segments.write() = Arc::new(updated);
            log::debug!("Deleted {} documents matching {}", deleted, term);
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(deleted),
        }
    }

    fn scan_segment(entry: &SegmentEntry, term: &Term) -> Result<Option<(LiveDocs, usize)>> {
        let mut live = (*entry.live).clone();
        let mut count = 0;
        for ordinal in entry.live.iter_live() {
            if entry.reader.matches(term, ordinal)? && live.delete(ordinal) {
                count += 1;
            }
        }
        Ok((count > 0).then_some((live, count)))
    }

    /// Returns true if some segment has deletions not yet persisted.
    pub fn has_pending_deletes(&self) -> bool {
        self.segments().iter().any(|s| s.dirty)
    }

    /// Persists pending deletions.
    pub fn commit(&self) -> Result<()> {
        let _guard = self.mutation.lock();
        let segments = self.segments();
        if !segments.iter().any(|s| s.dirty) {
            return Ok(());
        }
        self.commit_with(segments.as_ref().clone())
    }

    /// Swaps merge inputs for the merged segment (or for nothing) and commits.
    ///
    /// The merged segment is appended at the end of the list. Fails with
    /// `MergeAborted` if an input is gone or received deletions after the merge
    /// read it. On success the inputs are retired; their files are deleted once
    /// the last snapshot referencing them is dropped.
    pub fn replace(&self, inputs: &[SegmentEntry], merged: Option<Arc<SegmentReader>>) -> Result<()> {
        let _guard = self.mutation.lock();
        let current = self.segments();

        for input in inputs {
            let still_current = current
                .iter()
                .any(|s| Arc::ptr_eq(&s.reader, &input.reader) && Arc::ptr_eq(&s.live, &input.live));
            if !still_current {
                return Err(Error::MergeAborted(format!(
                    "segment {} changed while it was being merged",
                    input.generation()
                )));
            }
        }

        let mut segments: Vec<SegmentEntry> = current
            .iter()
            .filter(|s| !inputs.iter().any(|input| Arc::ptr_eq(&s.reader, &input.reader)))
            .cloned()
            .collect();
        if let Some(reader) = merged {
            segments.push(SegmentEntry::new(reader));
        }

        self.commit_with(segments)?;

        for input in inputs {
            input.reader.mark_retired();
        }
        Ok(())
    }

    /// Writes liveness files for dirty entries, then the manifest, then swaps
    /// `segments` in. Must be called with the mutation lock held.
    ///
    /// Files written by a failed commit are removed unless the store reports
    /// the manifest naming them as published.
    fn commit_with(&self, mut segments: Vec<SegmentEntry>) -> Result<()> {
        let previous = self.segments();
        let mut written = Vec::new();

        if let Err(e) = self.write_commit(&mut segments, &mut written) {
            for name in &written {
                if let Err(err) = self.store.delete(name) {
                    log::warn!("Failed to remove {} after failed commit: {}", name, err);
                }
            }
            return Err(e);
        }

        let still_referenced: HashSet<String> =
            segments.iter().filter_map(SegmentEntry::live_docs_file).collect();
        *self.segments.write() = Arc::new(segments);

        for name in previous.iter().filter_map(SegmentEntry::live_docs_file) {
            if !still_referenced.contains(&name) {
                if let Err(e) = self.store.delete(&name) {
                    log::warn!("Failed to remove superseded liveness file {}: {}", name, e);
                }
            }
        }
        Ok(())
    }

    fn write_commit(&self, segments: &mut [SegmentEntry], written: &mut Vec<String>) -> Result<()> {
        for entry in segments.iter_mut().filter(|s| s.dirty) {
            let del_gen = entry.del_gen + 1;
            let name = live_docs_file_name(entry.generation(), del_gen);
            store::write_file(self.store.as_ref(), &name, &entry.live.encode()?)?;
            written.push(name);
            entry.del_gen = del_gen;
            entry.dirty = false;
        }

        let manifest = Manifest {
            version: FORMAT_VERSION,
            sort: self.sort.clone(),
            next_generation: self.next_generation.load(Ordering::SeqCst),
            segments: segments.iter().map(SegmentEntry::record).collect(),
        };

        match manifest.store(self.store.as_ref()) {
            Ok(()) => Ok(()),
            // The publish may have taken effect before the store reported the error
            Err(e) if self.is_published(&manifest) => {
                log::warn!("Manifest was published despite store error: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn is_published(&self, manifest: &Manifest) -> bool {
        matches!(Manifest::load(self.store.as_ref()), Ok(Some(on_disk)) if on_disk == *manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompressionType, SegmentConfig};
    use crate::document::{Document, StoredValue, ValueType};
    use crate::segment::codec::{encode_offsets, encode_region, encode_stored_document};
    use crate::segment::{BlockHandle, Footer, SegmentHeader, SegmentWriter};
    use crate::store::MemoryStore;

    fn seal(state: &IndexState, keys: &[&str]) -> Arc<SegmentReader> {
        let mut writer = SegmentWriter::new();
        for key in keys {
            writer.add(Document::new().with_stored("id", *key).with_numeric("v", 1)).unwrap();
        }
        let generation = state.allocate_generation();
        let info = writer.flush(state.store().as_ref(), generation, &SegmentConfig::default()).unwrap();
        Arc::new(SegmentReader::open(state.store().clone(), &info.name).unwrap())
    }

    // One document whose stored block names a field id missing from the schema
    fn undecodable_segment(state: &IndexState) -> Arc<SegmentReader> {
        let generation = state.allocate_generation();
        let mut schema = Schema::new();
        schema.declare("id", ValueType::Text).unwrap();

        let value = StoredValue::Text("a".to_string());
        let mut stored = Vec::new();
        encode_stored_document(&[(7, &value)], &mut stored).unwrap();

        let mut file = Vec::new();
        let mut append = |data: &[u8]| {
            let framed = encode_region(data, CompressionType::None).unwrap();
            let handle = BlockHandle::new(file.len() as u64, framed.len() as u64);
            file.extend_from_slice(&framed);
            handle
        };
        let stored_offsets = append(&encode_offsets(&[0, stored.len() as u64]));
        let stored_data = append(&stored);
        let header = SegmentHeader {
            generation,
            doc_count: 1,
            schema,
            sort: IndexSort::none(),
            columns: Vec::new(),
            stored_offsets,
            stored_data,
        };
        let header_handle = append(&bincode::serialize(&header).unwrap());
        file.extend_from_slice(&Footer::new(header_handle, generation, 1).encode());

        let name = segment_file_name(generation);
        store::write_file(state.store().as_ref(), &name, &file).unwrap();
        Arc::new(SegmentReader::open(state.store().clone(), &name).unwrap())
    }

    fn new_state() -> (Arc<dyn ByteStore>, IndexState) {
        let store: Arc<dyn ByteStore> = Arc::new(MemoryStore::new());
        let state = IndexState::create(store.clone(), IndexSort::none()).unwrap();
        (store, state)
    }

    #[test]
    fn test_publish_and_reopen() {
        let (store, state) = new_state();
        state.publish(seal(&state, &["a", "b"])).unwrap();
        state.publish(seal(&state, &["c"])).unwrap();
        assert_eq!(state.segments().len(), 2);
        drop(state);

        let reopened = IndexState::open(store, IndexSort::none()).unwrap();
        let generations: Vec<u64> = reopened.segments().iter().map(|s| s.generation()).collect();
        assert_eq!(generations, vec![1, 2]);
        assert_eq!(reopened.allocate_generation(), 3);
    }

    #[test]
    fn test_create_twice_fails() {
        let (store, _state) = new_state();
        let result = IndexState::create(store, IndexSort::none());
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn test_mark_deleted_and_commit() {
        let (store, state) = new_state();
        state.publish(seal(&state, &["a", "b", "a"])).unwrap();

        assert_eq!(state.mark_deleted(&Term::stored("id", "a")).unwrap(), 2);
        assert_eq!(state.mark_deleted(&Term::stored("id", "a")).unwrap(), 0);
        assert!(state.has_pending_deletes());
        assert_eq!(state.snapshot().num_docs(), 1);

        state.commit().unwrap();
        assert!(!state.has_pending_deletes());
        assert!(store.exists("000001_1.liv").unwrap());
        drop(state);

        let reopened = IndexState::open(store, IndexSort::none()).unwrap();
        assert_eq!(reopened.segments()[0].deleted_count(), 2);
        assert_eq!(reopened.segments()[0].del_gen, 1);
    }

    #[test]
    fn test_mark_deleted_keeps_progress_before_failing_segment() {
        let (_store, state) = new_state();
        state.publish(seal(&state, &["a", "b"])).unwrap();
        state.publish(undecodable_segment(&state)).unwrap();
        state.publish(seal(&state, &["a"])).unwrap();

        let result = state.mark_deleted(&Term::stored("id", "a"));
        assert!(matches!(result, Err(Error::Corruption(_))));

        let segments = state.segments();
        assert_eq!(segments[0].deleted_count(), 1);
        assert!(segments[0].dirty);
        assert_eq!(segments[1].deleted_count(), 0);
        assert!(!segments[1].dirty);
        // Scanning stops at the failing segment
        assert_eq!(segments[2].deleted_count(), 0);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.num_docs(), 3);
        assert_eq!(snapshot.num_deleted_docs(), 1);
    }

    #[test]
    fn test_superseded_liveness_file_removed() {
        let (store, state) = new_state();
        state.publish(seal(&state, &["a", "b"])).unwrap();

        state.mark_deleted(&Term::stored("id", "a")).unwrap();
        state.commit().unwrap();
        state.mark_deleted(&Term::stored("id", "b")).unwrap();
        state.commit().unwrap();

        assert!(!store.exists("000001_1.liv").unwrap());
        assert!(store.exists("000001_2.liv").unwrap());
    }

    #[test]
    fn test_replace_retires_inputs() {
        let (store, state) = new_state();
        state.publish(seal(&state, &["a"])).unwrap();
        state.publish(seal(&state, &["b"])).unwrap();

        let inputs = state.segments().as_ref().clone();
        let pinned = state.snapshot();
        state.replace(&inputs, None).unwrap();
        drop(inputs);

        assert!(state.segments().is_empty());
        // The snapshot still pins the files
        assert!(store.exists("000001.seg").unwrap());
        drop(pinned);
        assert!(!store.exists("000001.seg").unwrap());
        assert!(!store.exists("000002.seg").unwrap());
    }

    #[test]
    fn test_replace_rejects_changed_inputs() {
        let (_store, state) = new_state();
        state.publish(seal(&state, &["a", "b"])).unwrap();

        let inputs = state.segments().as_ref().clone();
        state.mark_deleted(&Term::stored("id", "a")).unwrap();

        assert!(matches!(state.replace(&inputs, None), Err(Error::MergeAborted(_))));
        assert_eq!(state.segments().len(), 1);
    }

    #[test]
    fn test_open_rejects_other_sort() {
        use crate::sort::SortField;
        let (store, state) = new_state();
        drop(state);

        let result = IndexState::open(store, IndexSort::new(vec![SortField::ascending("v")]));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_open_removes_orphans() {
        let (store, state) = new_state();
        let orphan = seal(&state, &["x"]);
        let name = orphan.name().to_string();
        drop(orphan);
        drop(state);
        assert!(store.exists(&name).unwrap());

        let _reopened = IndexState::open(store.clone(), IndexSort::none()).unwrap();
        assert!(!store.exists(&name).unwrap());
    }
}
