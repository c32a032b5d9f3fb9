//! # segdex - A Segmented, Index-Time-Sorted Document Store
//!
//! segdex stores documents in immutable segments. Each segment is sorted by a
//! configurable index sort when it is sealed, deletions are tracked in a
//! separate liveness bitmap, and merges fold segments together while keeping
//! the sort order and dropping deleted documents.
//!
//! ## Architecture
//!
//! The storage engine consists of several key components:
//!
//! - **ByteStore**: Durable file abstraction with atomic publish
//! - **SegmentWriter**: Buffers documents and seals them into a sorted segment
//! - **SegmentReader**: Column and stored-field lookup by local ordinal
//! - **Merger**: K-way merge of segments into one sorted segment
//! - **IndexState**: Segment list, liveness and the manifest commit point
//! - **Snapshot**: Point-in-time view with global document ids
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use segdex::{Document, Index, IndexSort, Options, SortField, Term};
//!
//! # fn main() -> Result<(), segdex::Error> {
//! let options = Options::default()
//!     .index_sort(IndexSort::new(vec![SortField::descending("dense_int")]));
//! let index = Index::open("./data", options)?;
//!
//! // Write operations
//! index.add_document(
//!     Document::new()
//!         .with_numeric("dense_int", 7)
//!         .with_stored("dense_string", "7"),
//! )?;
//! index.flush()?;
//!
//! // Update by key
//! index.update_document(
//!     &Term::stored("dense_string", "7"),
//!     Document::new()
//!         .with_numeric("dense_int", 88)
//!         .with_stored("dense_string", "7"),
//! )?;
//! index.flush()?;
//!
//! // Read operations
//! let snapshot = index.snapshot();
//! for id in snapshot.search_sorted(&index.options().index_sort, 10)? {
//!     println!("{:?}", snapshot.stored_fields(id)?);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod config;
pub mod document;
pub mod error;
pub mod merge;
pub mod schema;
pub mod segment;
pub mod snapshot;
pub mod sort;
pub mod state;
pub mod store;

// Re-exports
pub use config::{CompressionType, Options, SegmentConfig};
pub use document::{Document, Field, FieldKind, FieldValue, StoredFields, StoredValue, Term, ValueType};
pub use error::{Error, Result};
pub use snapshot::{DocAddress, DocId, Snapshot};
pub use sort::{IndexSort, SortDirection, SortField};
pub use store::{ByteStore, FsStore, MemoryStore};

use merge::{MergePicker, MergeTask, Merger};
use parking_lot::Mutex;
use segment::{SegmentReader, SegmentWriter};
use state::{IndexState, Manifest};
use std::sync::Arc;

/// The main index handle.
///
/// All mutations (add, delete, update, flush, merge) go through a single
/// writer path; reads go through snapshots and never block it.
///
/// # Thread Safety
///
/// `Index` is designed to be thread-safe and can be safely shared across
/// threads using `Arc<Index>`.
pub struct Index {
    /// Configuration options
    options: Options,

    /// Backing byte store
    store: Arc<dyn ByteStore>,

    /// Buffer for the next segment; its lock is the single writer path
    writer: Mutex<SegmentWriter>,

    /// Segment list and liveness
    state: IndexState,

    /// Segment merger
    merger: Merger,

    /// Merge candidate picker
    picker: MergePicker,
}

impl Index {
    /// Opens an index stored in the directory `path`.
    ///
    /// If the index does not exist, it is created when
    /// `options.create_if_missing` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path is invalid or inaccessible
    /// - The index exists and `error_if_exists` is set
    /// - The index was written with a different index sort
    /// - Recovery fails due to corrupted data
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use segdex::{Index, Options};
    ///
    /// # fn main() -> Result<(), segdex::Error> {
    /// let index = Index::open("./my_index", Options::default())?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open<P: AsRef<std::path::Path>>(path: P, options: Options) -> Result<Self> {
        let path = path.as_ref();
        options.validate()?;

        if !path.exists() && !options.create_if_missing {
            return Err(Error::NotFound(format!("Index directory does not exist: {:?}", path)));
        }

        let store = FsStore::open(path)?;
        Self::open_with_store(Arc::new(store), options)
    }

    /// Opens an index on an arbitrary byte store.
    pub fn open_with_store(store: Arc<dyn ByteStore>, options: Options) -> Result<Self> {
        options.validate()?;

        let state = if Manifest::exists(store.as_ref())? {
            if options.error_if_exists {
                return Err(Error::AlreadyExists("Index already exists".to_string()));
            }
            IndexState::open(store.clone(), options.index_sort.clone())?
        } else if options.create_if_missing {
            IndexState::create(store.clone(), options.index_sort.clone())?
        } else {
            return Err(Error::NotFound("Index does not exist".to_string()));
        };

        let writer = SegmentWriter::with_schema(state.schema()?);
        let merger = Merger::new(options.segment_config());
        let picker = MergePicker::from_options(&options);

        Ok(Self { options, store, writer: Mutex::new(writer), state, merger, picker })
    }

    /// Returns the options the index was opened with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Buffers a document for the next segment.
    ///
    /// The document becomes visible to snapshots after the next flush, which
    /// happens automatically once `max_buffered_docs` or `ram_buffer_size` is
    /// reached.
    ///
    /// # Errors
    ///
    /// Fails with `SchemaConflict` if a field's type contradicts the index
    /// schema; the document is not buffered.
    pub fn add_document(&self, doc: Document) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.add(doc)?;
        self.maybe_auto_flush(&mut writer)
    }

    /// Deletes every document carrying `term`, buffered or sealed.
    ///
    /// Returns the number of documents deleted. Deletions of sealed documents
    /// are visible to new snapshots immediately and persisted at the next flush.
    pub fn delete_documents(&self, term: &Term) -> Result<usize> {
        let mut writer = self.writer.lock();
        self.delete_locked(&mut writer, term)
    }

    /// Replaces every document carrying `term` with `doc`.
    ///
    /// The replacement is checked against the schema first, so a rejected
    /// document never deletes anything. A snapshot taken before the next flush
    /// sees the old documents deleted but not yet the replacement.
    pub fn update_document(&self, term: &Term, doc: Document) -> Result<usize> {
        let mut writer = self.writer.lock();
        writer.check(&doc)?;
        let deleted = self.delete_locked(&mut writer, term)?;
        writer.add(doc)?;
        self.maybe_auto_flush(&mut writer)?;
        Ok(deleted)
    }

    fn delete_locked(&self, writer: &mut SegmentWriter, term: &Term) -> Result<usize> {
        let buffered = writer.delete_matching(term);
        let sealed = self.state.mark_deleted(term)?;
        Ok(buffered + sealed)
    }

    fn maybe_auto_flush(&self, writer: &mut SegmentWriter) -> Result<()> {
        if writer.num_docs() >= self.options.max_buffered_docs
            || writer.ram_bytes_used() >= self.options.ram_buffer_size
        {
            log::debug!(
                "Auto flush: {} buffered docs, {} bytes",
                writer.num_docs(),
                writer.ram_bytes_used()
            );
            self.flush_locked(writer)?;
            if self.options.auto_merge {
                self.maybe_merge_locked()?;
            }
        }
        Ok(())
    }

    /// Seals buffered documents into a new segment and persists deletions.
    ///
    /// On failure the segment list is unchanged and the buffered documents
    /// are kept, so the flush can be retried.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use segdex::{Document, Index, Options};
    /// # fn main() -> Result<(), segdex::Error> {
    /// # let index = Index::open("./data", Options::default())?;
    /// index.add_document(Document::new().with_numeric("n", 1))?;
    /// index.flush()?; // Make the document visible
    /// # Ok(())
    /// # }
    /// ```
    pub fn flush(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        self.flush_locked(&mut writer)?;
        if self.options.auto_merge {
            self.maybe_merge_locked()?;
        }
        Ok(())
    }

    fn flush_locked(&self, writer: &mut SegmentWriter) -> Result<()> {
        if writer.is_empty() {
            return self.state.commit();
        }

        let generation = self.state.allocate_generation();
        let info = writer.seal(self.store.as_ref(), generation, &self.options.segment_config())?;

        let reader = match SegmentReader::open(self.store.clone(), &info.name) {
            Ok(reader) => Arc::new(reader),
            Err(e) => {
                self.remove_file(&info.name);
                return Err(e);
            }
        };

        if let Err(e) = self.state.publish(reader.clone()) {
            reader.mark_retired();
            return Err(e);
        }

        log::info!(
            "Flushed {} documents to segment {} ({} bytes)",
            info.doc_count,
            info.name,
            info.file_size
        );

        *writer = SegmentWriter::with_schema(writer.schema().clone());
        Ok(())
    }

    fn remove_file(&self, name: &str) {
        if let Err(e) = self.store.delete(name) {
            log::warn!("Failed to remove {}: {}", name, e);
        }
    }

    /// Runs the merge policy until it selects nothing.
    pub fn maybe_merge(&self) -> Result<()> {
        let _writer = self.writer.lock();
        self.maybe_merge_locked()
    }

    fn maybe_merge_locked(&self) -> Result<()> {
        while let Some(task) = self.picker.pick_merge(&self.state.segments()) {
            self.run_merge(task)?;
        }
        Ok(())
    }

    /// Flushes, then merges until at most `max_segments` segments remain and
    /// none of them carries deleted documents.
    ///
    /// `force_merge(1)` leaves a single segment with no deletions.
    pub fn force_merge(&self, max_segments: usize) -> Result<()> {
        if max_segments == 0 {
            return Err(Error::invalid_argument("max_segments must be > 0"));
        }

        let mut writer = self.writer.lock();
        self.flush_locked(&mut writer)?;

        log::info!(
            "Force merge to {} segments ({} segments, {} deleted docs)",
            max_segments,
            self.state.segments().len(),
            self.state.snapshot().num_deleted_docs()
        );

        while let Some(task) = self.picker.pick_forced_merge(&self.state.segments(), max_segments) {
            self.run_merge(task)?;
        }
        Ok(())
    }

    fn run_merge(&self, task: MergeTask) -> Result<()> {
        log::info!("Triggering merge ({:?}): {} input segments", task.reason, task.inputs.len());

        let generation = self.state.allocate_generation();
        let result = match self.merger.merge(&task.inputs, self.store.as_ref(), generation) {
            Ok(result) => result,
            Err(Error::MergeAborted(reason)) => {
                // Nothing live is left in the inputs; drop them
                log::info!("Merge aborted: {}", reason);
                return self.state.replace(&task.inputs, None);
            }
            Err(e) => return Err(e),
        };

        let reader = match SegmentReader::open(self.store.clone(), &result.info.name) {
            Ok(reader) => Arc::new(reader),
            Err(e) => {
                self.remove_file(&result.info.name);
                return Err(e);
            }
        };

        if let Err(e) = self.state.replace(&task.inputs, Some(reader.clone())) {
            reader.mark_retired();
            return Err(e);
        }

        log::info!(
            "Merged segments {:?} into {} ({} deleted docs dropped)",
            result.input_generations,
            result.info.name,
            result.dropped_docs
        );
        Ok(())
    }

    /// Returns a point-in-time view of the index.
    pub fn snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }

    /// Number of live documents visible to new snapshots.
    pub fn num_docs(&self) -> u64 {
        self.snapshot().num_docs()
    }

    /// Number of deleted documents not yet merged away.
    pub fn num_deleted_docs(&self) -> u64 {
        self.snapshot().num_deleted_docs()
    }

    /// Number of segments.
    pub fn num_segments(&self) -> usize {
        self.state.segments().len()
    }

    /// Number of documents buffered for the next flush.
    pub fn num_buffered_docs(&self) -> usize {
        self.writer.lock().num_docs()
    }

    /// Closes the index, flushing buffered documents and deletions.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn close(&self) -> Result<()> {
        self.flush()?;
        log::info!("Index closed successfully");
        Ok(())
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        // Errors can't be propagated from drop
        let mut writer = self.writer.lock();
        if let Err(e) = self.flush_locked(&mut writer) {
            log::error!("Error flushing index during drop: {}", e);
        }
    }
}
