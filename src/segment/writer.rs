//! In-memory document buffer that seals into a segment.
//!
//! Documents are kept in insertion order until flush, where a stable sort by
//! the index sort decides their local ordinals. Documents with equal sort keys
//! keep their insertion order, so flushing the same input twice yields the same
//! segment.

use crate::config::SegmentConfig;
use crate::document::{Document, Term};
use crate::error::Result;
use crate::schema::Schema;
use crate::segment::builder::SegmentBuilder;
use crate::segment::SegmentInfo;
use crate::store::ByteStore;

/// Buffers documents for the next segment.
///
/// # Example
///
/// ```rust
/// use segdex::segment::SegmentWriter;
/// use segdex::store::MemoryStore;
/// use segdex::{Document, IndexSort, SegmentConfig, SortField};
///
/// let mut writer = SegmentWriter::new();
/// for v in [3, 9, 1] {
///     writer.add(Document::new().with_numeric("dense_int", v)).unwrap();
/// }
///
/// let store = MemoryStore::new();
/// let config = SegmentConfig {
///     sort: IndexSort::new(vec![SortField::descending("dense_int")]),
///     ..Default::default()
/// };
/// let info = writer.flush(&store, 1, &config).unwrap();
/// assert_eq!(info.doc_count, 3);
/// ```
#[derive(Debug, Default)]
pub struct SegmentWriter {
    schema: Schema,
    docs: Vec<Document>,
    ram_bytes: usize,
}

impl SegmentWriter {
    /// Creates an empty writer with an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty writer whose schema already holds `schema`'s declarations.
    pub fn with_schema(schema: Schema) -> Self {
        Self { schema, docs: Vec::new(), ram_bytes: 0 }
    }

    /// Buffers a document.
    ///
    /// Fails with `SchemaConflict` if a field's type contradicts an earlier
    /// declaration; the document is then not buffered.
    pub fn add(&mut self, doc: Document) -> Result<()> {
        doc.validate()?;
        self.schema.declare_document(&doc)?;
        self.ram_bytes += doc.approximate_size();
        self.docs.push(doc);
        Ok(())
    }

    /// Checks a document against the writer's schema without buffering it.
    pub fn check(&self, doc: &Document) -> Result<()> {
        doc.validate()?;
        self.schema.check(doc)
    }

    /// Drops buffered documents matching `term`. Returns how many were dropped.
    pub fn delete_matching(&mut self, term: &Term) -> usize {
        let before = self.docs.len();
        self.docs.retain(|doc| !doc.matches(term));
        let removed = before - self.docs.len();
        if removed > 0 {
            self.ram_bytes = self.docs.iter().map(Document::approximate_size).sum();
        }
        removed
    }

    /// Returns the number of buffered documents.
    pub fn num_docs(&self) -> usize {
        self.docs.len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Approximate memory held by buffered documents.
    pub fn ram_bytes_used(&self) -> usize {
        self.ram_bytes
    }

    /// Returns the writer's schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Sorts, writes and publishes the buffered documents as segment `generation`.
    pub fn flush(self, store: &dyn ByteStore, generation: u64, config: &SegmentConfig) -> Result<SegmentInfo> {
        self.seal(store, generation, config)
    }

    /// Like `flush`, but keeps the buffer so a failed seal can be retried.
    pub(crate) fn seal(&self, store: &dyn ByteStore, generation: u64, config: &SegmentConfig) -> Result<SegmentInfo> {
        // Segment schema covers only the fields its documents carry
        let mut schema = Schema::new();
        for doc in &self.docs {
            schema.declare_document(doc)?;
        }

        let mut builder = SegmentBuilder::new(generation, schema, config.sort.clone(), config.compression);
        for &i in &self.sorted_order(config) {
            builder.add(&self.docs[i])?;
        }
        builder.finish(store)
    }

    /// Buffer positions in flush order (stable by insertion order).
    fn sorted_order(&self, config: &SegmentConfig) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.docs.len()).collect();
        if !config.sort.is_empty() {
            let keys: Vec<_> = self.docs.iter().map(|d| config.sort.key_for_document(d)).collect();
            order.sort_by(|&a, &b| keys[a].cmp(&keys[b]));
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sort::{IndexSort, SortField};
    use crate::store::MemoryStore;

    fn descending() -> SegmentConfig {
        SegmentConfig { sort: IndexSort::new(vec![SortField::descending("v")]), ..Default::default() }
    }

    #[test]
    fn test_schema_conflict_not_buffered() {
        let mut writer = SegmentWriter::new();
        writer.add(Document::new().with_stored("s", "text")).unwrap();

        let result = writer.add(Document::new().with_stored("s", 5));
        assert!(matches!(result, Err(Error::SchemaConflict { .. })));
        assert_eq!(writer.num_docs(), 1);
    }

    #[test]
    fn test_stable_sort_order() {
        let mut writer = SegmentWriter::new();
        for (v, tag) in [(1, 0), (5, 1), (1, 2), (5, 3), (3, 4)] {
            writer.add(Document::new().with_numeric("v", v).with_stored("tag", tag)).unwrap();
        }

        let order = writer.sorted_order(&descending());
        assert_eq!(order, vec![1, 3, 4, 0, 2]);
    }

    #[test]
    fn test_insertion_order_without_sort() {
        let mut writer = SegmentWriter::new();
        for v in [3, 1, 2] {
            writer.add(Document::new().with_numeric("v", v)).unwrap();
        }
        assert_eq!(writer.sorted_order(&SegmentConfig::default()), vec![0, 1, 2]);
    }

    #[test]
    fn test_delete_matching() {
        let mut writer = SegmentWriter::new();
        writer.add(Document::new().with_stored("id", "a")).unwrap();
        writer.add(Document::new().with_stored("id", "b")).unwrap();
        let before = writer.ram_bytes_used();

        assert_eq!(writer.delete_matching(&Term::stored("id", "a")), 1);
        assert_eq!(writer.delete_matching(&Term::stored("id", "zz")), 0);
        assert_eq!(writer.num_docs(), 1);
        assert!(writer.ram_bytes_used() < before);
    }

    #[test]
    fn test_flush_empty_fails() {
        let store = MemoryStore::new();
        assert!(SegmentWriter::new().flush(&store, 1, &SegmentConfig::default()).is_err());
    }

    #[test]
    fn test_seal_keeps_buffer() {
        let store = MemoryStore::new();
        let mut writer = SegmentWriter::new();
        writer.add(Document::new().with_numeric("v", 1)).unwrap();

        writer.seal(&store, 1, &descending()).unwrap();
        assert_eq!(writer.num_docs(), 1);
        assert!(store.exists("000001.seg").unwrap());
    }
}
