//! Segment reader implementation.
//!
//! Opens a sealed segment and serves column values and stored fields by local
//! ordinal. A reader is immutable once opened and is shared through `Arc`
//! between the index state and any number of snapshots.

use crate::document::{Document, Field, FieldKind, FieldValue, StoredFields, Term};
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::segment::codec::{decode_stored_document, read_region, NumericColumn, StoredBlock};
use crate::segment::footer::Footer;
use crate::segment::live::LiveDocs;
use crate::segment::SegmentHeader;
use crate::sort::{IndexSort, SortKey};
use crate::store::ByteStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// SegmentReader provides read access to one sealed segment.
///
/// When a reader has been retired (its segment merged away or dropped), the
/// backing file is deleted as soon as the last handle to it goes away.
#[derive(Debug)]
pub struct SegmentReader {
    name: String,
    generation: u64,
    doc_count: u32,
    schema: Schema,
    sort: IndexSort,
    columns: HashMap<u16, NumericColumn>,
    stored: StoredBlock,
    file_size: u64,
    store: Arc<dyn ByteStore>,
    retired: AtomicBool,
}

impl SegmentReader {
    /// Open the segment file `name` and verify every region.
    pub fn open(store: Arc<dyn ByteStore>, name: &str) -> Result<Self> {
        let file = store.open(name)?;
        let footer = Footer::read_from(&file)?;

        let header_data = read_region(&file, &footer.header_handle)?;
        let header: SegmentHeader = bincode::deserialize(&header_data)?;

        if header.generation != footer.generation || header.doc_count as u64 != footer.doc_count {
            return Err(Error::corruption(format!(
                "Segment {} header (gen {}, {} docs) disagrees with footer (gen {}, {} docs)",
                name, header.generation, header.doc_count, footer.generation, footer.doc_count
            )));
        }

        let mut columns = HashMap::with_capacity(header.columns.len());
        for column in &header.columns {
            match header.schema.get(column.field_id) {
                Some(info) if info.kind() == FieldKind::Numeric => {}
                _ => {
                    return Err(Error::corruption(format!(
                        "Column for field id {} is not a numeric field",
                        column.field_id
                    )));
                }
            }
            let data = read_region(&file, &column.handle)?;
            columns.insert(column.field_id, NumericColumn::decode(data, header.doc_count)?);
        }

        let stored = StoredBlock::decode(
            read_region(&file, &header.stored_offsets)?,
            read_region(&file, &header.stored_data)?,
            header.doc_count,
        )?;

        Ok(Self {
            name: name.to_string(),
            generation: header.generation,
            doc_count: header.doc_count,
            schema: header.schema,
            sort: header.sort,
            columns,
            stored,
            file_size: file.len() as u64,
            store,
            retired: AtomicBool::new(false),
        })
    }

    /// Segment generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// File name in the byte store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of documents, live or deleted.
    pub fn max_doc(&self) -> u32 {
        self.doc_count
    }

    /// Fields present in this segment.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Sort the segment was sealed under.
    pub fn sort(&self) -> &IndexSort {
        &self.sort
    }

    /// Size of the segment file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    fn check_ordinal(&self, ordinal: u32) -> Result<()> {
        if ordinal >= self.doc_count {
            return Err(Error::out_of_range(ordinal, self.doc_count));
        }
        Ok(())
    }

    fn column(&self, field: &str) -> Option<&NumericColumn> {
        let (id, _) = self.schema.lookup(field, FieldKind::Numeric)?;
        self.columns.get(&id)
    }

    /// Returns the numeric column value of `field` at `ordinal`.
    ///
    /// `Ok(None)` means the document has no value for a field the segment does
    /// have. Fails with `FieldNotFound` if the segment has no such column.
    pub fn numeric_value(&self, field: &str, ordinal: u32) -> Result<Option<i64>> {
        self.check_ordinal(ordinal)?;
        let column = self.column(field).ok_or_else(|| Error::FieldNotFound(field.to_string()))?;
        Ok(column.get(ordinal))
    }

    /// Returns the stored fields of the document at `ordinal`.
    pub fn stored_fields(&self, ordinal: u32) -> Result<StoredFields> {
        self.check_ordinal(ordinal)?;
        decode_stored_document(self.stored.document_bytes(ordinal)?, &self.schema)
    }

    /// Reads liveness from the bitmap owned by the index state.
    pub fn is_live(&self, ordinal: u32, live: &LiveDocs) -> bool {
        ordinal < self.doc_count && live.is_live(ordinal)
    }

    /// Rebuilds the full document at `ordinal` (numeric fields first).
    pub fn document(&self, ordinal: u32) -> Result<Document> {
        self.check_ordinal(ordinal)?;
        let mut doc = Document::new();
        for (id, info) in self.schema.numeric_fields() {
            if let Some(value) = self.columns.get(&id).and_then(|c| c.get(ordinal)) {
                doc.add(Field::numeric(info.name.clone(), value));
            }
        }
        for (name, value) in self.stored_fields(ordinal)?.iter() {
            doc.add(Field::stored(name, value.clone()));
        }
        Ok(doc)
    }

    /// Computes the sort key of `ordinal` under `sort`.
    ///
    /// Fields the segment does not have sort as missing.
    pub fn sort_key(&self, sort: &IndexSort, ordinal: u32) -> Result<SortKey> {
        self.check_ordinal(ordinal)?;
        let values = sort.fields().iter().map(|f| self.column(f.field()).and_then(|c| c.get(ordinal)));
        Ok(sort.key_from_values(values))
    }

    /// Returns true if the document at `ordinal` carries `term`.
    pub fn matches(&self, term: &Term, ordinal: u32) -> Result<bool> {
        self.check_ordinal(ordinal)?;
        match term.value() {
            FieldValue::Numeric(v) => {
                Ok(self.column(term.field()).and_then(|c| c.get(ordinal)) == Some(*v))
            }
            FieldValue::Stored(v) => {
                if self.schema.lookup(term.field(), FieldKind::Stored).is_none() {
                    return Ok(false);
                }
                Ok(self.stored_fields(ordinal)?.get(term.field()) == Some(v))
            }
        }
    }

    /// Returns true if the segment can contain documents matching `term`.
    pub fn may_contain(&self, term: &Term) -> bool {
        let kind = term.value().kind();
        self.schema.lookup(term.field(), kind).is_some()
    }

    /// Schedules the segment file for deletion once the last handle drops.
    pub fn mark_retired(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    /// Returns true if the segment was retired.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }
}

impl Drop for SegmentReader {
    fn drop(&mut self) {
        if self.retired.load(Ordering::SeqCst) {
            match self.store.delete(&self.name) {
                Ok(()) => log::debug!("Deleted retired segment {}", self.name),
                Err(e) => log::warn!("Failed to delete retired segment {}: {}", self.name, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentConfig;
    use crate::segment::writer::SegmentWriter;
    use crate::sort::SortField;
    use crate::store::MemoryStore;

    fn build(store: &Arc<MemoryStore>, values: &[i64]) -> SegmentReader {
        let mut writer = SegmentWriter::new();
        for &v in values {
            writer
                .add(
                    Document::new()
                        .with_numeric("dense_int", v)
                        .with_stored("dense_int", v)
                        .with_stored("dense_string", v.to_string()),
                )
                .unwrap();
        }
        let config = SegmentConfig {
            sort: IndexSort::new(vec![SortField::descending("dense_int")]),
            ..Default::default()
        };
        let info = writer.flush(store.as_ref(), 1, &config).unwrap();
        SegmentReader::open(store.clone(), &info.name).unwrap()
    }

    #[test]
    fn test_sorted_values() {
        let store = Arc::new(MemoryStore::new());
        let reader = build(&store, &[3, 9, 1, 9, 4]);

        assert_eq!(reader.max_doc(), 5);
        let values: Vec<i64> =
            (0..5).map(|i| reader.numeric_value("dense_int", i).unwrap().unwrap()).collect();
        assert_eq!(values, vec![9, 9, 4, 3, 1]);

        let stored = reader.stored_fields(0).unwrap();
        assert_eq!(stored.get_long("dense_int"), Some(9));
        assert_eq!(stored.get_text("dense_string"), Some("9"));
    }

    #[test]
    fn test_errors() {
        let store = Arc::new(MemoryStore::new());
        let reader = build(&store, &[1, 2]);

        assert!(matches!(reader.numeric_value("nope", 0), Err(Error::FieldNotFound(_))));
        assert!(matches!(
            reader.numeric_value("dense_int", 2),
            Err(Error::OrdinalOutOfRange { ordinal: 2, max_doc: 2 })
        ));
        assert!(matches!(reader.stored_fields(7), Err(Error::OrdinalOutOfRange { .. })));
    }

    #[test]
    fn test_document_and_matches() {
        let store = Arc::new(MemoryStore::new());
        let reader = build(&store, &[8, 7]);

        let doc = reader.document(1).unwrap();
        assert_eq!(doc.numeric("dense_int"), Some(7));
        assert!(doc.matches(&Term::stored("dense_string", "7")));

        assert!(reader.matches(&Term::stored("dense_string", "8"), 0).unwrap());
        assert!(reader.matches(&Term::numeric("dense_int", 7), 1).unwrap());
        assert!(!reader.matches(&Term::stored("missing", "8"), 0).unwrap());
    }

    #[test]
    fn test_corrupted_file_detected() {
        let store = Arc::new(MemoryStore::new());
        let reader = build(&store, &[1, 2, 3]);
        let mut bytes = store.open(reader.name()).unwrap().to_vec();
        bytes[2] ^= 0xFF;
        crate::store::write_file(store.as_ref(), "broken.seg", &bytes).unwrap();

        let result = SegmentReader::open(store.clone(), "broken.seg");
        assert!(matches!(result, Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_retired_file_deleted_on_drop() {
        let store = Arc::new(MemoryStore::new());
        let reader = Arc::new(build(&store, &[1]));
        let pinned = reader.clone();

        reader.mark_retired();
        drop(reader);
        assert!(store.exists("000001.seg").unwrap());

        drop(pinned);
        assert!(!store.exists("000001.seg").unwrap());
    }
}
