//! Segment builder implementation.
//!
//! Builds a sealed segment file from documents supplied in index-sort order.

use crate::config::CompressionType;
use crate::document::{Document, FieldKind, FieldValue, StoredValue};
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::segment::codec::{encode_numeric_column, encode_offsets, encode_region, encode_stored_document};
use crate::segment::footer::{BlockHandle, Footer};
use crate::segment::{segment_file_name, ColumnHandle, SegmentHeader, SegmentInfo};
use crate::sort::{IndexSort, SortKey};
use crate::store::{ByteStore, PendingFile};

/// SegmentBuilder accumulates encoded columns for one segment.
///
/// Usage:
/// ```rust
/// use segdex::segment::SegmentBuilder;
/// use segdex::schema::Schema;
/// use segdex::store::MemoryStore;
/// use segdex::{CompressionType, Document, IndexSort};
///
/// let doc = Document::new().with_numeric("n", 1).with_stored("s", "one");
/// let mut schema = Schema::new();
/// schema.declare_document(&doc).unwrap();
///
/// let store = MemoryStore::new();
/// let mut builder = SegmentBuilder::new(1, schema, IndexSort::none(), CompressionType::None);
/// builder.add(&doc).unwrap();
/// let info = builder.finish(&store).unwrap();
/// assert_eq!(info.name, "000001.seg");
/// ```
pub struct SegmentBuilder {
    generation: u64,
    schema: Schema,
    sort: IndexSort,
    compression: CompressionType,
    columns: Vec<(u16, String, Vec<Option<i64>>)>,
    stored_data: Vec<u8>,
    stored_offsets: Vec<u64>,
    last_key: Option<SortKey>,
    num_docs: u32,
}

impl SegmentBuilder {
    /// Create a builder for segment `generation`.
    ///
    /// Every document added must fit `schema`.
    pub fn new(generation: u64, schema: Schema, sort: IndexSort, compression: CompressionType) -> Self {
        let columns = schema
            .numeric_fields()
            .map(|(id, info)| (id, info.name.clone(), Vec::new()))
            .collect();

        Self {
            generation,
            schema,
            sort,
            compression,
            columns,
            stored_data: Vec::new(),
            stored_offsets: vec![0],
            last_key: None,
            num_docs: 0,
        }
    }

    /// Add the next document.
    ///
    /// Documents must be added in index-sort order.
    pub fn add(&mut self, doc: &Document) -> Result<()> {
        if self.num_docs == u32::MAX {
            return Err(Error::invalid_argument("Segment document limit reached"));
        }

        self.schema.check(doc)?;

        // Verify documents arrive in sort order
        let key = self.sort.key_for_document(doc);
        if let Some(last) = &self.last_key {
            if key < *last {
                return Err(Error::invalid_argument("Documents must be added in sort order"));
            }
        }

        let mut stored: Vec<(u16, &StoredValue)> = Vec::new();
        for field in doc.fields() {
            match field.value() {
                FieldValue::Numeric(_) => {
                    if self.schema.lookup(field.name(), FieldKind::Numeric).is_none() {
                        return Err(Error::FieldNotFound(field.name().to_string()));
                    }
                }
                FieldValue::Stored(value) => {
                    let (id, _) = self
                        .schema
                        .lookup(field.name(), FieldKind::Stored)
                        .ok_or_else(|| Error::FieldNotFound(field.name().to_string()))?;
                    stored.push((id, value));
                }
            }
        }

        encode_stored_document(&stored, &mut self.stored_data)?;
        self.stored_offsets.push(self.stored_data.len() as u64);

        for (_, name, values) in &mut self.columns {
            values.push(doc.numeric(name));
        }

        self.last_key = Some(key);
        self.num_docs += 1;
        Ok(())
    }

    /// Get the number of documents added
    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    /// Returns true if no document was added.
    pub fn is_empty(&self) -> bool {
        self.num_docs == 0
    }

    /// Finish building: write, make durable and publish the segment file.
    ///
    /// Nothing is published if any step fails.
    pub fn finish(self, store: &dyn ByteStore) -> Result<SegmentInfo> {
        if self.num_docs == 0 {
            return Err(Error::invalid_argument("Cannot seal an empty segment"));
        }

        let mut file = PendingFile::create(store)?;

        let mut columns = Vec::with_capacity(self.columns.len());
        for (field_id, _, values) in &self.columns {
            let handle = write_region(&mut file, &encode_numeric_column(values), CompressionType::None)?;
            columns.push(ColumnHandle { field_id: *field_id, handle });
        }

        let stored_offsets =
            write_region(&mut file, &encode_offsets(&self.stored_offsets), CompressionType::None)?;
        let stored_data = write_region(&mut file, &self.stored_data, self.compression)?;

        let header = SegmentHeader {
            generation: self.generation,
            doc_count: self.num_docs,
            schema: self.schema,
            sort: self.sort,
            columns,
            stored_offsets,
            stored_data,
        };
        let header_handle = write_region(&mut file, &bincode::serialize(&header)?, CompressionType::None)?;

        let footer = Footer::new(header_handle, self.generation, self.num_docs as u64);
        file.write(&footer.encode())?;
        file.flush_durable()?;

        let file_size = file.written();
        let name = segment_file_name(self.generation);
        file.publish(&name)?;

        log::debug!("Sealed segment {} with {} documents ({} bytes)", name, self.num_docs, file_size);

        Ok(SegmentInfo { generation: self.generation, name, doc_count: self.num_docs, file_size })
    }
}

/// Frames `data` and appends it at the current end of `file`.
fn write_region(file: &mut PendingFile<'_>, data: &[u8], compression: CompressionType) -> Result<BlockHandle> {
    let framed = encode_region(data, compression)?;
    let offset = file.written();
    file.write(&framed)?;
    Ok(BlockHandle::new(offset, framed.len() as u64))
}
