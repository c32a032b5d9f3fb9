//! Column codec: region framing, numeric columns and stored-field blobs.
//!
//! All integers are little-endian. A numeric column is a presence bitmap of
//! `ceil(N/8)` bytes followed by `N` fixed-width `i64` values, so the value of
//! ordinal `i` lives at a computable offset. Stored documents are encoded as
//!
//! ```text
//! [count: u16] { [field_id: u16] [type: u8] [len: u32] [payload] }*
//! ```
//!
//! and concatenated; an `(N + 1)`-entry offset table locates each one.

use crate::config::CompressionType;
use crate::document::{StoredFields, StoredValue, ValueType};
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::segment::footer::BlockHandle;
use crate::segment::BLOCK_TRAILER_SIZE;
use bytes::{Buf, BufMut, Bytes};

/// Frames `data` as `payload | compression type | crc32`.
///
/// The checksum covers the (possibly compressed) payload.
pub fn encode_region(data: &[u8], compression: CompressionType) -> Result<Vec<u8>> {
    let payload = compress(data, compression)?;
    let mut framed = Vec::with_capacity(payload.len() + BLOCK_TRAILER_SIZE);
    framed.extend_from_slice(&payload);
    framed.push(compression as u8);
    framed.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(framed)
}

/// Verifies and unwraps a framed region.
pub fn decode_region(framed: &[u8]) -> Result<Bytes> {
    if framed.len() < BLOCK_TRAILER_SIZE {
        return Err(Error::corruption("Region size too small"));
    }

    let data_size = framed.len() - BLOCK_TRAILER_SIZE;
    let data = &framed[..data_size];
    let compression_type = framed[data_size];
    let mut checksum_bytes = &framed[data_size + 1..];
    let stored_checksum = checksum_bytes.get_u32_le();

    let computed_checksum = crc32fast::hash(data);
    if computed_checksum != stored_checksum {
        return Err(Error::ChecksumMismatch { expected: stored_checksum, actual: computed_checksum });
    }

    let compression = CompressionType::from_u8(compression_type)
        .ok_or_else(|| Error::corruption(format!("Invalid compression type {}", compression_type)))?;

    decompress(data, compression)
}

/// Reads the region at `handle` out of a whole file.
pub fn read_region(file: &Bytes, handle: &BlockHandle) -> Result<Bytes> {
    let end = handle.end_offset();
    if end > file.len() as u64 {
        return Err(Error::corruption(format!(
            "Region {}..{} past end of file ({} bytes)",
            handle.offset,
            end,
            file.len()
        )));
    }
    decode_region(&file[handle.offset as usize..end as usize])
}

fn compress(data: &[u8], compression: CompressionType) -> Result<Vec<u8>> {
    match compression {
        CompressionType::None => Ok(data.to_vec()),
        #[cfg(feature = "snappy")]
        CompressionType::Snappy => snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| Error::internal(format!("Compression failed: {}", e))),
        #[cfg(feature = "lz4-compression")]
        CompressionType::Lz4 => lz4::block::compress(data, None, true)
            .map_err(|e| Error::internal(format!("Compression failed: {}", e))),
    }
}

fn decompress(data: &[u8], compression: CompressionType) -> Result<Bytes> {
    let decompressed: Vec<u8> = match compression {
        CompressionType::None => return Ok(Bytes::copy_from_slice(data)),
        #[cfg(feature = "snappy")]
        CompressionType::Snappy => snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| Error::corruption(format!("Decompression failed: {}", e)))?,
        #[cfg(feature = "lz4-compression")]
        CompressionType::Lz4 => lz4::block::decompress(data, None)
            .map_err(|e| Error::corruption(format!("Decompression failed: {}", e)))?,
    };
    Ok(Bytes::from(decompressed))
}

/// Number of bytes in a bitmap of `n` bits.
pub fn bitmap_len(n: usize) -> usize {
    n.div_ceil(8)
}

/// Encodes a dense numeric column; `None` marks a document without the field.
pub fn encode_numeric_column(values: &[Option<i64>]) -> Vec<u8> {
    let bitmap = bitmap_len(values.len());
    let mut buf = Vec::with_capacity(bitmap + values.len() * 8);
    buf.resize(bitmap, 0);
    for (i, value) in values.iter().enumerate() {
        if value.is_some() {
            buf[i / 8] |= 1 << (i % 8);
        }
    }
    for value in values {
        buf.put_i64_le(value.unwrap_or(0));
    }
    buf
}

/// Decoded view of one numeric column.
#[derive(Debug, Clone)]
pub struct NumericColumn {
    presence: Bytes,
    values: Bytes,
    doc_count: u32,
}

impl NumericColumn {
    /// Wraps a decoded column region of `doc_count` values.
    pub fn decode(data: Bytes, doc_count: u32) -> Result<Self> {
        let bitmap = bitmap_len(doc_count as usize);
        let expected = bitmap + doc_count as usize * 8;
        if data.len() != expected {
            return Err(Error::corruption(format!(
                "Numeric column size mismatch: expected {}, got {}",
                expected,
                data.len()
            )));
        }
        Ok(Self { presence: data.slice(..bitmap), values: data.slice(bitmap..), doc_count })
    }

    /// Returns the value at `ordinal`, or `None` if the document has no value.
    ///
    /// The caller bounds-checks `ordinal`.
    pub fn get(&self, ordinal: u32) -> Option<i64> {
        debug_assert!(ordinal < self.doc_count);
        let i = ordinal as usize;
        if self.presence[i / 8] & (1 << (i % 8)) == 0 {
            return None;
        }
        let mut slot = &self.values[i * 8..i * 8 + 8];
        Some(slot.get_i64_le())
    }
}

/// Encodes the stored offset table.
pub fn encode_offsets(offsets: &[u64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(offsets.len() * 8);
    for &offset in offsets {
        buf.put_u64_le(offset);
    }
    buf
}

/// Decoded stored-field block: offset table plus blob region.
#[derive(Debug, Clone)]
pub struct StoredBlock {
    offsets: Bytes,
    data: Bytes,
}

impl StoredBlock {
    /// Wraps decoded offset and data regions for `doc_count` documents.
    pub fn decode(offsets: Bytes, data: Bytes, doc_count: u32) -> Result<Self> {
        let expected = (doc_count as usize + 1) * 8;
        if offsets.len() != expected {
            return Err(Error::corruption(format!(
                "Stored offset table size mismatch: expected {}, got {}",
                expected,
                offsets.len()
            )));
        }
        let block = Self { offsets, data };
        if block.offset(doc_count as usize) != block.data.len() as u64 {
            return Err(Error::corruption("Stored offset table does not cover the data region"));
        }
        Ok(block)
    }

    fn offset(&self, i: usize) -> u64 {
        let mut slot = &self.offsets[i * 8..i * 8 + 8];
        slot.get_u64_le()
    }

    /// Returns the encoded document at `ordinal`.
    pub fn document_bytes(&self, ordinal: u32) -> Result<Bytes> {
        let start = self.offset(ordinal as usize);
        let end = self.offset(ordinal as usize + 1);
        if start > end || end > self.data.len() as u64 {
            return Err(Error::corruption(format!(
                "Invalid stored offsets {}..{} for ordinal {}",
                start, end, ordinal
            )));
        }
        Ok(self.data.slice(start as usize..end as usize))
    }
}

/// Appends one encoded stored document to `buf`.
pub fn encode_stored_document(fields: &[(u16, &StoredValue)], buf: &mut Vec<u8>) -> Result<()> {
    let count = u16::try_from(fields.len())
        .map_err(|_| Error::invalid_argument("Too many stored fields in document"))?;
    buf.put_u16_le(count);
    for (field_id, value) in fields {
        buf.put_u16_le(*field_id);
        buf.put_u8(value.value_type() as u8);
        match value {
            StoredValue::Long(v) => {
                buf.put_u32_le(8);
                buf.put_i64_le(*v);
            }
            StoredValue::Text(s) => put_blob(buf, s.as_bytes())?,
            StoredValue::Bytes(b) => put_blob(buf, b)?,
        }
    }
    Ok(())
}

fn put_blob(buf: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len())
        .map_err(|_| Error::invalid_argument("Stored value larger than 4GiB"))?;
    buf.put_u32_le(len);
    buf.put_slice(data);
    Ok(())
}

/// Decodes one stored document, resolving field ids against `schema`.
pub fn decode_stored_document(mut data: Bytes, schema: &Schema) -> Result<StoredFields> {
    if data.remaining() < 2 {
        return Err(Error::corruption("Stored document truncated"));
    }
    let count = data.get_u16_le() as usize;
    let mut fields = StoredFields::with_capacity(count);

    for _ in 0..count {
        if data.remaining() < 7 {
            return Err(Error::corruption("Stored field header truncated"));
        }
        let field_id = data.get_u16_le();
        let tag = data.get_u8();
        let len = data.get_u32_le() as usize;
        if data.remaining() < len {
            return Err(Error::corruption("Stored field payload truncated"));
        }
        let payload = data.split_to(len);

        let info = schema
            .get(field_id)
            .ok_or_else(|| Error::corruption(format!("Unknown field id {}", field_id)))?;
        let value_type = ValueType::from_u8(tag)
            .ok_or_else(|| Error::corruption(format!("Invalid value type {}", tag)))?;
        if value_type != info.value_type {
            return Err(Error::corruption(format!(
                "Stored field '{}' tagged {} but declared {}",
                info.name, value_type, info.value_type
            )));
        }

        let value = match value_type {
            ValueType::Long => {
                if payload.len() != 8 {
                    return Err(Error::corruption("Stored long must be 8 bytes"));
                }
                StoredValue::Long(payload.clone().get_i64_le())
            }
            ValueType::Text => StoredValue::Text(
                String::from_utf8(payload.to_vec())
                    .map_err(|e| Error::corruption(format!("Invalid UTF-8 in stored text: {}", e)))?,
            ),
            ValueType::Bytes => StoredValue::Bytes(payload),
            ValueType::Numeric => {
                return Err(Error::corruption("Numeric field in stored block"));
            }
        };
        fields.push(info.name.clone(), value);
    }

    if data.has_remaining() {
        return Err(Error::corruption("Trailing bytes after stored document"));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_checksum_detects_corruption() {
        let mut framed = encode_region(b"some column data", CompressionType::None).unwrap();
        assert_eq!(&decode_region(&framed).unwrap()[..], b"some column data");

        framed[3] ^= 0xFF;
        assert!(matches!(decode_region(&framed), Err(Error::ChecksumMismatch { .. })));
    }

    #[cfg(feature = "snappy")]
    #[test]
    fn test_region_snappy() {
        let data = vec![7u8; 4096];
        let framed = encode_region(&data, CompressionType::Snappy).unwrap();
        assert!(framed.len() < data.len());
        assert_eq!(&decode_region(&framed).unwrap()[..], &data[..]);
    }

    #[cfg(feature = "lz4-compression")]
    #[test]
    fn test_region_lz4() {
        let data = vec![3u8; 4096];
        let framed = encode_region(&data, CompressionType::Lz4).unwrap();
        assert_eq!(&decode_region(&framed).unwrap()[..], &data[..]);
    }

    #[test]
    fn test_read_region_out_of_bounds() {
        let file = Bytes::from(vec![0u8; 10]);
        let result = read_region(&file, &BlockHandle::new(4, 20));
        assert!(matches!(result, Err(Error::Corruption(_))));
    }

    #[test]
    fn test_numeric_column() {
        let values = [Some(5), None, Some(-3), Some(i64::MIN), None, None, None, None, Some(9)];
        let encoded = encode_numeric_column(&values);
        assert_eq!(encoded.len(), 2 + 9 * 8);

        let column = NumericColumn::decode(Bytes::from(encoded), 9).unwrap();
        for (i, expected) in values.iter().enumerate() {
            assert_eq!(column.get(i as u32), *expected);
        }

        assert!(NumericColumn::decode(Bytes::from(vec![0u8; 3]), 9).is_err());
    }

    #[test]
    fn test_stored_block() {
        let mut schema = Schema::new();
        schema.declare("n", ValueType::Long).unwrap();
        schema.declare("s", ValueType::Text).unwrap();
        schema.declare("b", ValueType::Bytes).unwrap();

        let docs: Vec<Vec<(u16, StoredValue)>> = vec![
            vec![(0, StoredValue::Long(88)), (1, StoredValue::from("88"))],
            vec![],
            vec![(2, StoredValue::from(vec![1u8, 2, 3]))],
        ];

        let mut data = Vec::new();
        let mut offsets = vec![0u64];
        for doc in &docs {
            let refs: Vec<(u16, &StoredValue)> = doc.iter().map(|(id, v)| (*id, v)).collect();
            encode_stored_document(&refs, &mut data).unwrap();
            offsets.push(data.len() as u64);
        }

        let block =
            StoredBlock::decode(Bytes::from(encode_offsets(&offsets)), Bytes::from(data), 3).unwrap();

        let first = decode_stored_document(block.document_bytes(0).unwrap(), &schema).unwrap();
        assert_eq!(first.get_long("n"), Some(88));
        assert_eq!(first.get_text("s"), Some("88"));

        let empty = decode_stored_document(block.document_bytes(1).unwrap(), &schema).unwrap();
        assert!(empty.is_empty());

        let third = decode_stored_document(block.document_bytes(2).unwrap(), &schema).unwrap();
        assert_eq!(third.get("b").and_then(StoredValue::as_bytes), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_stored_document_type_mismatch_is_corruption() {
        let mut schema = Schema::new();
        schema.declare("n", ValueType::Text).unwrap();

        let mut data = Vec::new();
        encode_stored_document(&[(0, &StoredValue::Long(1))], &mut data).unwrap();
        let result = decode_stored_document(Bytes::from(data), &schema);
        assert!(matches!(result, Err(Error::Corruption(_))));
    }

    #[test]
    fn test_stored_offsets_must_cover_data() {
        let offsets = encode_offsets(&[0, 4]);
        let result = StoredBlock::decode(Bytes::from(offsets), Bytes::from(vec![0u8; 8]), 1);
        assert!(result.is_err());
    }
}
