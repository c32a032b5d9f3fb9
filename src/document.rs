//! Documents, typed field values and delete/update terms.
//!
//! A document is an ordered list of named fields. Each field is either a
//! numeric column value (one fixed-width `i64` per document, used for index
//! sorting) or a stored value (returned verbatim by `stored_fields`). The same
//! name may appear once per kind, so a document can carry both a numeric
//! `dense_int` column and a stored `dense_int` value.

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The storage kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Dense fixed-width numeric column.
    Numeric,
    /// Variable-length stored value.
    Stored,
}

/// The type tag recorded in a segment schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueType {
    /// Numeric column value.
    Numeric = 0,
    /// Stored 64-bit integer.
    Long = 1,
    /// Stored UTF-8 text.
    Text = 2,
    /// Stored raw bytes.
    Bytes = 3,
}

impl ValueType {
    /// Returns the storage kind for this type.
    pub fn kind(self) -> FieldKind {
        match self {
            ValueType::Numeric => FieldKind::Numeric,
            ValueType::Long | ValueType::Text | ValueType::Bytes => FieldKind::Stored,
        }
    }

    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ValueType::Numeric),
            1 => Some(ValueType::Long),
            2 => Some(ValueType::Text),
            3 => Some(ValueType::Bytes),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Numeric => "numeric",
            ValueType::Long => "long",
            ValueType::Text => "text",
            ValueType::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// A stored field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoredValue {
    /// A 64-bit integer.
    Long(i64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Bytes),
}

impl StoredValue {
    /// Returns the schema type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            StoredValue::Long(_) => ValueType::Long,
            StoredValue::Text(_) => ValueType::Text,
            StoredValue::Bytes(_) => ValueType::Bytes,
        }
    }

    /// Returns the integer if this is a `Long`.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            StoredValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text if this is a `Text`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StoredValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the bytes if this is a `Bytes`.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            StoredValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<i64> for StoredValue {
    fn from(v: i64) -> Self {
        StoredValue::Long(v)
    }
}

impl From<i32> for StoredValue {
    fn from(v: i32) -> Self {
        StoredValue::Long(v as i64)
    }
}

impl From<&str> for StoredValue {
    fn from(v: &str) -> Self {
        StoredValue::Text(v.to_string())
    }
}

impl From<String> for StoredValue {
    fn from(v: String) -> Self {
        StoredValue::Text(v)
    }
}

impl From<Bytes> for StoredValue {
    fn from(v: Bytes) -> Self {
        StoredValue::Bytes(v)
    }
}

impl From<Vec<u8>> for StoredValue {
    fn from(v: Vec<u8>) -> Self {
        StoredValue::Bytes(Bytes::from(v))
    }
}

impl fmt::Display for StoredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredValue::Long(v) => write!(f, "{}", v),
            StoredValue::Text(s) => f.write_str(s),
            StoredValue::Bytes(b) => write!(f, "{:?}", b),
        }
    }
}

/// The value of a single field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    /// Value of a dense numeric column.
    Numeric(i64),
    /// Stored value.
    Stored(StoredValue),
}

impl FieldValue {
    /// Returns the storage kind of this value.
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Numeric(_) => FieldKind::Numeric,
            FieldValue::Stored(_) => FieldKind::Stored,
        }
    }

    /// Returns the schema type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            FieldValue::Numeric(_) => ValueType::Numeric,
            FieldValue::Stored(v) => v.value_type(),
        }
    }
}

/// A named field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    value: FieldValue,
}

impl Field {
    /// Creates a numeric column field.
    pub fn numeric(name: impl Into<String>, value: i64) -> Self {
        Self { name: name.into(), value: FieldValue::Numeric(value) }
    }

    /// Creates a stored field.
    pub fn stored(name: impl Into<String>, value: impl Into<StoredValue>) -> Self {
        Self { name: name.into(), value: FieldValue::Stored(value.into()) }
    }

    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field value.
    pub fn value(&self) -> &FieldValue {
        &self.value
    }
}

/// A document: an ordered set of named fields.
///
/// # Example
///
/// ```rust
/// use segdex::Document;
///
/// let doc = Document::new()
///     .with_numeric("dense_int", 7)
///     .with_stored("dense_int", 7)
///     .with_stored("dense_string", "7");
///
/// assert_eq!(doc.numeric("dense_int"), Some(7));
/// assert!(doc.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    fields: Vec<Field>,
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Appends a field.
    pub fn add(&mut self, field: Field) -> &mut Self {
        self.fields.push(field);
        self
    }

    /// Appends a numeric column field, builder style.
    pub fn with_numeric(mut self, name: impl Into<String>, value: i64) -> Self {
        self.fields.push(Field::numeric(name, value));
        self
    }

    /// Appends a stored field, builder style.
    pub fn with_stored(mut self, name: impl Into<String>, value: impl Into<StoredValue>) -> Self {
        self.fields.push(Field::stored(name, value));
        self
    }

    /// Returns the fields in insertion order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the numeric column value of `name`, if present.
    pub fn numeric(&self, name: &str) -> Option<i64> {
        self.fields.iter().find_map(|f| match &f.value {
            FieldValue::Numeric(v) if f.name == name => Some(*v),
            _ => None,
        })
    }

    /// Returns the stored value of `name`, if present.
    pub fn stored(&self, name: &str) -> Option<&StoredValue> {
        self.fields.iter().find_map(|f| match &f.value {
            FieldValue::Stored(v) if f.name == name => Some(v),
            _ => None,
        })
    }

    /// Checks that every field name is unique within its kind.
    pub fn validate(&self) -> Result<()> {
        for (i, field) in self.fields.iter().enumerate() {
            let duplicate = self.fields[..i]
                .iter()
                .any(|f| f.name == field.name && f.value.kind() == field.value.kind());
            if duplicate {
                return Err(Error::invalid_argument(format!(
                    "Duplicate {:?} field '{}' in document",
                    field.value.kind(),
                    field.name
                )));
            }
        }
        Ok(())
    }

    /// Returns true if this document carries the term's field with the term's value.
    pub fn matches(&self, term: &Term) -> bool {
        match &term.value {
            FieldValue::Numeric(v) => self.numeric(&term.field) == Some(*v),
            FieldValue::Stored(v) => self.stored(&term.field) == Some(v),
        }
    }

    /// Rough in-memory footprint, used for RAM-based flush decisions.
    pub(crate) fn approximate_size(&self) -> usize {
        self.fields
            .iter()
            .map(|f| {
                let payload = match &f.value {
                    FieldValue::Numeric(_) | FieldValue::Stored(StoredValue::Long(_)) => 8,
                    FieldValue::Stored(StoredValue::Text(s)) => s.len(),
                    FieldValue::Stored(StoredValue::Bytes(b)) => b.len(),
                };
                f.name.len() + payload + 16
            })
            .sum()
    }
}

/// Stored fields of one document, as read back from a segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredFields {
    fields: Vec<(String, StoredValue)>,
}

impl StoredFields {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self { fields: Vec::with_capacity(capacity) }
    }

    pub(crate) fn push(&mut self, name: String, value: StoredValue) {
        self.fields.push((name, value));
    }

    /// Returns the value of `name`, if stored.
    pub fn get(&self, name: &str) -> Option<&StoredValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns the text value of `name`, if stored as text.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(StoredValue::as_text)
    }

    /// Returns the integer value of `name`, if stored as a long.
    pub fn get_long(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(StoredValue::as_long)
    }

    /// Iterates over `(name, value)` pairs in write order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StoredValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Returns the number of stored fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if nothing was stored.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A `(field, value)` pair identifying documents for delete and update.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Term {
    field: String,
    value: FieldValue,
}

impl Term {
    /// A term matching a numeric column value.
    pub fn numeric(field: impl Into<String>, value: i64) -> Self {
        Self { field: field.into(), value: FieldValue::Numeric(value) }
    }

    /// A term matching a stored value.
    pub fn stored(field: impl Into<String>, value: impl Into<StoredValue>) -> Self {
        Self { field: field.into(), value: FieldValue::Stored(value.into()) }
    }

    /// Returns the key field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Returns the key value.
    pub fn value(&self) -> &FieldValue {
        &self.value
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            FieldValue::Numeric(v) => write!(f, "{}={}", self.field, v),
            FieldValue::Stored(v) => write!(f, "{}:{}", self.field, v),
        }
    }
}
