//! Index sort specification.
//!
//! Documents are ordered inside every segment by an `IndexSort`: an ordered
//! list of numeric fields, each ascending or descending. Documents missing a
//! sort field use that field's missing value (0 unless overridden).
//!
//! Sort values are normalized into a `SortKey` whose natural ordering equals
//! the sort order, so flush, merge and read-time ordering share one comparator.
//! Descending fields are stored bit-inverted (`!v`), which reverses the order
//! of every `i64` without overflow.

use crate::document::Document;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Sort direction of a single field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    /// Smallest value first.
    #[default]
    Ascending,
    /// Largest value first.
    Descending,
}

/// One numeric comparator of an index sort.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortField {
    field: String,
    direction: SortDirection,
    missing_value: i64,
}

impl SortField {
    /// Creates a sort field.
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self { field: field.into(), direction, missing_value: 0 }
    }

    /// Ascending sort on `field`.
    pub fn ascending(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Ascending)
    }

    /// Descending sort on `field`.
    pub fn descending(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Descending)
    }

    /// Sets the value used for documents without this field.
    pub fn with_missing_value(mut self, value: i64) -> Self {
        self.missing_value = value;
        self
    }

    /// Returns the field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Returns the direction.
    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// Returns the missing value.
    pub fn missing_value(&self) -> i64 {
        self.missing_value
    }

    /// Compares two raw values under this field's direction.
    pub fn compare(&self, a: i64, b: i64) -> Ordering {
        match self.direction {
            SortDirection::Ascending => a.cmp(&b),
            SortDirection::Descending => b.cmp(&a),
        }
    }

    fn normalize(&self, value: Option<i64>) -> i64 {
        let value = value.unwrap_or(self.missing_value);
        match self.direction {
            SortDirection::Ascending => value,
            SortDirection::Descending => !value,
        }
    }
}

/// Normalized sort key; `Ord` on keys is the index sort order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey(Vec<i64>);

/// Ordered list of sort fields applied at flush and merge time.
///
/// An empty sort keeps documents in insertion order.
///
/// # Example
///
/// ```rust
/// use segdex::{Document, IndexSort, SortField};
///
/// let sort = IndexSort::new(vec![SortField::descending("dense_int")]);
/// let high = Document::new().with_numeric("dense_int", 9);
/// let low = Document::new().with_numeric("dense_int", 1);
///
/// assert!(sort.key_for_document(&high) < sort.key_for_document(&low));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSort {
    fields: Vec<SortField>,
}

impl IndexSort {
    /// Creates a sort from fields, most significant first.
    pub fn new(fields: Vec<SortField>) -> Self {
        Self { fields }
    }

    /// The empty sort (insertion order).
    pub fn none() -> Self {
        Self::default()
    }

    /// Appends a less significant field.
    pub fn then(mut self, field: SortField) -> Self {
        self.fields.push(field);
        self
    }

    /// Returns the fields.
    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    /// Returns true if no field is sorted on.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Builds a key from per-field values in sort-field order.
    pub fn key_from_values(&self, values: impl IntoIterator<Item = Option<i64>>) -> SortKey {
        SortKey(self.fields.iter().zip(values).map(|(f, v)| f.normalize(v)).collect())
    }

    /// Builds the sort key of a buffered document.
    pub fn key_for_document(&self, doc: &Document) -> SortKey {
        self.key_from_values(self.fields.iter().map(|f| doc.numeric(&f.field)))
    }

    /// Compares two documents under this sort.
    pub fn compare_documents(&self, a: &Document, b: &Document) -> Ordering {
        self.key_for_document(a).cmp(&self.key_for_document(b))
    }
}

impl fmt::Display for IndexSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            let dir = match field.direction {
                SortDirection::Ascending => "asc",
                SortDirection::Descending => "desc",
            };
            write!(f, "{}:{}", field.field, dir)?;
        }
        f.write_str(">")
    }
}
