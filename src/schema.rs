//! Field schema shared by the writer, the segment format and the merger.
//!
//! A schema is the ordered list of `(name, value type)` pairs seen so far.
//! Field ids are positions in that list and are what segment files store.

use crate::document::{Document, FieldKind, FieldValue, ValueType};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Schema entry for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Field name
    pub name: String,
    /// Declared type
    pub value_type: ValueType,
}

impl FieldInfo {
    /// Returns the storage kind of this field.
    pub fn kind(&self) -> FieldKind {
        self.value_type.kind()
    }
}

/// Ordered set of field declarations; `(name, kind)` is unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldInfo>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a field by name and kind.
    pub fn lookup(&self, name: &str, kind: FieldKind) -> Option<(u16, &FieldInfo)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name && f.kind() == kind)
            .map(|(id, f)| (id as u16, f))
    }

    /// Returns the field with the given id.
    pub fn get(&self, id: u16) -> Option<&FieldInfo> {
        self.fields.get(id as usize)
    }

    /// Returns all declared fields in id order.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Returns the number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over `(id, info)` for numeric column fields.
    pub fn numeric_fields(&self) -> impl Iterator<Item = (u16, &FieldInfo)> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.kind() == FieldKind::Numeric)
            .map(|(id, f)| (id as u16, f))
    }

    /// Declares a field, returning its id.
    ///
    /// Fails with `SchemaConflict` if the name is already declared for the same
    /// kind with a different type.
    pub fn declare(&mut self, name: &str, value_type: ValueType) -> Result<u16> {
        if let Some((id, existing)) = self.lookup(name, value_type.kind()) {
            if existing.value_type != value_type {
                return Err(Error::SchemaConflict {
                    field: name.to_string(),
                    existing: existing.value_type,
                    attempted: value_type,
                });
            }
            return Ok(id);
        }

        if self.fields.len() >= u16::MAX as usize {
            return Err(Error::invalid_argument("Too many fields in schema"));
        }

        self.fields.push(FieldInfo { name: name.to_string(), value_type });
        Ok((self.fields.len() - 1) as u16)
    }

    /// Checks a document against the schema without modifying it.
    pub fn check(&self, doc: &Document) -> Result<()> {
        for field in doc.fields() {
            let value_type = field.value().value_type();
            if let Some((_, existing)) = self.lookup(field.name(), value_type.kind()) {
                if existing.value_type != value_type {
                    return Err(Error::SchemaConflict {
                        field: field.name().to_string(),
                        existing: existing.value_type,
                        attempted: value_type,
                    });
                }
            }
        }
        Ok(())
    }

    /// Declares every field of `doc`. Nothing is declared if any field conflicts.
    pub fn declare_document(&mut self, doc: &Document) -> Result<()> {
        self.check(doc)?;
        for field in doc.fields() {
            self.declare(field.name(), field.value().value_type())?;
        }
        Ok(())
    }

    /// Adds every declaration of `other`.
    pub fn merge_from(&mut self, other: &Schema) -> Result<()> {
        for info in &other.fields {
            self.declare(&info.name, info.value_type)?;
        }
        Ok(())
    }

    /// Resolves a document's numeric fields to `(field id, value)`.
    pub(crate) fn resolve_numeric(&self, doc: &Document) -> Result<Vec<(u16, i64)>> {
        doc.fields()
            .iter()
            .filter_map(|f| match f.value() {
                FieldValue::Numeric(v) => Some((f.name(), *v)),
                FieldValue::Stored(_) => None,
            })
            .map(|(name, v)| {
                self.lookup(name, FieldKind::Numeric)
                    .map(|(id, _)| (id, v))
                    .ok_or_else(|| Error::FieldNotFound(name.to_string()))
            })
            .collect()
    }
}
