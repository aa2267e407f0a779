//! Table schemas: ordered, named, fixed-width columns.

use crate::access::tuple::TupleRecord;
use crate::access::value::FieldType;
use crate::error::{DbError, Result};
use std::fmt;

/// One named column of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub field_type: FieldType,
    pub name: String,
}

/// Ordered list of `(type, name)` pairs describing a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    fields: Vec<SchemaField>,
}

impl RecordSchema {
    pub fn new<S: Into<String>>(fields: Vec<(FieldType, S)>) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|(field_type, name)| SchemaField {
                    field_type,
                    name: name.into(),
                })
                .collect(),
        }
    }

    /// Schema with generated column names `f0, f1, ...`.
    pub fn from_types(types: &[FieldType]) -> Self {
        Self::new(
            types
                .iter()
                .enumerate()
                .map(|(i, ty)| (*ty, format!("f{}", i)))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field_type(&self, index: usize) -> Option<FieldType> {
        self.fields.get(index).map(|f| f.field_type)
    }

    pub fn field_name(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(|f| f.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Bytes one row occupies in a page slot.
    pub fn byte_width(&self) -> usize {
        self.fields.iter().map(|f| f.field_type.byte_len()).sum()
    }

    /// Concatenation of two schemas, as produced by a join.
    pub fn merge(left: &RecordSchema, right: &RecordSchema) -> RecordSchema {
        RecordSchema {
            fields: left.fields.iter().chain(right.fields.iter()).cloned().collect(),
        }
    }

    /// Same columns with every name qualified as `alias.name`.
    pub fn with_alias(&self, alias: &str) -> RecordSchema {
        RecordSchema {
            fields: self
                .fields
                .iter()
                .map(|f| SchemaField {
                    field_type: f.field_type,
                    name: format!("{}.{}", alias, f.name),
                })
                .collect(),
        }
    }

    /// Subset of columns in the given order.
    pub fn project(&self, indices: &[usize]) -> Result<RecordSchema> {
        let fields = indices
            .iter()
            .map(|&i| {
                self.fields.get(i).cloned().ok_or_else(|| {
                    DbError::InvalidArgument(format!(
                        "column {} out of range for {} columns",
                        i,
                        self.len()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RecordSchema { fields })
    }

    /// Fails with `SchemaMismatch` unless every field of the tuple fits its column.
    pub fn check(&self, tuple: &TupleRecord) -> Result<()> {
        if tuple.len() != self.len() {
            return Err(DbError::SchemaMismatch(format!(
                "tuple has {} fields, schema has {}",
                tuple.len(),
                self.len()
            )));
        }
        for (i, (value, column)) in tuple.fields().iter().zip(&self.fields).enumerate() {
            if !value.conforms_to(column.field_type) {
                return Err(DbError::SchemaMismatch(format!(
                    "field {} ('{}') = {:?} does not fit {}",
                    i, column.name, value, column.field_type
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for RecordSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|c| format!("{}({})", c.field_type, c.name))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::Field;

    fn people() -> RecordSchema {
        RecordSchema::new(vec![(FieldType::Int, "id"), (FieldType::Text(8), "name")])
    }

    #[test]
    fn test_byte_width() {
        assert_eq!(people().byte_width(), 4 + 4 + 8);
        assert_eq!(RecordSchema::from_types(&[FieldType::Int; 3]).byte_width(), 12);
    }

    #[test]
    fn test_lookup_by_name() {
        let schema = people();
        assert_eq!(schema.index_of("name"), Some(1));
        assert_eq!(schema.index_of("missing"), None);
        assert_eq!(schema.field_type(0), Some(FieldType::Int));
        assert_eq!(schema.field_name(2), None);
    }

    #[test]
    fn test_merge_and_alias() {
        let merged = RecordSchema::merge(&people().with_alias("p"), &people());
        assert_eq!(merged.len(), 4);
        assert_eq!(merged.field_name(0), Some("p.id"));
        assert_eq!(merged.field_name(3), Some("name"));
    }

    #[test]
    fn test_project() {
        let projected = people().project(&[1, 0]).unwrap();
        assert_eq!(projected.field_name(0), Some("name"));
        assert!(people().project(&[5]).is_err());
    }

    #[test]
    fn test_check() {
        let schema = people();
        assert!(schema.check(&TupleRecord::new(vec![1.into(), "ann".into()])).is_ok());
        assert!(matches!(
            schema.check(&TupleRecord::new(vec![1.into()])),
            Err(DbError::SchemaMismatch(_))
        ));
        assert!(matches!(
            schema.check(&TupleRecord::new(vec![Field::from("x"), Field::from("y")])),
            Err(DbError::SchemaMismatch(_))
        ));
        assert!(matches!(
            schema.check(&TupleRecord::new(vec![1.into(), "far too long".into()])),
            Err(DbError::SchemaMismatch(_))
        ));
    }
}
