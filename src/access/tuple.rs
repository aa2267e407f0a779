use crate::access::value::Field;
use crate::storage::page::PageId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Physical location of a tuple: page plus slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: usize) -> Self {
        Self { page_id, slot }
    }
}

/// One row. Immutable once built; operators derive new records instead of
/// editing the ones they receive.
///
/// Equality and hashing look at the field values only, never at the origin.
#[derive(Debug, Clone)]
pub struct TupleRecord {
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl TupleRecord {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            record_id: None,
        }
    }

    pub fn with_record_id(mut self, record_id: RecordId) -> Self {
        self.record_id = Some(record_id);
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Where the tuple was read from, if it came off a page.
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    /// Field-wise concatenation; the result has no origin.
    pub fn concat(&self, other: &TupleRecord) -> TupleRecord {
        let mut fields = Vec::with_capacity(self.len() + other.len());
        fields.extend_from_slice(&self.fields);
        fields.extend_from_slice(&other.fields);
        TupleRecord::new(fields)
    }

    pub fn into_fields(self) -> Vec<Field> {
        self.fields
    }
}

impl PartialEq for TupleRecord {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for TupleRecord {}

impl Hash for TupleRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fields.hash(state);
    }
}

impl fmt::Display for TupleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.fields.iter().map(|v| v.to_string()).collect();
        write!(f, "({})", parts.join(", "))
    }
}
