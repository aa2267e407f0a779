//! Access layer: the record model and table-level tuple operations.
//!
//! - **FieldType / Field**: column types and values with their fixed-width encoding
//! - **RecordSchema**: ordered, named columns of a table or operator output
//! - **TupleRecord / RecordId**: one row and the slot it came from
//! - **TableHeap**: inserts and deletes tuples through the buffer pool

pub mod heap;
pub mod schema;
pub mod tuple;
pub mod value;

pub use heap::TableHeap;
pub use schema::{RecordSchema, SchemaField};
pub use tuple::{RecordId, TupleRecord};
pub use value::{Field, FieldType};
