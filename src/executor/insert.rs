//! Insert executor implementation.

use crate::access::heap::TableHeap;
use crate::access::schema::RecordSchema;
use crate::access::tuple::TupleRecord;
use crate::access::value::{Field, FieldType};
use crate::error::{DbError, Result};
use crate::executor::{ExecutionContext, Executor, Operator};
use crate::storage::page::TableId;
use log::debug;

/// Inserts every tuple of its child into a table, then yields a single
/// `(count)` tuple.
pub struct InsertExecutor {
    ctx: ExecutionContext,
    heap: TableHeap,
    child: Box<Operator>,
    schema: RecordSchema,
    done: bool,
}

impl InsertExecutor {
    pub fn new(ctx: ExecutionContext, table_id: TableId, child: Operator) -> Result<Self> {
        let heap = ctx.table_heap(table_id)?;
        let expected: Vec<FieldType> = heap.schema().fields().iter().map(|f| f.field_type).collect();
        let actual: Vec<FieldType> = child
            .output_schema()
            .fields()
            .iter()
            .map(|f| f.field_type)
            .collect();
        if expected != actual {
            return Err(DbError::SchemaMismatch(format!(
                "cannot insert ({}) into ({})",
                child.output_schema(),
                heap.schema()
            )));
        }

        Ok(Self {
            ctx,
            heap,
            child: Box::new(child),
            schema: RecordSchema::new(vec![(FieldType::Int, "count")]),
            done: false,
        })
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> Result<()> {
        self.done = false;
        self.child.open()
    }

    fn next(&mut self) -> Result<Option<TupleRecord>> {
        if self.done {
            return Ok(None);
        }
        // Collect the input first: the child may be scanning this very table.
        let mut pending = Vec::new();
        while self.child.has_next()? {
            pending.push(self.child.next()?);
        }
        let mut count = 0i32;
        for tuple in &pending {
            self.heap.insert_tuple(self.ctx.tid, tuple)?;
            count += 1;
        }
        self.done = true;
        debug!("{} inserted {} tuples into {}", self.ctx.tid, count, self.heap.table_id());
        Ok(Some(TupleRecord::new(vec![Field::Int(count)])))
    }

    fn close(&mut self) {
        self.child.close();
    }

    fn output_schema(&self) -> &RecordSchema {
        &self.schema
    }
}
