//! Delete executor implementation.

use crate::access::heap::TableHeap;
use crate::access::schema::RecordSchema;
use crate::access::tuple::TupleRecord;
use crate::access::value::{Field, FieldType};
use crate::error::{DbError, Result};
use crate::executor::{ExecutionContext, Executor, Operator};
use crate::storage::page::TableId;
use log::debug;

/// Deletes every tuple its child yields, by record id, then yields a single
/// `(count)` tuple. The child is normally a scan of the same table, possibly
/// filtered.
pub struct DeleteExecutor {
    ctx: ExecutionContext,
    heap: TableHeap,
    child: Box<Operator>,
    schema: RecordSchema,
    done: bool,
}

impl DeleteExecutor {
    pub fn new(ctx: ExecutionContext, table_id: TableId, child: Operator) -> Result<Self> {
        let heap = ctx.table_heap(table_id)?;
        Ok(Self {
            ctx,
            heap,
            child: Box::new(child),
            schema: RecordSchema::new(vec![(FieldType::Int, "count")]),
            done: false,
        })
    }
}

impl Executor for DeleteExecutor {
    fn init(&mut self) -> Result<()> {
        self.done = false;
        self.child.open()
    }

    fn next(&mut self) -> Result<Option<TupleRecord>> {
        if self.done {
            return Ok(None);
        }
        let mut count = 0i32;
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            let record_id = tuple.record_id().ok_or_else(|| {
                DbError::InvalidArgument(format!("tuple {} has no record id", tuple))
            })?;
            self.heap.delete_tuple(self.ctx.tid, record_id)?;
            count += 1;
        }
        self.done = true;
        debug!("{} deleted {} tuples from {}", self.ctx.tid, count, self.heap.table_id());
        Ok(Some(TupleRecord::new(vec![Field::Int(count)])))
    }

    fn close(&mut self) {
        self.child.close();
    }

    fn output_schema(&self) -> &RecordSchema {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::database::Database;
    use crate::executor::{CompareOp, FilterExecutor, Predicate, SeqScanExecutor, ValuesExecutor};
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_delete_filtered_rows() -> Result<()> {
        let dir = tempdir()?;
        let db = Database::open(DatabaseConfig::new(dir.path()))?;
        let schema = RecordSchema::new(vec![(FieldType::Int, "id")]);
        let table_id = db.create_table("t", schema)?;
        let heap = db.table_heap(table_id)?;

        let txn = db.transaction();
        for i in 0..10 {
            heap.insert_tuple(txn.id(), &TupleRecord::new(vec![Field::Int(i)]))?;
        }

        let scan = Operator::from(SeqScanExecutor::new(txn.context(), table_id, None)?);
        let evens = Operator::from(FilterExecutor::new(
            scan,
            Predicate::new(0, CompareOp::LessThan, 4),
        )?);
        let mut delete = Operator::from(DeleteExecutor::new(txn.context(), table_id, evens)?);
        assert_eq!(delete.drain()?[0].fields(), &[Field::Int(4)]);

        let mut scan = Operator::from(SeqScanExecutor::new(txn.context(), table_id, None)?);
        let left: Vec<i32> = scan
            .drain()?
            .iter()
            .filter_map(|t| t.field(0).and_then(Field::as_int))
            .collect();
        assert_eq!(left, (4..10).collect::<Vec<_>>());
        txn.commit()?;
        Ok(())
    }

    #[test]
    fn test_delete_needs_record_ids() -> Result<()> {
        let dir = tempdir()?;
        let db = Database::open(DatabaseConfig::new(dir.path()))?;
        let schema = RecordSchema::new(vec![(FieldType::Int, "id")]);
        let table_id = db.create_table("t", schema.clone())?;

        let txn = db.transaction();
        let rows = vec![TupleRecord::new(vec![Field::Int(1)])];
        let child = Operator::from(ValuesExecutor::new(schema, rows)?);
        let mut delete = Operator::from(DeleteExecutor::new(txn.context(), table_id, child)?);
        assert!(matches!(delete.drain(), Err(DbError::InvalidArgument(_))));
        assert!(!delete.is_open());
        Ok(())
    }
}
