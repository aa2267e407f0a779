//! Sequential scan over a table's heap file.

use crate::access::schema::RecordSchema;
use crate::access::tuple::TupleRecord;
use crate::catalog::TableInfo;
use crate::error::Result;
use crate::executor::{ExecutionContext, Executor};
use crate::storage::page::{PageId, TableId};
use log::trace;
use std::collections::VecDeque;
use std::sync::Arc;

/// Streams every live tuple of a table in page order, then slot order.
///
/// Pages are read one at a time under the context's transaction: the next
/// page is only locked once the current page's tuples are used up. Each
/// page's live tuples are copied out and its pin dropped right away, so no
/// tuple count per page is ever assumed.
pub struct SeqScanExecutor {
    ctx: ExecutionContext,
    table: Arc<TableInfo>,
    schema: RecordSchema,
    next_page: u32,
    buffered: VecDeque<TupleRecord>,
}

impl SeqScanExecutor {
    /// With an alias, output fields are named `alias.field`.
    pub fn new(ctx: ExecutionContext, table_id: TableId, alias: Option<&str>) -> Result<Self> {
        let table = ctx.catalog.table(table_id)?;
        let schema = match alias {
            Some(alias) => table.schema().with_alias(alias),
            None => table.schema().as_ref().clone(),
        };
        Ok(Self {
            ctx,
            table,
            schema,
            next_page: 0,
            buffered: VecDeque::new(),
        })
    }

    pub fn table_name(&self) -> &str {
        self.table.name()
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> Result<()> {
        self.next_page = 0;
        self.buffered.clear();
        Ok(())
    }

    fn next(&mut self) -> Result<Option<TupleRecord>> {
        loop {
            if let Some(tuple) = self.buffered.pop_front() {
                return Ok(Some(tuple));
            }
            // Re-read every time: the table may grow while it is scanned.
            if self.next_page >= self.table.num_pages()? {
                return Ok(None);
            }

            let page_id = PageId::new(self.table.id(), self.next_page);
            let guard = self.ctx.buffer_pool.fetch_page_read(self.ctx.tid, page_id)?;
            self.buffered.extend(guard.read().tuples().cloned());
            trace!("scan of {} read {} tuples from {}", self.table.name(), self.buffered.len(), page_id);
            self.next_page += 1;
        }
    }

    fn close(&mut self) {
        self.buffered.clear();
    }

    fn output_schema(&self) -> &RecordSchema {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::value::{Field, FieldType};
    use crate::concurrency::LockMode;
    use crate::config::DatabaseConfig;
    use crate::database::Database;
    use crate::executor::Operator;
    use crate::storage::page::heap_page::slots_per_page;
    use anyhow::Result;
    use tempfile::tempdir;

    fn schema() -> RecordSchema {
        RecordSchema::new(vec![(FieldType::Int, "id"), (FieldType::Int, "v")])
    }

    #[test]
    fn test_scan_empty_table() -> Result<()> {
        let dir = tempdir()?;
        let db = Database::open(DatabaseConfig::new(dir.path()))?;
        let table_id = db.create_table("t", schema())?;

        let txn = db.transaction();
        let mut scan = Operator::from(SeqScanExecutor::new(txn.context(), table_id, None)?);
        assert!(scan.drain()?.is_empty());
        txn.commit()?;
        Ok(())
    }

    #[test]
    fn test_scan_spans_pages_and_skips_holes() -> Result<()> {
        let dir = tempdir()?;
        let db = Database::open(DatabaseConfig::new(dir.path()))?;
        let table_id = db.create_table("t", schema())?;
        let heap = db.table_heap(table_id)?;
        let total = slots_per_page(schema().byte_width()) + 10;

        let tid = db.begin();
        let mut rids = Vec::new();
        for i in 0..total {
            let row = TupleRecord::new(vec![Field::Int(i as i32), Field::Int(0)]);
            rids.push(heap.insert_tuple(tid, &row)?);
        }
        heap.delete_tuple(tid, rids[3])?;
        db.commit(tid)?;
        assert_eq!(heap.num_pages()?, 2);

        let txn = db.transaction();
        let mut scan = Operator::from(SeqScanExecutor::new(txn.context(), table_id, None)?);
        let ids: Vec<i32> = scan
            .drain()?
            .iter()
            .filter_map(|t| t.field(0).and_then(|f| f.as_int()))
            .collect();
        let expected: Vec<i32> = (0..total as i32).filter(|&i| i != 3).collect();
        assert_eq!(ids, expected);

        // Both pages were read under a shared lock.
        for n in 0..2 {
            let pid = PageId::new(table_id, n);
            assert_eq!(db.lock_manager().holds_lock(txn.id(), pid), Some(LockMode::Shared));
        }
        txn.commit()?;
        Ok(())
    }

    #[test]
    fn test_scan_is_lazy_per_page() -> Result<()> {
        let dir = tempdir()?;
        let db = Database::open(DatabaseConfig::new(dir.path()))?;
        let table_id = db.create_table("t", schema())?;
        let heap = db.table_heap(table_id)?;
        let per_page = slots_per_page(schema().byte_width());

        let tid = db.begin();
        for i in 0..per_page + 1 {
            heap.insert_tuple(tid, &TupleRecord::new(vec![Field::Int(i as i32), Field::Int(1)]))?;
        }
        db.commit(tid)?;

        let txn = db.transaction();
        let mut scan = Operator::from(SeqScanExecutor::new(txn.context(), table_id, None)?);
        scan.open()?;
        scan.next()?;
        let second = PageId::new(table_id, 1);
        assert_eq!(db.lock_manager().holds_lock(txn.id(), second), None);

        for _ in 1..per_page {
            scan.next()?;
        }
        assert_eq!(db.lock_manager().holds_lock(txn.id(), second), None);
        scan.next()?;
        assert_eq!(db.lock_manager().holds_lock(txn.id(), second), Some(LockMode::Shared));
        assert!(!scan.has_next()?);
        scan.close();
        txn.commit()?;
        Ok(())
    }

    #[test]
    fn test_scan_alias_renames_fields() -> Result<()> {
        let dir = tempdir()?;
        let db = Database::open(DatabaseConfig::new(dir.path()))?;
        let table_id = db.create_table("t", schema())?;

        let txn = db.transaction();
        let scan = SeqScanExecutor::new(txn.context(), table_id, Some("x"))?;
        assert_eq!(scan.output_schema().field_name(1), Some("x.v"));
        assert_eq!(scan.table_name(), "t");
        Ok(())
    }
}
