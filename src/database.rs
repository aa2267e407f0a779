//! Process-wide engine state and the transaction coordinator.
//!
//! A [`Database`] owns the catalog, lock manager, transaction registry and
//! buffer pool for one data directory. It is created with [`Database::open`]
//! and torn down with [`Database::shutdown`] (or on drop).

use crate::access::heap::TableHeap;
use crate::access::schema::RecordSchema;
use crate::catalog::Catalog;
use crate::concurrency::LockManager;
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::executor::ExecutionContext;
use crate::storage::buffer::lru::LruReplacer;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::TableId;
use crate::transaction::{TransactionId, TransactionManager, TransactionState};
use log::{debug, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct Database {
    config: DatabaseConfig,
    catalog: Arc<Catalog>,
    lock_manager: Arc<LockManager>,
    transactions: Arc<TransactionManager>,
    buffer_pool: BufferPoolManager,
    closed: AtomicBool,
}

impl Database {
    /// Creates the data directory if needed and wires up an empty engine.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let catalog = Arc::new(Catalog::new());
        let lock_manager = Arc::new(LockManager::with_settings(
            config.lock_recheck_interval,
            config.lock_timeout,
        ));
        let transactions = Arc::new(TransactionManager::new());
        let buffer_pool = BufferPoolManager::new(
            Arc::clone(&catalog),
            Arc::clone(&lock_manager),
            Arc::clone(&transactions),
            Box::new(LruReplacer::new()),
            config.buffer_pool_frames,
        );

        info!(
            "opened database at {:?} with {} buffer frames",
            config.data_dir, config.buffer_pool_frames
        );
        Ok(Self {
            config,
            catalog,
            lock_manager,
            transactions,
            buffer_pool,
            closed: AtomicBool::new(false),
        })
    }

    /// Creates an empty table stored at `<data_dir>/<name>.dat`.
    pub fn create_table(&self, name: &str, schema: RecordSchema) -> Result<TableId> {
        let path = self.config.data_dir.join(format!("{}.dat", name));
        Ok(self.catalog.create_table(name, schema, &path)?.id())
    }

    /// Registers an existing heap file, which may live outside the data directory.
    pub fn attach_table(&self, name: &str, schema: RecordSchema, path: &Path) -> Result<TableId> {
        Ok(self.catalog.attach_table(name, schema, path)?.id())
    }

    pub fn table_heap(&self, table_id: TableId) -> Result<TableHeap> {
        Ok(TableHeap::new(
            self.buffer_pool.clone(),
            self.catalog.table(table_id)?,
        ))
    }

    pub fn begin(&self) -> TransactionId {
        self.transactions.begin()
    }

    /// Makes `tid`'s writes durable, releases its locks and retires it.
    ///
    /// If the writes cannot be flushed the transaction is rolled back
    /// instead, retired as aborted, and the flush error is returned.
    pub fn commit(&self, tid: TransactionId) -> Result<()> {
        self.transactions.check_active(tid)?;
        match self.buffer_pool.transaction_complete(tid, true) {
            Ok(()) => {
                self.transactions.retire(tid, TransactionState::Committed)?;
                debug!("{} committed", tid);
                Ok(())
            }
            Err(e) => {
                self.transactions.retire(tid, TransactionState::Aborted)?;
                Err(e)
            }
        }
    }

    /// Restores every page `tid` wrote to its pre-transaction image,
    /// releases its locks and retires it.
    pub fn abort(&self, tid: TransactionId) -> Result<()> {
        self.transactions.check_active(tid)?;
        let result = self.buffer_pool.transaction_complete(tid, false);
        self.transactions.retire(tid, TransactionState::Aborted)?;
        debug!("{} aborted", tid);
        result
    }

    /// Starts a transaction wrapped in a handle that aborts it when dropped
    /// unfinished.
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction {
            db: self,
            id: self.begin(),
            finished: false,
        }
    }

    /// Everything an operator tree needs to run under `tid`.
    pub fn context(&self, tid: TransactionId) -> ExecutionContext {
        ExecutionContext::new(Arc::clone(&self.catalog), self.buffer_pool.clone(), tid)
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPoolManager {
        &self.buffer_pool
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Aborts every transaction still running, then writes back all dirty
    /// pages. Calling it again is a no-op.
    pub fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let active = self.transactions.active_transactions();
        for tid in &active {
            if let Err(e) = self.abort(*tid) {
                warn!("failed to abort {} during shutdown: {}", tid, e);
            }
        }
        self.buffer_pool.flush_all()?;
        info!(
            "database at {:?} shut down, {} transactions aborted",
            self.config.data_dir,
            active.len()
        );
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("shutdown on drop failed: {}", e);
        }
    }
}

/// RAII handle for one transaction. Dropping it without calling
/// [`commit`](Self::commit) or [`abort`](Self::abort) aborts the transaction.
pub struct Transaction<'a> {
    db: &'a Database,
    id: TransactionId,
    finished: bool,
}

impl Transaction<'_> {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn context(&self) -> ExecutionContext {
        self.db.context(self.id)
    }

    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.db.commit(self.id)
    }

    pub fn abort(mut self) -> Result<()> {
        self.finished = true;
        self.db.abort(self.id)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished && self.db.transactions.is_active(self.id) {
            if let Err(e) = self.db.abort(self.id) {
                warn!("failed to abort dropped {}: {}", self.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::tuple::TupleRecord;
    use crate::access::value::{Field, FieldType};
    use crate::error::DbError;
    use crate::storage::page::PageId;
    use anyhow::Result;
    use tempfile::tempdir;

    fn schema() -> RecordSchema {
        RecordSchema::new(vec![(FieldType::Int, "id")])
    }

    fn row(id: i32) -> TupleRecord {
        TupleRecord::new(vec![Field::Int(id)])
    }

    fn live_ids(db: &Database, table_id: TableId) -> Result<Vec<i32>> {
        let txn = db.transaction();
        let page_id = PageId::new(table_id, 0);
        let guard = db.buffer_pool().fetch_page_read(txn.id(), page_id)?;
        let ids = guard
            .read()
            .tuples()
            .filter_map(|t| t.field(0).and_then(Field::as_int))
            .collect();
        drop(guard);
        txn.commit()?;
        Ok(ids)
    }

    #[test]
    fn test_open_creates_data_dir() -> Result<()> {
        let dir = tempdir()?;
        let data_dir = dir.path().join("nested").join("data");
        let db = Database::open(DatabaseConfig::new(&data_dir))?;
        assert!(data_dir.is_dir());

        db.create_table("t", schema())?;
        assert!(data_dir.join("t.dat").exists());
        assert!(matches!(
            db.create_table("t", schema()),
            Err(DbError::TableExists(_))
        ));
        Ok(())
    }

    #[test]
    fn test_commit_and_abort() -> Result<()> {
        let dir = tempdir()?;
        let db = Database::open(DatabaseConfig::new(dir.path()))?;
        let table_id = db.create_table("t", schema())?;
        let heap = db.table_heap(table_id)?;

        let t1 = db.begin();
        heap.insert_tuple(t1, &row(1))?;
        db.commit(t1)?;
        assert_eq!(db.transactions().state(t1), Some(TransactionState::Committed));

        let t2 = db.begin();
        heap.insert_tuple(t2, &row(2))?;
        db.abort(t2)?;
        assert_eq!(db.transactions().state(t2), Some(TransactionState::Aborted));

        assert_eq!(live_ids(&db, table_id)?, vec![1]);
        assert!(db.lock_manager().locked_pages(t1).is_empty());
        assert!(db.lock_manager().locked_pages(t2).is_empty());
        Ok(())
    }

    #[test]
    fn test_retired_transaction_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        let db = Database::open(DatabaseConfig::new(dir.path()))?;
        let table_id = db.create_table("t", schema())?;
        let heap = db.table_heap(table_id)?;

        let tid = db.begin();
        db.commit(tid)?;
        assert!(matches!(db.commit(tid), Err(DbError::TransactionNotActive(_))));
        assert!(matches!(db.abort(tid), Err(DbError::TransactionNotActive(_))));
        assert!(matches!(
            heap.insert_tuple(tid, &row(1)),
            Err(DbError::TransactionNotActive(_))
        ));
        Ok(())
    }

    #[test]
    fn test_dropped_handle_aborts() -> Result<()> {
        let dir = tempdir()?;
        let db = Database::open(DatabaseConfig::new(dir.path()))?;
        let table_id = db.create_table("t", schema())?;
        let heap = db.table_heap(table_id)?;

        let committed = db.transaction();
        heap.insert_tuple(committed.id(), &row(7))?;
        committed.commit()?;

        let tid = {
            let txn = db.transaction();
            heap.insert_tuple(txn.id(), &row(8))?;
            txn.id()
        };
        assert_eq!(db.transactions().state(tid), Some(TransactionState::Aborted));
        assert_eq!(live_ids(&db, table_id)?, vec![7]);
        Ok(())
    }

    #[test]
    fn test_shutdown_aborts_active_and_is_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let db = Database::open(DatabaseConfig::new(dir.path()))?;
        let table_id = db.create_table("t", schema())?;
        let heap = db.table_heap(table_id)?;

        let done = db.begin();
        heap.insert_tuple(done, &row(1))?;
        db.commit(done)?;

        let pending = db.begin();
        heap.insert_tuple(pending, &row(2))?;

        db.shutdown()?;
        db.shutdown()?;
        assert_eq!(db.transactions().state(pending), Some(TransactionState::Aborted));
        assert!(db.transactions().active_transactions().is_empty());

        let reopened = Database::open(DatabaseConfig::new(dir.path()))?;
        let table_id = reopened.attach_table("t", schema(), &dir.path().join("t.dat"))?;
        assert_eq!(live_ids(&reopened, table_id)?, vec![1]);
        Ok(())
    }
}
