use crate::access::schema::RecordSchema;
use crate::access::tuple::{RecordId, TupleRecord};
use crate::catalog::TableInfo;
use crate::error::{DbError, Result};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::{PageId, TableId};
use crate::transaction::TransactionId;
use log::trace;
use std::sync::Arc;

/// Tuple-level writes to one table. Every page is reached through the
/// buffer pool under the calling transaction's locks.
#[derive(Clone)]
pub struct TableHeap {
    table: Arc<TableInfo>,
    buffer_pool: BufferPoolManager,
}

impl TableHeap {
    pub fn new(buffer_pool: BufferPoolManager, table: Arc<TableInfo>) -> Self {
        Self { table, buffer_pool }
    }

    pub fn table_id(&self) -> TableId {
        self.table.id()
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        self.table.schema()
    }

    pub fn num_pages(&self) -> Result<u32> {
        self.table.num_pages()
    }

    /// Inserts into the first page with a free slot, appending a page if
    /// every existing one is full.
    ///
    /// Pages are inspected under a shared lock; only the page that takes the
    /// tuple is upgraded to exclusive. A shared lock taken just to find a page
    /// full is released again, since nothing was read from it.
    pub fn insert_tuple(&self, tid: TransactionId, tuple: &TupleRecord) -> Result<RecordId> {
        self.schema().check(tuple)?;
        let lock_manager = self.buffer_pool.lock_manager();

        for page_number in 0..self.table.num_pages()? {
            let page_id = PageId::new(self.table.id(), page_number);
            let held_before = lock_manager.holds_lock(tid, page_id).is_some();

            let has_room = {
                let guard = self.buffer_pool.fetch_page_read(tid, page_id)?;
                let room = guard.read().num_empty_slots() > 0;
                room
            };

            if !has_room {
                if !held_before {
                    lock_manager.release_lock(tid, page_id);
                }
                continue;
            }

            let guard = self.buffer_pool.fetch_page_write(tid, page_id)?;
            match guard.insert_tuple(tuple.clone()) {
                Ok(record_id) => {
                    trace!("{} inserted into {}", tid, page_id);
                    return Ok(record_id);
                }
                Err(DbError::PageFull(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        let page_id = self.table.allocate_page()?;
        trace!("{} appended {}", tid, page_id);
        self.buffer_pool
            .fetch_page_write(tid, page_id)?
            .insert_tuple(tuple.clone())
    }

    /// Clears the slot `record_id` points at.
    pub fn delete_tuple(&self, tid: TransactionId, record_id: RecordId) -> Result<()> {
        if record_id.page_id.table_id != self.table.id() {
            return Err(DbError::TupleNotFound {
                page_id: record_id.page_id,
                slot: record_id.slot,
            });
        }
        self.buffer_pool
            .fetch_page_write(tid, record_id.page_id)?
            .delete_tuple(record_id)
    }
}
