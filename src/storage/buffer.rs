pub mod lru;
pub mod replacer;

use crate::access::tuple::{RecordId, TupleRecord};
use crate::catalog::Catalog;
use crate::concurrency::{LockManager, LockMode};
use crate::error::{DbError, Result};
use crate::storage::page::{HeapPage, PageBytes, PageId};
use crate::transaction::{TransactionId, TransactionManager};
use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use replacer::{FrameId, Replacer};
use std::collections::HashMap;
use std::sync::Arc;

/// A resident page. Readers and writers of the same page are already
/// separated by the lock manager; the `RwLock` orders them against flushes.
type SharedPage = Arc<RwLock<HeapPage>>;

/// Access requested from the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
}

impl Permission {
    pub fn lock_mode(&self) -> LockMode {
        match self {
            Permission::Read => LockMode::Shared,
            Permission::Write => LockMode::Exclusive,
        }
    }
}

#[derive(Debug, Default)]
struct Frame {
    page_id: Option<PageId>,
    page: Option<SharedPage>,
    pin_count: usize,
    /// Set while the old page is written back and the new one read in. The
    /// frame is mapped under both page ids until the load is published.
    io: bool,
}

#[derive(Debug)]
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    frames: Vec<Frame>,
    free_list: Vec<FrameId>,
    replacer: Box<dyn Replacer>,
}

/// Bounded page cache. Every page access goes through here: the lock
/// manager is consulted first, then the page is served from memory or loaded
/// from its table's heap file.
#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    state: Mutex<PoolState>,
    io_done: Condvar,
    catalog: Arc<Catalog>,
    lock_manager: Arc<LockManager>,
    transactions: Arc<TransactionManager>,
    capacity: usize,
}

impl BufferPoolManager {
    pub fn new(
        catalog: Arc<Catalog>,
        lock_manager: Arc<LockManager>,
        transactions: Arc<TransactionManager>,
        replacer: Box<dyn Replacer>,
        max_frames: usize,
    ) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                state: Mutex::new(PoolState {
                    page_table: HashMap::with_capacity(max_frames),
                    frames: (0..max_frames).map(|_| Frame::default()).collect(),
                    free_list: (0..max_frames).rev().collect(),
                    replacer,
                }),
                io_done: Condvar::new(),
                catalog,
                lock_manager,
                transactions,
                capacity: max_frames,
            }),
        }
    }

    /// Locks, pins and returns `page_id` on behalf of `tid`.
    ///
    /// Blocks while a conflicting lock is held by another transaction. Lock
    /// failures (`TransactionAborted`) and load failures leave any locks
    /// already granted in place; the caller must abort `tid`.
    pub fn get_page(&self, tid: TransactionId, page_id: PageId, permission: Permission) -> Result<PageGuard> {
        match permission {
            Permission::Read => self.fetch_page_read(tid, page_id).map(PageGuard::Read),
            Permission::Write => self.fetch_page_write(tid, page_id).map(PageGuard::Write),
        }
    }

    pub fn fetch_page_read(&self, tid: TransactionId, page_id: PageId) -> Result<PageReadGuard> {
        let page = self.lock_and_pin(tid, page_id, Permission::Read)?;
        Ok(PageReadGuard {
            pool: Arc::clone(&self.inner),
            page_id,
            page,
        })
    }

    /// Like [`fetch_page_read`](Self::fetch_page_read), but takes an exclusive
    /// lock and records the page's pre-transaction image the first time `tid`
    /// opens it for writing.
    pub fn fetch_page_write(&self, tid: TransactionId, page_id: PageId) -> Result<PageWriteGuard> {
        let page = self.lock_and_pin(tid, page_id, Permission::Write)?;
        let captured = self
            .inner
            .transactions
            .record_before_image(tid, page_id, || page.read().encode());
        if let Err(e) = captured {
            self.inner.unpin(page_id, &page);
            return Err(e);
        }
        Ok(PageWriteGuard {
            pool: Arc::clone(&self.inner),
            page_id,
            page,
            tid,
        })
    }

    fn lock_and_pin(&self, tid: TransactionId, page_id: PageId, permission: Permission) -> Result<SharedPage> {
        self.inner.transactions.check_active(tid)?;
        self.inner
            .lock_manager
            .acquire_lock(tid, page_id, permission.lock_mode())?;
        self.inner.pin(page_id)
    }

    /// Writes the page back if it is resident and dirty.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        match self.inner.resident(page_id) {
            Some(page) => self.inner.flush(&page),
            None => Ok(()),
        }
    }

    pub fn flush_all(&self) -> Result<()> {
        let pages: Vec<SharedPage> = {
            let state = self.inner.state.lock();
            state.frames.iter().filter_map(|f| f.page.clone()).collect()
        };
        for page in &pages {
            self.inner.flush(page)?;
        }
        debug!("flushed {} resident pages", pages.len());
        Ok(())
    }

    /// Drops the cached copy without writing it back.
    pub fn discard_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.inner.state.lock();
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &state.frames[frame_id];
            if frame.pin_count > 0 || frame.io {
                return Err(DbError::PagePinned(page_id));
            }
        }
        BufferPoolInner::remove_resident(&mut state, page_id);
        Ok(())
    }

    /// Ends `tid`'s use of the pool.
    ///
    /// On commit every page it opened for writing is flushed; if a flush
    /// fails the pages are rolled back as for an abort and the error is
    /// returned. On abort each such page is dropped from the cache and its
    /// pre-transaction image is written back to the heap file. All of `tid`'s
    /// locks are released in every case. Guards held by `tid` must be dropped
    /// before calling this.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<()> {
        let result = if commit {
            match self.flush_written(tid) {
                Ok(()) => Ok(()),
                Err(e) => {
                    warn!("{} commit flush failed, rolling back: {}", tid, e);
                    // The flush error is the one worth reporting.
                    let _ = self.restore_written(tid);
                    Err(e)
                }
            }
        } else {
            self.restore_written(tid)
        };

        self.inner.lock_manager.release_all_locks(tid);
        result
    }

    fn flush_written(&self, tid: TransactionId) -> Result<()> {
        for page_id in self.inner.transactions.written_pages(tid)? {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    fn restore_written(&self, tid: TransactionId) -> Result<()> {
        let mut images: Vec<_> = self.inner.transactions.take_write_set(tid)?.into_iter().collect();
        images.sort_by_key(|(page_id, _)| *page_id);

        let mut first_error = None;
        for (page_id, image) in &images {
            if let Err(e) = self.inner.restore(*page_id, image) {
                warn!("{} failed to restore {}: {}", tid, page_id, e);
                first_error.get_or_insert(e);
            }
        }
        debug!("{} rolled back {} pages", tid, images.len());
        first_error.map_or(Ok(()), Err)
    }

    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.inner.state.lock().page_table.contains_key(&page_id)
    }

    pub fn resident_pages(&self) -> Vec<PageId> {
        let mut pages: Vec<_> = self.inner.state.lock().page_table.keys().copied().collect();
        pages.sort();
        pages
    }

    pub fn pin_count(&self, page_id: PageId) -> Option<usize> {
        let state = self.inner.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| state.frames[frame_id].pin_count)
    }

    /// Whether the resident copy has changes not yet written back.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        self.inner.resident(page_id).map(|page| page.read().is_dirty())
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.inner.catalog
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.inner.lock_manager
    }

    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.inner.transactions
    }
}

impl BufferPoolInner {
    fn resident(&self, page_id: PageId) -> Option<SharedPage> {
        let state = self.state.lock();
        let frame = &state.frames[*state.page_table.get(&page_id)?];
        // A frame still loading `page_id` holds its previous page, if any.
        if frame.page_id == Some(page_id) {
            frame.page.clone()
        } else {
            None
        }
    }

    /// Returns the resident page with one more pin, loading it if needed.
    ///
    /// Disk I/O happens outside the pool mutex: the frame is reserved and
    /// marked `io`, the victim is written back and the page read in, then the
    /// frame is published. Anyone asking for either page meanwhile waits on
    /// `io_done`; hits on other pages go ahead.
    fn pin(&self, page_id: PageId) -> Result<SharedPage> {
        let mut guard = self.state.lock();
        loop {
            let state = &mut *guard;
            let Some(&frame_id) = state.page_table.get(&page_id) else {
                break;
            };
            let frame = &mut state.frames[frame_id];
            if frame.io {
                self.io_done.wait(&mut guard);
                continue;
            }
            let Some(page) = frame.page.clone() else {
                break;
            };
            frame.pin_count += 1;
            if frame.pin_count == 1 {
                state.replacer.pin(frame_id);
            }
            return Ok(page);
        }

        let table = self.catalog.table(page_id.table_id)?;
        let state = &mut *guard;
        let frame_id = match state.free_list.pop() {
            Some(frame_id) => frame_id,
            None => state.replacer.evict().ok_or(DbError::BufferPoolFull)?,
        };
        let victim = {
            let frame = &mut state.frames[frame_id];
            frame.io = true;
            frame.page.clone()
        };
        state.page_table.insert(page_id, frame_id);
        drop(guard);

        if let Some(victim) = &victim {
            if let Err(e) = self.flush(victim) {
                let mut state = self.state.lock();
                state.page_table.remove(&page_id);
                state.frames[frame_id].io = false;
                state.replacer.unpin(frame_id);
                self.io_done.notify_all();
                return Err(e);
            }
        }

        let loaded = table
            .read_page(page_id)
            .and_then(|data| HeapPage::decode(page_id, &data[..], Arc::clone(table.schema())));

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let old = std::mem::take(&mut state.frames[frame_id]);
        if let Some(old_id) = old.page_id {
            state.page_table.remove(&old_id);
            debug!("evicted {} from frame {}", old_id, frame_id);
        }
        self.io_done.notify_all();

        match loaded {
            Ok(page) => {
                let page = Arc::new(RwLock::new(page));
                state.frames[frame_id] = Frame {
                    page_id: Some(page_id),
                    page: Some(Arc::clone(&page)),
                    pin_count: 1,
                    io: false,
                };
                trace!("loaded {} into frame {}", page_id, frame_id);
                Ok(page)
            }
            Err(e) => {
                state.page_table.remove(&page_id);
                state.free_list.push(frame_id);
                Err(e)
            }
        }
    }

    fn unpin(&self, page_id: PageId, page: &SharedPage) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return;
        };
        let frame = &mut state.frames[frame_id];
        // The page may have been dropped and reloaded since it was pinned.
        if frame.pin_count == 0 || !frame.page.as_ref().is_some_and(|p| Arc::ptr_eq(p, page)) {
            return;
        }
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
    }

    fn remove_resident(state: &mut PoolState, page_id: PageId) -> Option<SharedPage> {
        let frame_id = state.page_table.remove(&page_id)?;
        let frame = std::mem::take(&mut state.frames[frame_id]);
        state.replacer.remove(frame_id);
        state.free_list.push(frame_id);
        frame.page
    }

    fn flush(&self, page: &SharedPage) -> Result<()> {
        let mut page = page.write();
        if page.is_dirty() {
            self.write_back(&mut page)?;
        }
        Ok(())
    }

    fn write_back(&self, page: &mut HeapPage) -> Result<()> {
        let table = self.catalog.table(page.page_id().table_id)?;
        let data = page.encode()?;
        table.write_page(page.page_id(), &data[..])?;
        trace!("flushed {} (dirtied by {:?})", page.page_id(), page.dirtied_by());
        page.mark_dirty(None);
        Ok(())
    }

    /// Drops the cached copy of `page_id` and writes `image` in its place.
    fn restore(&self, page_id: PageId, image: &PageBytes) -> Result<()> {
        let table = self.catalog.table(page_id.table_id)?;
        let cached = {
            let mut state = self.state.lock();
            while state
                .page_table
                .get(&page_id)
                .is_some_and(|&frame_id| state.frames[frame_id].io)
            {
                self.io_done.wait(&mut state);
            }
            Self::remove_resident(&mut state, page_id)
        };

        match cached {
            Some(shared) => {
                // Held across the write so a flush that already grabbed this
                // copy cannot land after the restored image.
                let mut page = shared.write();
                page.mark_dirty(None);
                table.write_page(page_id, &image[..])
            }
            None => table.write_page(page_id, &image[..]),
        }
    }
}

/// Pinned page opened for reading. Unpins on drop.
pub struct PageReadGuard {
    pool: Arc<BufferPoolInner>,
    page_id: PageId,
    page: SharedPage,
}

impl PageReadGuard {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, HeapPage> {
        self.page.read()
    }
}

impl Drop for PageReadGuard {
    fn drop(&mut self) {
        self.pool.unpin(self.page_id, &self.page);
    }
}

/// Pinned page opened for writing by one transaction. Unpins on drop.
pub struct PageWriteGuard {
    pool: Arc<BufferPoolInner>,
    page_id: PageId,
    page: SharedPage,
    tid: TransactionId,
}

impl PageWriteGuard {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, HeapPage> {
        self.page.read()
    }

    /// Mutable view of the page. Marks it dirty on behalf of the owning
    /// transaction.
    pub fn write(&self) -> RwLockWriteGuard<'_, HeapPage> {
        let mut page = self.page.write();
        page.mark_dirty(Some(self.tid));
        page
    }

    /// Inserts into the first free slot; the page only becomes dirty if the
    /// insert succeeds.
    pub fn insert_tuple(&self, tuple: TupleRecord) -> Result<RecordId> {
        let mut page = self.page.write();
        let record_id = page.insert_tuple(tuple)?;
        page.mark_dirty(Some(self.tid));
        Ok(record_id)
    }

    pub fn delete_tuple(&self, record_id: RecordId) -> Result<()> {
        let mut page = self.page.write();
        page.delete_tuple(record_id)?;
        page.mark_dirty(Some(self.tid));
        Ok(())
    }
}

impl Drop for PageWriteGuard {
    fn drop(&mut self) {
        self.pool.unpin(self.page_id, &self.page);
    }
}

/// Result of [`BufferPoolManager::get_page`], according to the permission asked for.
pub enum PageGuard {
    Read(PageReadGuard),
    Write(PageWriteGuard),
}

impl PageGuard {
    pub fn page_id(&self) -> PageId {
        match self {
            PageGuard::Read(guard) => guard.page_id(),
            PageGuard::Write(guard) => guard.page_id(),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, HeapPage> {
        match self {
            PageGuard::Read(guard) => guard.read(),
            PageGuard::Write(guard) => guard.read(),
        }
    }
}
