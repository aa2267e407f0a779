//! Storage layer.
//!
//! - **HeapFile**: one file of fixed-size pages per table, addressed by ordinal
//! - **HeapPage**: decoded slotted page plus its binary codec
//! - **BufferPoolManager**: bounded page cache mediating every page access under
//!   the lock manager, with LRU eviction of unpinned pages

pub mod buffer;
pub mod disk;
pub mod page;

pub use buffer::{BufferPoolManager, PageReadGuard, PageWriteGuard, Permission};
pub use disk::{HeapFile, PAGE_SIZE};
pub use page::{HeapPage, PageBytes, PageId, TableId};
