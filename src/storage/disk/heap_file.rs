use crate::error::{DbError, Result};
use crate::storage::page::{PageBytes, PageId, TableId};
use log::trace;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const PAGE_SIZE: usize = 4096;

/// Backing store of one table: raw concatenated pages, page `n` at byte
/// offset `n * PAGE_SIZE`, no file header. The file only ever grows.
#[derive(Debug)]
pub struct HeapFile {
    table_id: TableId,
    path: PathBuf,
    file: File,
}

impl HeapFile {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: &Path, table_id: TableId) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            table_id,
            path: path.to_path_buf(),
            file,
        })
    }

    /// Opens an existing heap file.
    pub fn open(path: &Path, table_id: TableId) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            table_id,
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_pages(&self) -> Result<u32> {
        let file_size = self.file.metadata()?.len();
        Ok((file_size / PAGE_SIZE as u64) as u32)
    }

    pub fn read_page(&mut self, page_id: PageId) -> Result<Box<PageBytes>> {
        self.check_page(page_id)?;

        let mut buf = Box::new([0u8; PAGE_SIZE]);
        self.file.seek(SeekFrom::Start(Self::page_offset(page_id)))?;
        self.file.read_exact(buf.as_mut())?;
        trace!("read {} from {:?}", page_id, self.path);

        Ok(buf)
    }

    /// Overwrites an existing page in place. Never appends.
    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> Result<()> {
        if data.len() != PAGE_SIZE {
            return Err(DbError::InvalidArgument(format!(
                "page image must be {} bytes, got {}",
                PAGE_SIZE,
                data.len()
            )));
        }
        self.check_page(page_id)?;

        self.file.seek(SeekFrom::Start(Self::page_offset(page_id)))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;
        trace!("wrote {} to {:?}", page_id, self.path);

        Ok(())
    }

    /// Extends the file by one zeroed page and returns its id.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        let current_pages = self.num_pages()?;
        let page_id = PageId::new(self.table_id, current_pages);

        let new_size = (current_pages as u64 + 1) * PAGE_SIZE as u64;
        self.file.set_len(new_size)?;

        Ok(page_id)
    }

    fn check_page(&self, page_id: PageId) -> Result<()> {
        if page_id.table_id != self.table_id || page_id.page_number >= self.num_pages()? {
            return Err(DbError::PageNotFound(page_id));
        }
        Ok(())
    }

    fn page_offset(page_id: PageId) -> u64 {
        page_id.page_number as u64 * PAGE_SIZE as u64
    }
}
