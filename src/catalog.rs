//! In-memory catalog: table id -> name, schema and backing heap file.
//!
//! Schemas are supplied by the caller when a table is created or attached and
//! are not persisted.

use crate::access::schema::RecordSchema;
use crate::error::{DbError, Result};
use crate::storage::page::{PageBytes, PageId, TableId};
use crate::storage::HeapFile;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::info;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A registered table. Owns the only handle to its heap file; every page
/// read or write goes through the file mutex.
#[derive(Debug)]
pub struct TableInfo {
    id: TableId,
    name: String,
    schema: Arc<RecordSchema>,
    path: PathBuf,
    file: Mutex<HeapFile>,
}

impl TableInfo {
    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_pages(&self) -> Result<u32> {
        self.file.lock().num_pages()
    }

    pub fn read_page(&self, page_id: PageId) -> Result<Box<PageBytes>> {
        self.file.lock().read_page(page_id)
    }

    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        self.file.lock().write_page(page_id, data)
    }

    pub fn allocate_page(&self) -> Result<PageId> {
        self.file.lock().allocate_page()
    }
}

#[derive(Debug)]
pub struct Catalog {
    tables: DashMap<TableId, Arc<TableInfo>>,
    names: DashMap<String, TableId>,
    next_table_id: AtomicU32,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            names: DashMap::new(),
            next_table_id: AtomicU32::new(1),
        }
    }

    /// Registers a new, empty table backed by a fresh file at `path`.
    pub fn create_table(
        &self,
        name: &str,
        schema: RecordSchema,
        path: &Path,
    ) -> Result<Arc<TableInfo>> {
        self.register(name, schema, path, |path, id| HeapFile::create(path, id))
    }

    /// Registers a table over an existing heap file.
    pub fn attach_table(
        &self,
        name: &str,
        schema: RecordSchema,
        path: &Path,
    ) -> Result<Arc<TableInfo>> {
        self.register(name, schema, path, |path, id| HeapFile::open(path, id))
    }

    fn register<F>(&self, name: &str, schema: RecordSchema, path: &Path, open: F) -> Result<Arc<TableInfo>>
    where
        F: FnOnce(&Path, TableId) -> Result<HeapFile>,
    {
        if schema.is_empty() {
            return Err(DbError::InvalidArgument(format!(
                "table '{}' needs at least one column",
                name
            )));
        }

        match self.names.entry(name.to_string()) {
            Entry::Occupied(_) => Err(DbError::TableExists(name.to_string())),
            Entry::Vacant(slot) => {
                let id = TableId(self.next_table_id.fetch_add(1, Ordering::SeqCst));
                let file = open(path, id)?;
                let info = Arc::new(TableInfo {
                    id,
                    name: name.to_string(),
                    schema: Arc::new(schema),
                    path: path.to_path_buf(),
                    file: Mutex::new(file),
                });
                self.tables.insert(id, Arc::clone(&info));
                slot.insert(id);
                info!("registered table '{}' as {} at {:?}", name, id, path);
                Ok(info)
            }
        }
    }

    pub fn table(&self, id: TableId) -> Result<Arc<TableInfo>> {
        self.tables
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DbError::table_not_found(id))
    }

    pub fn table_by_name(&self, name: &str) -> Result<Arc<TableInfo>> {
        let id = self
            .names
            .get(name)
            .map(|entry| *entry.value())
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;
        self.table(id)
    }

    pub fn schema(&self, id: TableId) -> Result<Arc<RecordSchema>> {
        Ok(Arc::clone(self.table(id)?.schema()))
    }

    /// All tables as `(id, name)`, in id order.
    pub fn list_tables(&self) -> Vec<(TableId, String)> {
        let mut tables: Vec<_> = self
            .tables
            .iter()
            .map(|entry| (*entry.key(), entry.value().name.clone()))
            .collect();
        tables.sort();
        tables
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
