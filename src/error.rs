//! Error types shared by every layer of the engine.

use crate::storage::page::{PageId, TableId};
use crate::transaction::TransactionId;
use thiserror::Error;

/// Errors that can occur in the storage and execution core.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Corrupt page {page_id}: {reason}")]
    CorruptPage { page_id: PageId, reason: String },

    #[error("Page not found: {0}")]
    PageNotFound(PageId),

    #[error("Buffer pool is full: every resident page is pinned")]
    BufferPoolFull,

    #[error("{0} aborted: {1}")]
    TransactionAborted(TransactionId, String),

    #[error("{0} is not active")]
    TransactionNotActive(TransactionId),

    #[error("Iterator has no more tuples")]
    NoSuchElement,

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Page {0} has no empty slot")]
    PageFull(PageId),

    #[error("Tuple not found: slot {slot} of {page_id} is empty")]
    TupleNotFound { page_id: PageId, slot: usize },

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Operator is not open")]
    OperatorNotOpen,

    #[error("Page {0} is pinned")]
    PagePinned(PageId),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    pub(crate) fn corrupt(page_id: PageId, reason: impl Into<String>) -> Self {
        DbError::CorruptPage {
            page_id,
            reason: reason.into(),
        }
    }

    pub(crate) fn table_not_found(table_id: TableId) -> Self {
        DbError::TableNotFound(table_id.to_string())
    }

    /// Whether the error dooms the enclosing transaction to an abort.
    pub fn is_abort(&self) -> bool {
        matches!(self, DbError::TransactionAborted(..))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, DbError>;
