//! Per-transaction state.

use super::id::TransactionId;
use crate::storage::page::{PageBytes, PageId};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Committed => write!(f, "Committed"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

/// What the engine remembers about one transaction.
#[derive(Debug)]
pub struct TransactionInfo {
    pub id: TransactionId,
    pub state: TransactionState,
    pub start_time: Instant,
    pub end_time: Option<Instant>,
    /// Pages opened for writing, each with its image from before this
    /// transaction touched it.
    pub(crate) write_set: HashMap<PageId, Box<PageBytes>>,
}

impl TransactionInfo {
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            start_time: Instant::now(),
            end_time: None,
            write_set: HashMap::new(),
        }
    }

    pub fn duration(&self) -> Duration {
        match self.end_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// Pages in the write set, in page order.
    pub fn written_pages(&self) -> Vec<PageId> {
        let mut pages: Vec<_> = self.write_set.keys().copied().collect();
        pages.sort();
        pages
    }

    pub(crate) fn finish(&mut self, state: TransactionState) {
        self.state = state;
        self.end_time = Some(Instant::now());
        self.write_set.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::TableId;
    use crate::storage::PAGE_SIZE;

    #[test]
    fn test_state_predicates() {
        assert!(TransactionState::Active.is_active());
        assert!(!TransactionState::Active.is_finished());
        assert!(TransactionState::Committed.is_finished());
        assert!(TransactionState::Aborted.is_finished());
        assert_eq!(TransactionState::Aborted.to_string(), "Aborted");
    }

    #[test]
    fn test_finish_clears_write_set() {
        let mut info = TransactionInfo::new(TransactionId::new(1));
        let pid = PageId::new(TableId(1), 4);
        info.write_set.insert(pid, Box::new([0u8; PAGE_SIZE]));
        assert_eq!(info.written_pages(), vec![pid]);

        info.finish(TransactionState::Committed);
        assert_eq!(info.state, TransactionState::Committed);
        assert!(info.end_time.is_some());
        assert!(info.written_pages().is_empty());
    }
}
