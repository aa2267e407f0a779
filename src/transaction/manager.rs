//! Registry of every transaction the engine has started.

use super::id::{TransactionId, TransactionIdGenerator};
use super::state::{TransactionInfo, TransactionState};
use crate::error::{DbError, Result};
use crate::storage::page::{PageBytes, PageId};
use dashmap::DashMap;
use log::debug;
use std::collections::HashMap;

/// Tracks transaction ids, their state, and the pages each active
/// transaction has opened for writing.
#[derive(Debug, Default)]
pub struct TransactionManager {
    id_generator: TransactionIdGenerator,
    transactions: DashMap<TransactionId, TransactionInfo>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> TransactionId {
        let id = self.id_generator.next();
        self.transactions.insert(id, TransactionInfo::new(id));
        debug!("{} started", id);
        id
    }

    /// Fails with `TransactionNotActive` for unknown or retired ids.
    pub fn check_active(&self, id: TransactionId) -> Result<()> {
        if self.is_active(id) {
            Ok(())
        } else {
            Err(DbError::TransactionNotActive(id))
        }
    }

    pub fn is_active(&self, id: TransactionId) -> bool {
        self.state(id).is_some_and(|state| state.is_active())
    }

    pub fn state(&self, id: TransactionId) -> Option<TransactionState> {
        self.transactions.get(&id).map(|info| info.state)
    }

    /// Records the pre-transaction image of `page_id` the first time `id`
    /// opens it for writing. Later calls for the same page are no-ops and do
    /// not evaluate `image`.
    pub fn record_before_image<F>(&self, id: TransactionId, page_id: PageId, image: F) -> Result<()>
    where
        F: FnOnce() -> Result<Box<PageBytes>>,
    {
        let mut info = self
            .transactions
            .get_mut(&id)
            .ok_or(DbError::TransactionNotActive(id))?;
        if !info.state.is_active() {
            return Err(DbError::TransactionNotActive(id));
        }
        if !info.write_set.contains_key(&page_id) {
            info.write_set.insert(page_id, image()?);
        }
        Ok(())
    }

    pub fn written_pages(&self, id: TransactionId) -> Result<Vec<PageId>> {
        let info = self
            .transactions
            .get(&id)
            .ok_or(DbError::TransactionNotActive(id))?;
        Ok(info.written_pages())
    }

    /// Removes and returns the write set of an active transaction.
    pub fn take_write_set(&self, id: TransactionId) -> Result<HashMap<PageId, Box<PageBytes>>> {
        let mut info = self
            .transactions
            .get_mut(&id)
            .ok_or(DbError::TransactionNotActive(id))?;
        if !info.state.is_active() {
            return Err(DbError::TransactionNotActive(id));
        }
        Ok(std::mem::take(&mut info.write_set))
    }

    /// Moves an active transaction to its final state. The id can never be
    /// used for page access again.
    pub fn retire(&self, id: TransactionId, state: TransactionState) -> Result<()> {
        let mut info = self
            .transactions
            .get_mut(&id)
            .ok_or(DbError::TransactionNotActive(id))?;
        if !info.state.is_active() {
            return Err(DbError::TransactionNotActive(id));
        }
        info.finish(state);
        debug!("{} {} after {:?}", id, state, info.duration());
        Ok(())
    }

    pub fn active_transactions(&self) -> Vec<TransactionId> {
        let mut ids: Vec<_> = self
            .transactions
            .iter()
            .filter(|entry| entry.state.is_active())
            .map(|entry| *entry.key())
            .collect();
        ids.sort();
        ids
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Forgets finished transactions; returns how many were dropped.
    pub fn cleanup_finished(&self) -> usize {
        let before = self.transactions.len();
        self.transactions.retain(|_, info| info.state.is_active());
        before - self.transactions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::TableId;
    use crate::storage::PAGE_SIZE;

    fn pid(n: u32) -> PageId {
        PageId::new(TableId(1), n)
    }

    #[test]
    fn test_begin_and_retire() {
        let manager = TransactionManager::new();
        let t1 = manager.begin();
        let t2 = manager.begin();

        assert_ne!(t1, t2);
        assert_eq!(manager.active_transactions(), vec![t1, t2]);

        manager.retire(t1, TransactionState::Committed).unwrap();
        assert_eq!(manager.state(t1), Some(TransactionState::Committed));
        assert!(matches!(
            manager.check_active(t1),
            Err(DbError::TransactionNotActive(_))
        ));
        assert!(manager.check_active(t2).is_ok());

        // Retiring twice is refused.
        assert!(manager.retire(t1, TransactionState::Aborted).is_err());
    }

    #[test]
    fn test_unknown_id_is_not_active() {
        let manager = TransactionManager::new();
        let ghost = TransactionId::new(999);
        assert!(matches!(
            manager.check_active(ghost),
            Err(DbError::TransactionNotActive(_))
        ));
        assert!(manager.retire(ghost, TransactionState::Aborted).is_err());
    }

    #[test]
    fn test_before_image_recorded_once() {
        let manager = TransactionManager::new();
        let tid = manager.begin();

        manager
            .record_before_image(tid, pid(3), || Ok(Box::new([1u8; PAGE_SIZE])))
            .unwrap();
        manager
            .record_before_image(tid, pid(3), || panic!("must not re-capture"))
            .unwrap();
        manager
            .record_before_image(tid, pid(1), || Ok(Box::new([2u8; PAGE_SIZE])))
            .unwrap();

        assert_eq!(manager.written_pages(tid).unwrap(), vec![pid(1), pid(3)]);

        let images = manager.take_write_set(tid).unwrap();
        assert_eq!(images[&pid(3)][0], 1);
        assert!(manager.written_pages(tid).unwrap().is_empty());
    }

    #[test]
    fn test_write_set_refused_after_retire() {
        let manager = TransactionManager::new();
        let tid = manager.begin();
        manager.retire(tid, TransactionState::Aborted).unwrap();

        assert!(manager
            .record_before_image(tid, pid(0), || Ok(Box::new([0u8; PAGE_SIZE])))
            .is_err());
        assert!(manager.take_write_set(tid).is_err());
    }

    #[test]
    fn test_cleanup_finished() {
        let manager = TransactionManager::new();
        let t1 = manager.begin();
        let t2 = manager.begin();
        let t3 = manager.begin();
        manager.retire(t1, TransactionState::Committed).unwrap();
        manager.retire(t2, TransactionState::Aborted).unwrap();

        assert_eq!(manager.transaction_count(), 3);
        assert_eq!(manager.cleanup_finished(), 2);
        assert_eq!(manager.transaction_count(), 1);
        assert!(manager.is_active(t3));
        assert_eq!(manager.state(t1), None);
    }
}
