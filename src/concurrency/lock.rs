//! Page-level shared/exclusive lock table.
//!
//! Requests on one page queue up in arrival order. A request is granted when
//! it is compatible with every granted holder and with every request queued
//! ahead of it, so a waiting writer is never overtaken by readers arriving
//! after it. A holder of a shared lock may upgrade to exclusive once it is the
//! only holder; a pending upgrade blocks new arrivals.
//!
//! Whenever a request has to wait, its blockers become wait-for edges. If one
//! of those edges would close a cycle the request fails with
//! `TransactionAborted` instead of waiting. Waiters sleep on a condition
//! variable for at most the recheck interval, then re-evaluate their blockers
//! and repeat the cycle check.

use super::deadlock::WaitForGraph;
use crate::config::DEFAULT_LOCK_RECHECK_INTERVAL;
use crate::error::{DbError, Result};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use log::{debug, trace};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Lock modes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl LockMode {
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }

    /// Whether holding `self` already satisfies a request for `requested`.
    pub fn covers(&self, requested: LockMode) -> bool {
        *self == LockMode::Exclusive || requested == LockMode::Shared
    }
}

#[derive(Debug, Clone)]
struct LockRequest {
    tid: TransactionId,
    mode: LockMode,
    granted: bool,
}

#[derive(Debug, Default)]
struct LockQueue {
    /// Granted and waiting requests, in arrival order.
    requests: VecDeque<LockRequest>,
    /// Shared holder waiting to become the exclusive holder.
    upgrading: Option<TransactionId>,
}

impl LockQueue {
    fn granted_mode(&self, tid: TransactionId) -> Option<LockMode> {
        self.requests
            .iter()
            .find(|r| r.tid == tid && r.granted)
            .map(|r| r.mode)
    }

    fn is_pending(&self, tid: TransactionId, upgrade: bool) -> bool {
        if upgrade {
            self.upgrading == Some(tid)
        } else {
            self.requests.iter().any(|r| r.tid == tid && !r.granted)
        }
    }

    /// Transactions that must go away before `tid` can be granted `mode`.
    fn blockers(&self, tid: TransactionId, mode: LockMode, upgrade: bool) -> Vec<TransactionId> {
        let mut blockers: Vec<TransactionId> = self
            .requests
            .iter()
            .filter(|r| r.granted && r.tid != tid && !r.mode.is_compatible_with(&mode))
            .map(|r| r.tid)
            .collect();

        if !upgrade {
            for request in &self.requests {
                if request.tid == tid && !request.granted {
                    break;
                }
                if !request.granted && !request.mode.is_compatible_with(&mode) {
                    blockers.push(request.tid);
                }
            }
            if let Some(upgrader) = self.upgrading {
                if upgrader != tid {
                    blockers.push(upgrader);
                }
            }
        }

        blockers.sort();
        blockers.dedup();
        blockers
    }

    fn is_idle(&self) -> bool {
        self.requests.is_empty() && self.upgrading.is_none()
    }
}

enum Step {
    Granted,
    Wait,
    Deadlock(TransactionId),
    Cancelled,
}

#[derive(Debug, Default)]
struct LockTable {
    queues: HashMap<PageId, LockQueue>,
    held: HashMap<TransactionId, HashSet<PageId>>,
    wait_for: WaitForGraph,
}

impl LockTable {
    fn step(&mut self, tid: TransactionId, page_id: PageId, mode: LockMode, upgrade: bool) -> Step {
        let blockers = match self.queues.get(&page_id) {
            Some(queue) if queue.is_pending(tid, upgrade) => queue.blockers(tid, mode, upgrade),
            _ => {
                self.wait_for.clear_waits(tid);
                return Step::Cancelled;
            }
        };

        if blockers.is_empty() {
            self.grant(tid, page_id, mode, upgrade);
            self.wait_for.clear_waits(tid);
            return Step::Granted;
        }

        if let Some(&holder) = blockers
            .iter()
            .find(|&&holder| self.wait_for.would_cause_deadlock(tid, holder))
        {
            return Step::Deadlock(holder);
        }

        self.wait_for.set_waits(tid, &blockers);
        Step::Wait
    }

    fn grant(&mut self, tid: TransactionId, page_id: PageId, mode: LockMode, upgrade: bool) {
        if let Some(queue) = self.queues.get_mut(&page_id) {
            if upgrade {
                queue.upgrading = None;
                if let Some(request) = queue.requests.iter_mut().find(|r| r.tid == tid && r.granted) {
                    request.mode = LockMode::Exclusive;
                }
            } else if let Some(request) = queue
                .requests
                .iter_mut()
                .find(|r| r.tid == tid && !r.granted)
            {
                request.mode = mode;
                request.granted = true;
            }
        }
        self.held.entry(tid).or_default().insert(page_id);
    }

    /// Recomputes the edges of everyone still queued on `page_id`, so a
    /// released holder no longer shows up as a blocker.
    fn refresh_waiters(&mut self, page_id: PageId) {
        let Some(queue) = self.queues.get(&page_id) else {
            return;
        };
        let mut waiting: Vec<(TransactionId, Vec<TransactionId>)> = queue
            .requests
            .iter()
            .filter(|r| !r.granted)
            .map(|r| (r.tid, queue.blockers(r.tid, r.mode, false)))
            .collect();
        if let Some(upgrader) = queue.upgrading {
            waiting.push((upgrader, queue.blockers(upgrader, LockMode::Exclusive, true)));
        }
        for (waiter, blockers) in waiting {
            self.wait_for.set_waits(waiter, &blockers);
        }
    }

    /// Withdraws a pending request.
    fn cancel(&mut self, tid: TransactionId, page_id: PageId, upgrade: bool) {
        if let Some(queue) = self.queues.get_mut(&page_id) {
            if upgrade {
                if queue.upgrading == Some(tid) {
                    queue.upgrading = None;
                }
            } else {
                queue.requests.retain(|r| r.tid != tid || r.granted);
            }
            if queue.is_idle() {
                self.queues.remove(&page_id);
            }
        }
        self.wait_for.clear_waits(tid);
    }
}

/// Shared/exclusive page locks keyed by (transaction, page).
#[derive(Debug)]
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
    recheck_interval: Duration,
    timeout: Option<Duration>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_LOCK_RECHECK_INTERVAL, None)
    }

    pub fn with_settings(recheck_interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            released: Condvar::new(),
            recheck_interval,
            timeout,
        }
    }

    /// Blocks until `tid` holds `page_id` in at least `mode`.
    ///
    /// Fails with `TransactionAborted` when waiting would deadlock, when the
    /// configured timeout expires, or when the pending request is withdrawn by
    /// [`release_all_locks`](Self::release_all_locks). The caller is expected
    /// to abort the transaction in every case; locks it already holds are kept
    /// until then.
    pub fn acquire_lock(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> Result<()> {
        let mut table = self.table.lock();

        let held = table.queues.get(&page_id).and_then(|q| q.granted_mode(tid));
        if held.is_some_and(|h| h.covers(mode)) {
            return Ok(());
        }
        let upgrade = held.is_some();

        {
            let queue = table.queues.entry(page_id).or_default();
            if upgrade {
                if let Some(other) = queue.upgrading.filter(|&other| other != tid) {
                    debug!("{} cannot upgrade {}: {} is already upgrading", tid, page_id, other);
                    return Err(DbError::TransactionAborted(
                        tid,
                        format!("conflicting upgrade of {} with {}", page_id, other),
                    ));
                }
                queue.upgrading = Some(tid);
            } else {
                queue.requests.push_back(LockRequest {
                    tid,
                    mode,
                    granted: false,
                });
            }
        }

        let started = Instant::now();
        loop {
            match table.step(tid, page_id, mode, upgrade) {
                Step::Granted => {
                    trace!("{} granted {:?} on {}", tid, mode, page_id);
                    return Ok(());
                }
                Step::Cancelled => {
                    debug!("{} lock request on {} withdrawn", tid, page_id);
                    return Err(DbError::TransactionAborted(
                        tid,
                        format!("lock request on {} withdrawn", page_id),
                    ));
                }
                Step::Deadlock(holder) => {
                    table.cancel(tid, page_id, upgrade);
                    self.released.notify_all();
                    debug!("{} waiting on {} for {} would deadlock", tid, holder, page_id);
                    return Err(DbError::TransactionAborted(
                        tid,
                        format!("deadlock waiting on {} for {}", holder, page_id),
                    ));
                }
                Step::Wait => {}
            }

            let mut wait = self.recheck_interval;
            if let Some(timeout) = self.timeout {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    table.cancel(tid, page_id, upgrade);
                    self.released.notify_all();
                    debug!("{} timed out waiting for {}", tid, page_id);
                    return Err(DbError::TransactionAborted(
                        tid,
                        format!("timed out waiting for {}", page_id),
                    ));
                }
                wait = wait.min(timeout - elapsed);
            }

            trace!("{} waiting for {:?} on {}", tid, mode, page_id);
            self.released.wait_for(&mut table, wait);
        }
    }

    /// Releases one granted lock before commit. Only safe for pages the
    /// transaction has read but not modified.
    pub fn release_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        let mut table = self.table.lock();
        let released = match table.queues.get_mut(&page_id) {
            Some(queue) => {
                let before = queue.requests.len();
                queue.requests.retain(|r| !(r.tid == tid && r.granted));
                let released = queue.requests.len() != before;
                if queue.is_idle() {
                    table.queues.remove(&page_id);
                }
                released
            }
            None => false,
        };
        if released {
            table.refresh_waiters(page_id);
        }

        if let Some(pages) = table.held.get_mut(&tid) {
            pages.remove(&page_id);
            if pages.is_empty() {
                table.held.remove(&tid);
            }
        }

        if released {
            self.released.notify_all();
        }
        released
    }

    /// Drops every lock and pending request of `tid` and wakes all waiters.
    pub fn release_all_locks(&self, tid: TransactionId) {
        let mut table = self.table.lock();
        let count = table.held.remove(&tid).map_or(0, |pages| pages.len());

        table.queues.retain(|_, queue| {
            queue.requests.retain(|r| r.tid != tid);
            if queue.upgrading == Some(tid) {
                queue.upgrading = None;
            }
            !queue.is_idle()
        });
        table.wait_for.remove_transaction(tid);

        self.released.notify_all();
        trace!("{} released {} locks", tid, count);
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> Option<LockMode> {
        let table = self.table.lock();
        table.queues.get(&page_id).and_then(|q| q.granted_mode(tid))
    }

    pub fn locked_pages(&self, tid: TransactionId) -> Vec<PageId> {
        let table = self.table.lock();
        let mut pages: Vec<_> = table
            .held
            .get(&tid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }

    /// Transactions `tid` is currently waiting for.
    pub fn waits_for(&self, tid: TransactionId) -> Vec<TransactionId> {
        self.table.lock().wait_for.waits_for(tid)
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
