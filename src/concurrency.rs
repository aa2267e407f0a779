//! Concurrency control.
//!
//! Strict two-phase locking at page granularity: every page access takes a
//! shared or exclusive lock that is held until the transaction commits or
//! aborts. Deadlocks are detected on a wait-for graph whenever a request
//! would have to wait.

pub mod deadlock;
pub mod lock;

pub use lock::{LockManager, LockMode};
