//! slotdb: the storage and execution core of a single-node relational engine.
//!
//! Tables are heap files of fixed-size slotted pages. Every page access goes
//! through a bounded buffer pool under strict two-phase page locking, and
//! queries are evaluated by pull-based operator trees.

pub mod access;
pub mod catalog;
pub mod concurrency;
pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod storage;
pub mod testing;
pub mod transaction;

pub use config::DatabaseConfig;
pub use database::{Database, Transaction};
pub use error::{DbError, Result};
