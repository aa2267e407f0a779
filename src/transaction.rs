//! Transaction bookkeeping.
//!
//! - **TransactionId**: monotonically allocated handle
//! - **TransactionState**: Active, then Committed or Aborted
//! - **TransactionManager**: registry of transactions and the pages each one
//!   has opened for writing, with their pre-transaction images

pub mod id;
pub mod manager;
pub mod state;

pub use id::{TransactionId, TransactionIdGenerator};
pub use manager::TransactionManager;
pub use state::{TransactionInfo, TransactionState};
