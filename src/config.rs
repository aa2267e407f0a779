//! Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of page frames held by the buffer pool.
pub const DEFAULT_BUFFER_POOL_FRAMES: usize = 50;

/// Default upper bound on one lock wait before the waiter re-checks for deadlock.
pub const DEFAULT_LOCK_RECHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Settings fixed when a [`Database`](crate::database::Database) is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// Directory holding one heap file per table.
    pub data_dir: PathBuf,
    /// Capacity of the buffer pool, in pages.
    pub buffer_pool_frames: usize,
    /// How long a blocked lock request sleeps before re-evaluating its blockers.
    pub lock_recheck_interval: Duration,
    /// Give up on a lock wait after this long. `None` waits until granted or deadlocked.
    pub lock_timeout: Option<Duration>,
}

impl DatabaseConfig {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_buffer_pool_frames(mut self, frames: usize) -> Self {
        self.buffer_pool_frames = frames;
        self
    }

    pub fn with_lock_recheck_interval(mut self, interval: Duration) -> Self {
        self.lock_recheck_interval = interval;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./slotdb_data"),
            buffer_pool_frames: DEFAULT_BUFFER_POOL_FRAMES,
            lock_recheck_interval: DEFAULT_LOCK_RECHECK_INTERVAL,
            lock_timeout: None,
        }
    }
}
