use std::fmt::Debug;

/// Index of a frame in the buffer pool's frame arena.
pub type FrameId = usize;

/// Eviction policy over the frames of a buffer pool.
///
/// Only frames with no active pins are tracked as candidates.
pub trait Replacer: Send + Sync + Debug {
    /// Picks a victim and stops tracking it. `None` if every frame is pinned.
    fn evict(&mut self) -> Option<FrameId>;

    /// The frame gained its first pin and must not be evicted.
    fn pin(&mut self, frame_id: FrameId);

    /// The frame lost its last pin and may be evicted.
    fn unpin(&mut self, frame_id: FrameId);

    /// Stops tracking a frame whose page left the pool without eviction.
    fn remove(&mut self, frame_id: FrameId);

    /// Number of evictable frames.
    fn size(&self) -> usize;
}
