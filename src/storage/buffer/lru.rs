use super::replacer::{FrameId, Replacer};
use std::collections::{BTreeMap, HashMap};

/// Evicts the frame that has gone longest since it was last unpinned.
#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Unpin stamp -> frame, oldest first.
    by_age: BTreeMap<u64, FrameId>,
    /// Frame -> its current unpin stamp.
    stamps: HashMap<FrameId, u64>,
    clock: u64,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Replacer for LruReplacer {
    fn evict(&mut self) -> Option<FrameId> {
        let (_, frame_id) = self.by_age.pop_first()?;
        self.stamps.remove(&frame_id);
        Some(frame_id)
    }

    fn pin(&mut self, frame_id: FrameId) {
        self.remove(frame_id);
    }

    fn unpin(&mut self, frame_id: FrameId) {
        if self.stamps.contains_key(&frame_id) {
            return;
        }
        self.clock += 1;
        self.by_age.insert(self.clock, frame_id);
        self.stamps.insert(frame_id, self.clock);
    }

    fn remove(&mut self, frame_id: FrameId) {
        if let Some(stamp) = self.stamps.remove(&frame_id) {
            self.by_age.remove(&stamp);
        }
    }

    fn size(&self) -> usize {
        self.stamps.len()
    }
}
