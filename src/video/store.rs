//! Single-slot latest-frame cache
//!
//! The worker overwrites the slot every iteration; snapshot requests read it
//! without ever blocking the writer.

use super::Frame;
use arc_swap::ArcSwapOption;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct FrameStore {
    latest: ArcSwapOption<Frame>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame
    pub fn publish(&self, frame: Arc<Frame>) {
        self.latest.store(Some(frame));
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.latest.load_full()
    }

    pub fn clear(&self) {
        self.latest.store(None);
    }
}
