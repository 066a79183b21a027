//! Consumer flags gating the video worker
//!
//! Each flag has a single writer (its feature's toggle); the worker only reads
//! the combined snapshot once per iteration.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct WorkerFlags {
    streaming: AtomicBool,
    recording: AtomicBool,
    tracking: AtomicBool,
}

/// Point-in-time copy of the three flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagSnapshot {
    pub streaming: bool,
    pub recording: bool,
    pub tracking: bool,
}

impl FlagSnapshot {
    /// The worker must run while this is true
    pub fn any(&self) -> bool {
        self.streaming || self.recording || self.tracking
    }
}

impl WorkerFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    pub fn recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn tracking(&self) -> bool {
        self.tracking.load(Ordering::SeqCst)
    }

    pub fn set_streaming(&self, on: bool) {
        self.streaming.store(on, Ordering::SeqCst);
    }

    pub fn set_recording(&self, on: bool) {
        self.recording.store(on, Ordering::SeqCst);
    }

    pub fn set_tracking(&self, on: bool) {
        self.tracking.store(on, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.set_streaming(false);
        self.set_recording(false);
        self.set_tracking(false);
    }

    pub fn snapshot(&self) -> FlagSnapshot {
        FlagSnapshot {
            streaming: self.streaming(),
            recording: self.recording(),
            tracking: self.tracking(),
        }
    }

    pub fn any(&self) -> bool {
        self.snapshot().any()
    }
}
