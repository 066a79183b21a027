//! Video pipeline: one worker task multiplexing the camera feed across
//! preview, recording, snapshot and tracking consumers

pub mod flags;
pub mod frame;
pub mod preview;
pub mod recording;
mod snapshot;
pub mod store;
pub mod tracking;
pub mod worker;

pub use flags::{FlagSnapshot, WorkerFlags};
pub use frame::Frame;
#[cfg(test)]
pub use preview::NullPreview;
pub use preview::{PreviewSink, WatchPreview};
pub use recording::RECORDING_EXTENSION;
pub use store::FrameStore;
pub use tracking::{FrameTracker, MotionTracker, TrackerFactory};
pub use worker::VideoWorker;
