//! Live preview sinks

use super::Frame;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;

/// Receives every processed frame while streaming is on
pub trait PreviewSink: Send + Sync {
    fn show(&self, frame: &Arc<Frame>) -> Result<()>;

    /// Called once when the worker stops
    fn close(&self) {}
}

/// Publishes frames on a watch channel; the presentation layer renders the
/// latest one at its own pace. `None` means the preview was closed.
pub struct WatchPreview {
    tx: watch::Sender<Option<Arc<Frame>>>,
}

impl WatchPreview {
    pub fn new() -> (Self, watch::Receiver<Option<Arc<Frame>>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }
}

impl PreviewSink for WatchPreview {
    fn show(&self, frame: &Arc<Frame>) -> Result<()> {
        self.tx.send_replace(Some(frame.clone()));
        Ok(())
    }

    fn close(&self) {
        self.tx.send_replace(None);
    }
}

/// Discards frames
#[cfg(test)]
pub struct NullPreview;

#[cfg(test)]
impl PreviewSink for NullPreview {
    fn show(&self, _frame: &Arc<Frame>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_watch_preview_keeps_latest() {
        let (preview, rx) = WatchPreview::new();
        preview.show(&Arc::new(Frame::new(RgbImage::new(2, 2)))).expect("show");
        preview.show(&Arc::new(Frame::new(RgbImage::new(3, 3)))).expect("show");
        let latest = rx.borrow().clone().expect("frame published");
        assert_eq!(latest.dimensions(), (3, 3));

        preview.close();
        assert!(rx.borrow().is_none());
    }
}
