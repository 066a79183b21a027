//! Still picture capture

use super::{Frame, VideoWorker};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tello_shared::TransportError;
use tracing::{error, info};

/// How long a snapshot waits for the first frame after the stream starts
const FRAME_WAIT: Duration = Duration::from_secs(1);
const FRAME_POLL: Duration = Duration::from_millis(10);

impl VideoWorker {
    /// Save one frame to `path`; the image format follows the extension
    ///
    /// While the worker runs the picture comes from the frame store. Otherwise
    /// the stream is switched on and the first decoded frame is pulled straight
    /// from the transport.
    pub async fn take_picture(&self, path: &Path) -> bool {
        match self.capture(path).await {
            Ok(()) => {
                info!("Picture saved to {}", path.display());
                true
            }
            Err(e) => {
                error!("Failed to take picture {}: {:#}", path.display(), e);
                false
            }
        }
    }

    async fn capture(&self, path: &Path) -> Result<()> {
        let frame = if self.is_running().await {
            self.stored_frame().await?
        } else {
            self.shared
                .transport
                .set_stream_enabled(true)
                .await
                .context("Failed to enable video stream")?;
            Arc::new(self.pulled_frame().await.context("Failed to pull frame")?)
        };
        frame.save(path)
    }

    /// The decoder needs a moment after `streamon` before it has a frame
    async fn pulled_frame(&self) -> Result<Frame, TransportError> {
        let deadline = tokio::time::Instant::now() + FRAME_WAIT;
        loop {
            match self.shared.transport.pull_latest_frame().await {
                Ok(frame) => return Ok(frame),
                Err(e) if tokio::time::Instant::now() >= deadline => return Err(e),
                Err(_) => tokio::time::sleep(FRAME_POLL).await,
            }
        }
    }

    async fn stored_frame(&self) -> Result<Arc<Frame>> {
        let deadline = tokio::time::Instant::now() + FRAME_WAIT;
        loop {
            if let Some(frame) = self.shared.store.latest() {
                return Ok(frame);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(TransportError::NoFrame.into());
            }
            tokio::time::sleep(FRAME_POLL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::LatestCommand;
    use crate::config::VideoConfig;
    use crate::transport::fake::ScriptedTransport;
    use crate::video::NullPreview;

    fn config() -> VideoConfig {
        VideoConfig {
            width: 8,
            height: 6,
            fps: 100,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_picture_without_worker_pulls_directly() {
        let transport = Arc::new(ScriptedTransport::new());
        let worker = VideoWorker::new(transport.clone(), &config(), LatestCommand::new(), Arc::new(NullPreview));
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shot.png");

        assert!(worker.take_picture(&path).await);
        assert!(path.exists());
        assert_eq!(transport.stream_calls(), vec![true]);
        assert_eq!(transport.pull_count(), 1);
        assert!(worker.store().latest().is_none());
        assert!(!worker.is_running().await);
    }

    #[tokio::test]
    async fn test_picture_without_worker_waits_for_first_frame() {
        let transport = Arc::new(ScriptedTransport::new().fail_first_frames(3));
        let worker = VideoWorker::new(transport.clone(), &config(), LatestCommand::new(), Arc::new(NullPreview));
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shot.png");

        assert!(worker.take_picture(&path).await);
        assert!(path.exists());
        assert_eq!(transport.stream_calls(), vec![true]);
        assert_eq!(transport.pull_count(), 4);
    }

    #[tokio::test]
    async fn test_picture_while_streaming_uses_store() {
        let transport = Arc::new(ScriptedTransport::new().with_frame_size(16, 12));
        let worker = VideoWorker::new(transport, &config(), LatestCommand::new(), Arc::new(NullPreview));
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shot.png");

        worker.toggle_streaming().await;
        assert!(worker.take_picture(&path).await);
        worker.stop_all().await;

        // stored frames are already fitted to the target size
        let saved = image::open(&path).expect("open picture");
        assert_eq!((saved.width(), saved.height()), (8, 6));
    }

    #[tokio::test]
    async fn test_picture_failure_returns_false() {
        let transport = Arc::new(ScriptedTransport::new().failing_frames());
        let worker = VideoWorker::new(transport, &config(), LatestCommand::new(), Arc::new(NullPreview));
        let dir = tempfile::tempdir().expect("tempdir");

        assert!(!worker.take_picture(&dir.path().join("shot.png")).await);
    }

    #[tokio::test]
    async fn test_picture_unwritable_path_returns_false() {
        let transport = Arc::new(ScriptedTransport::new());
        let worker = VideoWorker::new(transport, &config(), LatestCommand::new(), Arc::new(NullPreview));

        assert!(!worker.take_picture(Path::new("/nonexistent/dir/shot.png")).await);
    }
}
