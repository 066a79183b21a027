//! Frame replay
//!
//! Plays a directory of still images into a [`FrameFeed`] in file-name
//! order, looping at a fixed rate. Stands in for the H.264 decoder when
//! flying without one, or for bench runs with no camera.

use super::FrameFeed;
use crate::video::Frame;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub struct FrameReplay {
    frames: Vec<Frame>,
}

impl FrameReplay {
    /// Decode every image in `dir`; other files are skipped
    pub fn load(dir: &Path) -> Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image(path))
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            let image = image::open(path)
                .with_context(|| format!("Failed to decode {}", path.display()))?
                .to_rgb8();
            frames.push(Frame::new(image));
        }
        if frames.is_empty() {
            bail!("No images in {}", dir.display());
        }

        info!("Loaded {} replay frames from {}", frames.len(), dir.display());
        Ok(Self { frames })
    }

    /// Publish frames forever, one per `period`
    pub async fn run(self, feed: FrameFeed, period: Duration) {
        let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
        for (n, frame) in self.frames.iter().cycle().enumerate() {
            ticker.tick().await;
            if n % self.frames.len() == 0 {
                debug!("Replay loop {}", n / self.frames.len());
            }
            feed.publish(Frame::new(frame.image.clone()));
        }
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
