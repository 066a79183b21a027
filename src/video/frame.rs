//! Video frame type passed between the transport and the video worker

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::Path;
use std::time::SystemTime;

/// A decoded RGB video frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: SystemTime,
    /// Overlay text lines (timestamp, altitude, latest command) when stamping
    pub caption: Vec<String>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: SystemTime::now(),
            caption: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Resize to `size`, returning the frame untouched if it already matches
    pub fn fit_to(self, size: (u32, u32)) -> Self {
        if self.dimensions() == size {
            return self;
        }
        let image = imageops::resize(&self.image, size.0, size.1, FilterType::Triangle);
        Self { image, ..self }
    }

    /// Write the image; the format follows the file extension
    pub fn save(&self, path: &Path) -> Result<()> {
        self.image
            .save(path)
            .with_context(|| format!("Failed to write image {}", path.display()))
    }
}
