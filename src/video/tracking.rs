//! Subject tracking transform

use super::Frame;
use anyhow::Result;
use image::imageops;
use image::{GrayImage, Rgb};

/// Stateful frame transform applied while tracking is on
pub trait FrameTracker: Send {
    /// Annotate `frame`, or replace it with a cropped view
    fn track(&mut self, frame: &mut Frame) -> Result<()>;
}

/// Builds a fresh tracker each time tracking is switched on
pub type TrackerFactory = Box<dyn Fn() -> Box<dyn FrameTracker> + Send + Sync>;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Frame-differencing tracker: boxes the region that changed since the
/// previous frame
pub struct MotionTracker {
    threshold: u8,
    min_pixels: usize,
    previous: Option<GrayImage>,
    last_region: Option<Region>,
}

/// Inclusive pixel bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl MotionTracker {
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold,
            min_pixels: 16,
            previous: None,
            last_region: None,
        }
    }

    /// Region boxed on the most recent frame
    #[cfg(test)]
    pub fn last_region(&self) -> Option<Region> {
        self.last_region
    }

    fn changed_region(&self, previous: &GrayImage, current: &GrayImage) -> Option<Region> {
        let mut region: Option<Region> = None;
        let mut count = 0usize;

        for (x, y, pixel) in current.enumerate_pixels() {
            let before = previous.get_pixel(x, y)[0];
            if pixel[0].abs_diff(before) <= self.threshold {
                continue;
            }
            count += 1;
            region = Some(match region {
                None => Region { left: x, top: y, right: x, bottom: y },
                Some(r) => Region {
                    left: r.left.min(x),
                    top: r.top.min(y),
                    right: r.right.max(x),
                    bottom: r.bottom.max(y),
                },
            });
        }

        region.filter(|_| count >= self.min_pixels)
    }
}

impl FrameTracker for MotionTracker {
    fn track(&mut self, frame: &mut Frame) -> Result<()> {
        let gray = imageops::grayscale(&frame.image);

        self.last_region = match &self.previous {
            Some(previous) if previous.dimensions() == gray.dimensions() => {
                self.changed_region(previous, &gray)
            }
            _ => None,
        };
        if let Some(region) = self.last_region {
            draw_box(&mut frame.image, region);
        }

        self.previous = Some(gray);
        Ok(())
    }
}

fn draw_box(image: &mut image::RgbImage, region: Region) {
    for x in region.left..=region.right {
        image.put_pixel(x, region.top, BOX_COLOR);
        image.put_pixel(x, region.bottom, BOX_COLOR);
    }
    for y in region.top..=region.bottom {
        image.put_pixel(region.left, y, BOX_COLOR);
        image.put_pixel(region.right, y, BOX_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn frame_with_square(x0: u32, y0: u32) -> Frame {
        Frame::new(RgbImage::from_fn(32, 32, |x, y| {
            if (x0..x0 + 8).contains(&x) && (y0..y0 + 8).contains(&y) {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }))
    }

    #[test]
    fn test_first_frame_has_no_region() {
        let mut tracker = MotionTracker::new(32);
        let mut frame = frame_with_square(0, 0);
        tracker.track(&mut frame).expect("track");
        assert!(tracker.last_region().is_none());
        assert_eq!(frame.dimensions(), (32, 32));
    }

    #[test]
    fn test_moving_square_is_boxed() {
        let mut tracker = MotionTracker::new(32);
        tracker.track(&mut frame_with_square(0, 0)).expect("track");
        let mut frame = frame_with_square(16, 16);
        tracker.track(&mut frame).expect("track");

        let region = tracker.last_region().expect("motion detected");
        assert_eq!(region, Region { left: 0, top: 0, right: 23, bottom: 23 });
        assert_eq!(*frame.image.get_pixel(0, 0), BOX_COLOR);
    }

    #[test]
    fn test_still_scene_is_not_boxed() {
        let mut tracker = MotionTracker::new(32);
        tracker.track(&mut frame_with_square(4, 4)).expect("track");
        tracker.track(&mut frame_with_square(4, 4)).expect("track");
        assert!(tracker.last_region().is_none());
    }
}
