//! Recording sessions
//!
//! Frames are written as a Motion-JPEG stream: each frame is a complete JPEG
//! image appended to the file, so the recording is playable up to the last
//! written frame even if the process dies. When frames carry captions, the
//! text goes to a `.srt` subtitle file next to the video.

use super::Frame;
use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// JPEG quality used for recorded frames
pub const RECORDING_QUALITY: u8 = 85;

/// File extension of recordings
pub const RECORDING_EXTENSION: &str = "mjpeg";

/// One open recording file, alive for exactly one recording span
pub struct RecordingSession {
    path: PathBuf,
    writer: BufWriter<File>,
    size: (u32, u32),
    epoch: u64,
    frames: u64,
    frame_period: Duration,
    captions: Option<CaptionTrack>,
}

impl RecordingSession {
    /// Create the file; `size` is fixed for the whole session
    pub fn create(path: &Path, size: (u32, u32), epoch: u64, frame_period: Duration) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create recording {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            size,
            epoch,
            frames: 0,
            frame_period,
            captions: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recording span this session belongs to
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[cfg(test)]
    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    /// Append one frame, scaling it to the session size if needed
    pub fn write(&mut self, frame: &Frame) -> Result<()> {
        let encoded = if frame.dimensions() == self.size {
            JpegEncoder::new_with_quality(&mut self.writer, RECORDING_QUALITY)
                .encode_image(&frame.image)
        } else {
            let scaled = frame.clone().fit_to(self.size);
            JpegEncoder::new_with_quality(&mut self.writer, RECORDING_QUALITY)
                .encode_image(&scaled.image)
        };
        encoded.with_context(|| format!("Failed to write frame to {}", self.path.display()))?;

        if !frame.caption.is_empty() && self.captions.is_none() {
            self.captions = Some(CaptionTrack::create(&caption_path(&self.path))?);
        }
        if let Some(captions) = self.captions.as_mut() {
            captions.push(self.frames, &frame.caption, self.frame_period)?;
        }

        self.frames += 1;
        Ok(())
    }

    /// Flush and close; returns the number of frames written
    pub fn finish(mut self) -> Result<u64> {
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush recording {}", self.path.display()))?;
        if let Some(captions) = self.captions.take() {
            captions.finish(self.frames, self.frame_period)?;
        }
        Ok(self.frames)
    }
}

/// Subtitle file path for a recording
pub fn caption_path(video: &Path) -> PathBuf {
    video.with_extension("srt")
}

/// SRT writer merging consecutive frames with identical captions into one cue
struct CaptionTrack {
    writer: BufWriter<File>,
    cue_index: u32,
    pending: Option<PendingCue>,
}

struct PendingCue {
    first_frame: u64,
    text: Vec<String>,
}

impl CaptionTrack {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create caption file {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
            cue_index: 0,
            pending: None,
        })
    }

    fn push(&mut self, frame_index: u64, text: &[String], period: Duration) -> Result<()> {
        if let Some(pending) = &self.pending {
            if pending.text == text {
                return Ok(());
            }
        }
        self.flush_pending(frame_index, period)?;
        if !text.is_empty() {
            self.pending = Some(PendingCue {
                first_frame: frame_index,
                text: text.to_vec(),
            });
        }
        Ok(())
    }

    fn flush_pending(&mut self, end_frame: u64, period: Duration) -> Result<()> {
        if let Some(cue) = self.pending.take() {
            self.cue_index += 1;
            writeln!(self.writer, "{}", self.cue_index)?;
            writeln!(
                self.writer,
                "{} --> {}",
                srt_time(cue_time(period, cue.first_frame)),
                srt_time(cue_time(period, end_frame))
            )?;
            for line in &cue.text {
                writeln!(self.writer, "{}", line)?;
            }
            writeln!(self.writer)?;
        }
        Ok(())
    }

    fn finish(mut self, frames: u64, period: Duration) -> Result<()> {
        self.flush_pending(frames, period)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Offset of frame `frame` from the start of the recording
fn cue_time(period: Duration, frame: u64) -> Duration {
    let nanos = period.as_nanos().saturating_mul(u128::from(frame));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// `HH:MM:SS,mmm`
fn srt_time(at: Duration) -> String {
    let millis = at.as_millis();
    format!(
        "{:02}:{:02}:{:02},{:03}",
        millis / 3_600_000,
        (millis / 60_000) % 60,
        (millis / 1000) % 60,
        millis % 1000
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    const PERIOD: Duration = Duration::from_millis(40);

    #[test]
    fn test_frames_are_appended_as_jpegs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clip.mjpeg");

        let mut session = RecordingSession::create(&path, (8, 6), 1, PERIOD).expect("create");
        session.write(&Frame::new(RgbImage::new(8, 6))).expect("write");
        // mismatched frames are scaled to the session size
        session.write(&Frame::new(RgbImage::new(16, 12))).expect("write");
        assert_eq!(session.finish().expect("finish"), 2);

        let bytes = std::fs::read(&path).expect("read");
        let starts = bytes.windows(2).filter(|w| w[0] == 0xFF && w[1] == 0xD8).count();
        assert!(starts >= 2, "expected two JPEG images, found {}", starts);
        assert!(!caption_path(&path).exists());
    }

    #[test]
    fn test_captions_are_merged_into_cues() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clip.mjpeg");

        let mut session = RecordingSession::create(&path, (4, 4), 1, PERIOD).expect("create");
        for text in ["a", "a", "b"] {
            let mut frame = Frame::new(RgbImage::new(4, 4));
            frame.caption = vec![text.to_string()];
            session.write(&frame).expect("write");
        }
        session.finish().expect("finish");

        let srt = std::fs::read_to_string(caption_path(&path)).expect("read srt");
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:00,080\na\n\n2\n00:00:00,080 --> 00:00:00,120\nb\n\n"
        );
    }

    #[test]
    fn test_cue_time_past_u32_frames() {
        let frame = u64::from(u32::MAX) + 1;
        assert_eq!(cue_time(Duration::from_millis(1), frame).as_millis(), 4_294_967_296);
        assert_eq!(cue_time(PERIOD, 3), Duration::from_millis(120));
        assert_eq!(cue_time(Duration::MAX, u64::MAX), Duration::from_nanos(u64::MAX));
    }

    #[test]
    fn test_srt_time() {
        assert_eq!(srt_time(Duration::from_millis(3_723_004)), "01:02:03,004");
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let result = RecordingSession::create(Path::new("/nonexistent/dir/clip.mjpeg"), (4, 4), 1, PERIOD);
        assert!(result.is_err());
    }
}
