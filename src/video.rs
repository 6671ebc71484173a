use anyhow::Result;
use std::path::Path;

use crate::error::AppError;
use crate::pipeline::FrameSource;
use crate::types::Frame;

/// Fails with `VideoNotFound` unless `path` exists.
pub fn ensure_exists(path: &Path) -> Result<(), AppError> {
    if path.exists() {
        Ok(())
    } else {
        Err(AppError::VideoNotFound(path.to_path_buf()))
    }
}

/// Decodes a local video file frame by frame. The capture is released on drop.
pub struct VideoFileSource {
    #[cfg(feature = "opencv")]
    capture: opencv::videoio::VideoCapture,
    frames_read: u64,
}

#[cfg(feature = "opencv")]
impl VideoFileSource {
    pub fn open(path: &Path) -> Result<Self> {
        use colored::*;
        use opencv::prelude::*;
        use opencv::videoio::{self, VideoCapture};

        ensure_exists(path)?;

        let name = path.to_string_lossy().to_string();
        let capture = VideoCapture::from_file(&name, videoio::CAP_ANY)
            .map_err(|_| AppError::CouldNotOpen(name.clone()))?;
        if !capture.is_opened().unwrap_or(false) {
            return Err(AppError::CouldNotOpen(name).into());
        }

        let fps = VideoCaptureTraitConst::get(&capture, videoio::CAP_PROP_FPS).unwrap_or(0.0);
        let total = VideoCaptureTraitConst::get(&capture, videoio::CAP_PROP_FRAME_COUNT).unwrap_or(0.0);
        println!("{}", format!("Opened video: {}", path.display()).green());
        println!("Format: {:.1} fps, {} frames", fps, total as i64);

        Ok(Self {
            capture,
            frames_read: 0,
        })
    }
}

#[cfg(not(feature = "opencv"))]
impl VideoFileSource {
    pub fn open(path: &Path) -> Result<Self> {
        ensure_exists(path)?;
        Err(AppError::CouldNotOpen(format!(
            "{} (built without the `opencv` feature)",
            path.display()
        ))
        .into())
    }
}

impl VideoFileSource {
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

#[cfg(feature = "opencv")]
impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        use anyhow::Context;
        use opencv::core::Mat;
        use opencv::imgproc;
        use opencv::prelude::*;

        let mut bgr = Mat::default();
        if !self.capture.read(&mut bgr).context("Failed to read frame")? || bgr.empty() {
            return Ok(None);
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB).context("Failed to convert frame to RGB")?;

        let width = rgb.cols() as u32;
        let height = rgb.rows() as u32;
        let data = rgb.data_bytes().context("Frame is not continuous")?.to_vec();
        let frame = Frame::from_raw(width, height, data)
            .ok_or_else(|| anyhow::anyhow!("Decoded frame has unexpected size {}x{}", width, height))?;

        self.frames_read += 1;
        Ok(Some(frame))
    }
}

// `open` never succeeds without a decoder
#[cfg(not(feature = "opencv"))]
impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_video_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.mp4");

        let err = VideoFileSource::open(&missing).err().unwrap();
        match err.downcast_ref::<AppError>() {
            Some(AppError::VideoNotFound(p)) => assert_eq!(p, &missing),
            other => panic!("expected VideoNotFound, got {:?}", other),
        }
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_unreadable_file_is_could_not_open() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.mp4");
        std::fs::write(&garbage, b"definitely not a video").unwrap();

        let err = VideoFileSource::open(&garbage).err().unwrap();
        assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::CouldNotOpen(_))));
    }
}
