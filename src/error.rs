use std::path::PathBuf;
use thiserror::Error;

/// Failures callers may want to tell apart. Everything else travels as `anyhow::Error`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Video file '{}' not found.", .0.display())]
    VideoNotFound(PathBuf),

    #[error("Could not open video: {0}")]
    CouldNotOpen(String),

    #[error("Emotion log entry '{key}' is not an array")]
    LogFormat { key: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("no images to compose")]
    Empty,

    #[error("cannot tile {0} images (maximum is 10)")]
    TooMany(usize),

    #[error("image sizes do not line up: {left:?} vs {right:?}")]
    Mismatch { left: (u32, u32), right: (u32, u32) },
}
