use clap::Parser;
use std::path::PathBuf;

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time emotion detection on video files.", long_about = None)]
pub struct Args {
    /// Path to input video file
    #[arg(long, default_value = "video.mp4")]
    pub video: PathBuf,

    /// Display window width
    #[arg(long, default_value_t = 1200, value_parser = clap::value_parser!(u32).range(1..))]
    pub width: u32,

    /// Display window height
    #[arg(long, default_value_t = 400, value_parser = clap::value_parser!(u32).range(1..))]
    pub height: u32,

    /// Path to JSON file for storing per-frame emotion data
    #[arg(long, default_value = "./uploads/data.json")]
    pub data: PathBuf,

    /// Display window title
    #[arg(long, default_value = "Emotion Detection")]
    pub window: String,

    /// Sleep this many milliseconds after every frame (70 gives roughly 14 fps)
    #[arg(long)]
    pub throttle_ms: Option<u64>,

    /// Run without a window
    #[arg(long, default_value_t = false)]
    pub headless: bool,

    /// Use simulated face detection and emotions instead of the ONNX models
    #[arg(long, default_value_t = false)]
    pub simulate: bool,

    /// Configuration file
    #[arg(long, default_value = AppConfig::DEFAULT_PATH)]
    pub config: PathBuf,
}
