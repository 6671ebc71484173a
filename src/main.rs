use anyhow::{bail, Result};
use clap::Parser;
use colored::*;
use image::Rgb;
use std::time::Duration;
use tracing::info;

mod args;
mod compose;
mod config;
mod detector;
mod emotion;
mod emotion_log;
mod error;
mod font;
mod output;
mod pipeline;
mod polar;
mod runner;
mod telemetry;
mod ttf;
mod types;
mod video;

use args::Args;
use config::{parse_hex, AppConfig};
use detector::FaceDetector;
use emotion::{EmotionClassifier, InputLayout};
use emotion_log::EmotionLog;
use font::Lettering;
use output::{DisplaySink, HeadlessOutput, WindowOutput};
use pipeline::{EmotionLabeler, FaceAnnotator, SimulatedClassifier, SimulatedDetector};
use polar::PolarPlot;
use runner::{DisplaySize, Runner, StopReason, StopSignal};
use video::VideoFileSource;

fn rgb(hex: &str) -> Rgb<u8> {
    let (r, g, b) = parse_hex(hex);
    Rgb([r, g, b])
}

fn create_detector(config: &AppConfig, simulate: bool) -> Result<Box<dyn FaceAnnotator>> {
    let models = &config.models;
    if simulate {
        return Ok(Box::new(SimulatedDetector::new()));
    }
    if !models.face_detector.exists() {
        bail!(
            "Face detector {} not found (pass --simulate to run without models)",
            models.face_detector.display()
        );
    }
    Ok(Box::new(FaceDetector::new(
        &models.face_detector,
        models.score_threshold,
        models.iou_threshold,
        rgb(&config.ui.box_color_hex),
    )?))
}

fn create_classifier(config: &AppConfig, simulate: bool) -> Result<Box<dyn EmotionLabeler>> {
    let models = &config.models;
    let labels = models.emotion_labels.clone();
    if simulate {
        return Ok(Box::new(SimulatedClassifier::new(labels)));
    }
    if !models.emotion_classifier.exists() {
        bail!(
            "Emotion classifier {} not found (pass --simulate to run without models)",
            models.emotion_classifier.display()
        );
    }

    let ui = &config.ui;
    Ok(Box::new(EmotionClassifier::new(
        &models.emotion_classifier,
        labels,
        InputLayout {
            size: models.classifier_input,
            grayscale: models.classifier_grayscale,
        },
        Lettering::load(&ui.font_family, ui.font_size_pt, ui.bitmap_scale),
        rgb(&ui.text_color_hex),
    )?))
}

fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init();

    // 1. Open the video first so a bad path fails before anything else is touched
    let mut source = VideoFileSource::open(&args.video)?;

    // 2. Config and models
    let config = AppConfig::load(&args.config)?;
    let detector = create_detector(&config, args.simulate)?;
    let classifier = create_classifier(&config, args.simulate)?;
    info!("Active pipeline: {} -> {}", detector.name(), classifier.name());

    let ui = &config.ui;
    let visualizer = PolarPlot::new(
        classifier.labels(),
        ui.plot_size,
        rgb(&ui.plot_color_hex),
        Lettering::load(&ui.font_family, ui.font_size_pt * 0.8, ui.bitmap_scale),
    )?;

    // 3. Output
    let mut display: Box<dyn DisplaySink> = if args.headless {
        Box::new(HeadlessOutput::default())
    } else {
        let win = WindowOutput::new(
            &args.window,
            args.width as usize,
            args.height as usize,
            Duration::from_millis(ui.key_poll_ms),
        )?;
        println!("Window created. Press [Q] to quit.");
        Box::new(win)
    };

    // 4. Loop
    let mut runner = Runner::new(
        detector,
        classifier,
        Box::new(visualizer),
        EmotionLog::new(&args.data),
        DisplaySize {
            width: args.width,
            height: args.height,
        },
    )
    .with_throttle(args.throttle_ms.map(Duration::from_millis));

    let stop = StopSignal::new();
    let summary = runner.run(&mut source, display.as_mut(), &stop)?;

    let ending = match summary.reason {
        StopReason::EndOfStream => "end of video",
        StopReason::Quit => "quit",
    };
    println!(
        "{}",
        format!(
            "Processed {} of {} decoded frames ({} with faces, {} vectors logged to {}), stopped at {}",
            summary.frames,
            source.frames_read(),
            summary.frames_with_faces,
            summary.vectors_logged,
            args.data.display(),
            ending
        )
        .green()
    );

    let log = EmotionLog::new(&args.data);
    for index in 0..summary.max_persons {
        let key = EmotionLog::person_key(index);
        let history = log.history(&key)?;
        let last = history
            .last()
            .and_then(|v| v.dominant())
            .map(|(label, p)| format!("{} {:.0}%", label, p * 100.0))
            .unwrap_or_else(|| "-".to_string());
        println!("  person {}: {} entries, last {}", key, history.len(), last);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_without_models() -> (tempfile::TempDir, AppConfig) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.models.face_detector = dir.path().join("missing_detector.onnx");
        config.models.emotion_classifier = dir.path().join("missing_classifier.onnx");
        (dir, config)
    }

    #[test]
    fn test_missing_models_are_fatal() {
        let (_dir, config) = config_without_models();

        let err = create_detector(&config, false).err().unwrap();
        assert!(err.to_string().contains("missing_detector.onnx"));
        let err = create_classifier(&config, false).err().unwrap();
        assert!(err.to_string().contains("--simulate"));
    }

    #[test]
    fn test_simulate_skips_models() {
        let (_dir, config) = config_without_models();

        let detector = create_detector(&config, true).unwrap();
        assert_eq!(detector.name(), "Simulated Face Detector");
        let classifier = create_classifier(&config, true).unwrap();
        assert_eq!(classifier.labels(), config.models.emotion_labels.as_slice());
    }
}
