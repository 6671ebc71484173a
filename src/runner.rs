use anyhow::Result;
use image::RgbImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::compose;
use crate::emotion_log::EmotionLog;
use crate::output::DisplaySink;
use crate::pipeline::{EmotionLabeler, FaceAnnotator, FrameSource, Visualizer};
use crate::types::{EmotionVector, Frame, FrameEmotions, Identity};

/// Frame size before composition.
pub const FRAME_SIZE: (u32, u32) = (700, 500);
/// Plot size before composition.
pub const PLOT_SIZE: (u32, u32) = (500, 500);

/// Cooperative stop flag, shared between the loop and whoever wants it to end.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub frames_with_faces: u64,
    pub vectors_logged: u64,
    /// Most faces seen in a single frame.
    pub max_persons: usize,
    pub reason: StopReason,
}

/// The per-frame loop: detect, classify, plot, compose, display, log.
pub struct Runner {
    detector: Box<dyn FaceAnnotator>,
    classifier: Box<dyn EmotionLabeler>,
    visualizer: Box<dyn Visualizer>,
    log: EmotionLog,
    display_size: DisplaySize,
    throttle: Option<Duration>,
}

impl Runner {
    pub fn new(
        detector: Box<dyn FaceAnnotator>,
        classifier: Box<dyn EmotionLabeler>,
        visualizer: Box<dyn Visualizer>,
        log: EmotionLog,
        display_size: DisplaySize,
    ) -> Self {
        Self {
            detector,
            classifier,
            visualizer,
            log,
            display_size,
            throttle: None,
        }
    }

    /// Sleep this long after every frame.
    pub fn with_throttle(mut self, throttle: Option<Duration>) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        display: &mut dyn DisplaySink,
        stop: &StopSignal,
    ) -> Result<RunSummary> {
        self.log.prepare_dir()?;
        info!(
            detector = %self.detector.name(),
            classifier = %self.classifier.name(),
            log = %self.log.path().display(),
            "starting emotion loop"
        );

        let started = Instant::now();
        let mut summary = RunSummary {
            frames: 0,
            frames_with_faces: 0,
            vectors_logged: 0,
            max_persons: 0,
            reason: StopReason::EndOfStream,
        };

        while let Some(frame) = source.next_frame()? {
            let (display_frame, emotions) = self.process_frame(frame)?;

            summary.frames += 1;
            if !emotions.is_empty() {
                summary.frames_with_faces += 1;
                summary.vectors_logged += emotions.len() as u64;
                summary.max_persons = summary.max_persons.max(emotions.len());
            }

            display.show(&display_frame)?;

            if display.quit_requested() {
                stop.stop();
            }
            if stop.is_stopped() {
                summary.reason = StopReason::Quit;
                break;
            }

            if let Some(t) = self.throttle {
                std::thread::sleep(t);
            }
        }

        let secs = started.elapsed().as_secs_f32();
        let fps = if secs > 0.0 { summary.frames as f32 / secs } else { 0.0 };
        info!(
            frames = summary.frames,
            frames_with_faces = summary.frames_with_faces,
            fps,
            reason = ?summary.reason,
            "emotion loop finished"
        );
        Ok(summary)
    }

    /// One frame through the pipeline. Returns the display frame and what was logged.
    pub fn process_frame(&mut self, frame: Frame) -> Result<(RgbImage, FrameEmotions)> {
        let annotated = self.detector.annotate(frame)?;
        let (frame, emotions) = self.classifier.label(annotated)?;
        let frame = compose::resize(&frame, FRAME_SIZE.0, FRAME_SIZE.1);

        let plot = if emotions.is_empty() {
            let placeholder = EmotionVector::zeros(&self.visualizer.emotion_axes());
            self.visualizer.render(&Identity::Unknown, &placeholder)?
        } else {
            let persons = emotions.len().max(1) as u32;
            let mut plots = Vec::with_capacity(emotions.len());
            for (index, vector) in &emotions {
                let plot = self.visualizer.render(&Identity::Person(*index), vector)?;
                let (w, h) = plot.dimensions();
                plots.push(compose::resize(&plot, w / persons, h / persons));
            }
            self.log.append(&emotions)?;

            if plots.len() > compose::MAX_TILES {
                warn!(persons = plots.len(), "too many faces to plot, showing the first {}", compose::MAX_TILES);
                plots.truncate(compose::MAX_TILES);
            }
            if plots.len() > 1 {
                compose::tile(&plots)?
            } else {
                plots.swap_remove(0)
            }
        };

        let plot = compose::resize(&plot, PLOT_SIZE.0, PLOT_SIZE.1);
        let combined = compose::hconcat(&frame, &plot)?;
        let display_frame = compose::resize(&combined, self.display_size.width, self.display_size.height);

        debug!(persons = emotions.len(), "frame composed");
        Ok((display_frame, emotions))
    }
}
