use anyhow::Result;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;

use crate::types::{Annotated, EmotionVector, Frame, FrameEmotions, Identity, Rect};

/// Yields decoded frames until the stream is exhausted.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Finds faces and draws their boxes onto the frame.
pub trait FaceAnnotator {
    fn name(&self) -> String;
    fn annotate(&mut self, frame: Frame) -> Result<Annotated>;
}

/// Turns the faces of an annotated frame into emotion vectors, one per person.
pub trait EmotionLabeler {
    fn name(&self) -> String;
    fn labels(&self) -> &[String];
    fn label(&mut self, annotated: Annotated) -> Result<(Frame, FrameEmotions)>;
}

/// Renders an emotion vector as an image.
pub trait Visualizer {
    /// Every axis of the plot, including the reserved closing spoke at the end.
    fn axis_labels(&self) -> Vec<String>;
    fn render(&mut self, identity: &Identity, probs: &EmotionVector) -> Result<RgbImage>;

    /// Axis labels without the reserved closing spoke.
    fn emotion_axes(&self) -> Vec<String> {
        let mut axes = self.axis_labels();
        axes.pop();
        axes
    }
}

// Stand-ins when the ONNX models are not available

/// One face near the middle of every frame, drifting slowly sideways.
pub struct SimulatedDetector {
    frame_count: u32,
}

impl SimulatedDetector {
    pub fn new() -> Self {
        Self { frame_count: 0 }
    }
}

impl FaceAnnotator for SimulatedDetector {
    fn name(&self) -> String {
        "Simulated Face Detector".to_string()
    }

    fn annotate(&mut self, mut frame: Frame) -> Result<Annotated> {
        self.frame_count += 1;

        let w = frame.width() as f32;
        let h = frame.height() as f32;
        let drift = (self.frame_count as f32 * 0.05).sin() * w * 0.1;
        let rect = Rect::new(w * 0.35 + drift, h * 0.25, w * 0.3, h * 0.5);
        draw_hollow_rect_mut(
            &mut frame,
            imageproc::rect::Rect::at(rect.x as i32, rect.y as i32)
                .of_size(rect.width.max(1.0) as u32, rect.height.max(1.0) as u32),
            Rgb([0, 255, 0]),
        );

        Ok(Annotated { frame, faces: vec![rect] })
    }
}

/// Cycles smoothly through the labels, one vector per detected face.
pub struct SimulatedClassifier {
    labels: Vec<String>,
    frame_count: u32,
}

impl SimulatedClassifier {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels, frame_count: 0 }
    }
}

impl EmotionLabeler for SimulatedClassifier {
    fn name(&self) -> String {
        "Simulated Emotions".to_string()
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn label(&mut self, annotated: Annotated) -> Result<(Frame, FrameEmotions)> {
        self.frame_count += 1;
        let t = self.frame_count as f32 * 0.05;
        let n = self.labels.len().max(1) as f32;

        let mut emotions = FrameEmotions::new();
        for (person, _) in annotated.faces.iter().enumerate() {
            let raw: Vec<f32> = (0..self.labels.len())
                .map(|i| {
                    let phase = t + person as f32 + i as f32 * std::f32::consts::TAU / n;
                    phase.sin().max(0.0) + 0.05
                })
                .collect();
            let sum: f32 = raw.iter().sum();
            let probs: Vec<f32> = raw.iter().map(|v| v / sum).collect();
            emotions.insert(person, EmotionVector::from_labels(&self.labels, &probs));
        }
        Ok((annotated.frame, emotions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_pipeline_yields_normalized_vectors() {
        let labels: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let mut detector = SimulatedDetector::new();
        let mut classifier = SimulatedClassifier::new(labels.clone());

        for _ in 0..5 {
            let annotated = detector.annotate(RgbImage::new(64, 48)).unwrap();
            let (frame, emotions) = classifier.label(annotated).unwrap();
            assert_eq!(frame.dimensions(), (64, 48));
            assert_eq!(emotions.len(), 1);
            let v = &emotions[&0];
            assert_eq!(v.labels().collect::<Vec<_>>(), vec!["a", "b", "c", "d"]);
            assert!((v.total() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_simulated_detector_draws_box() {
        let mut detector = SimulatedDetector::new();
        let annotated = detector.annotate(RgbImage::new(100, 100)).unwrap();
        let r = annotated.faces[0];
        assert_eq!(annotated.frame.get_pixel(r.x as u32, r.y as u32).0, [0, 255, 0]);
    }
}
