use anyhow::{bail, Context, Result};
use image::{imageops::FilterType, Rgb, RgbImage};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use tracing::debug;

use crate::font::Lettering;
use crate::pipeline::EmotionLabeler;
use crate::types::{Annotated, EmotionVector, Frame, FrameEmotions, Rect};

/// How face crops are fed to the classifier.
#[derive(Debug, Clone, Copy)]
pub struct InputLayout {
    pub size: u32,
    pub grayscale: bool,
}

/// Facial expression classifier (FER+ layout by default: 1x1x64x64 raw gray, 8 logits).
pub struct EmotionClassifier {
    session: Session,
    labels: Vec<String>,
    layout: InputLayout,
    lettering: Lettering,
    text_color: Rgb<u8>,
}

impl EmotionClassifier {
    pub fn new(
        model_path: &Path,
        labels: Vec<String>,
        layout: InputLayout,
        lettering: Lettering,
        text_color: Rgb<u8>,
    ) -> Result<Self> {
        if labels.is_empty() {
            bail!("Emotion classifier needs at least one label");
        }

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .with_execution_providers([
                ort::execution_providers::CoreMLExecutionProvider::default().build(),
                ort::execution_providers::CPUExecutionProvider::default().build(),
            ])?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load emotion classifier {}", model_path.display()))?;

        Ok(Self {
            session,
            labels,
            layout,
            lettering,
            text_color,
        })
    }

    /// Probabilities for one face crop, in label order.
    pub fn classify(&mut self, face: &RgbImage) -> Result<EmotionVector> {
        let size = self.layout.size;
        let resized = image::imageops::resize(face, size, size, FilterType::Triangle);
        let (shape, input_data) = to_tensor_input(&resized, self.layout);

        let input = Tensor::from_array((shape, input_data))?;
        let outputs = self.session.run(ort::inputs![input])?;
        let (_shape, logits) = outputs[0].try_extract_tensor::<f32>()?;

        if logits.len() < self.labels.len() {
            bail!(
                "Emotion classifier produced {} values for {} labels",
                logits.len(),
                self.labels.len()
            );
        }
        let probs = softmax(&logits[..self.labels.len()]);
        Ok(EmotionVector::from_labels(&self.labels, &probs))
    }
}

impl EmotionLabeler for EmotionClassifier {
    fn name(&self) -> String {
        "Emotion Classifier (FER+)".to_string()
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn label(&mut self, annotated: Annotated) -> Result<(Frame, FrameEmotions)> {
        let Annotated { mut frame, faces } = annotated;
        let mut emotions = FrameEmotions::new();

        for (person, rect) in faces.iter().enumerate() {
            let crop = crop_face(&frame, rect);
            let vector = self.classify(&crop)?;
            if let Some((label, prob)) = vector.dominant() {
                let caption = format!("{} {}: {:.0}%", person + 1, label, prob * 100.0);
                let (_, text_h) = self.lettering.measure(&caption);
                let y = (rect.y as i32 - text_h as i32 - 4).max(0);
                self.lettering.draw(&mut frame, rect.x as i32, y, &caption, self.text_color);
            }
            emotions.insert(person, vector);
        }

        debug!(persons = emotions.len(), "emotion labels");
        Ok((frame, emotions))
    }
}

fn crop_face(frame: &Frame, rect: &Rect) -> RgbImage {
    match rect.clamp_to(frame.width(), frame.height()) {
        Some(r) => image::imageops::crop_imm(frame, r.x as u32, r.y as u32, r.width as u32, r.height as u32).to_image(),
        None => frame.clone(),
    }
}

/// NCHW input: one channel of raw luma (0..255) for grayscale models, otherwise RGB scaled to 0..1.
fn to_tensor_input(img: &RgbImage, layout: InputLayout) -> (Vec<usize>, Vec<f32>) {
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;

    if layout.grayscale {
        let data = img
            .pixels()
            .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
            .collect();
        (vec![1, 1, h as usize, w as usize], data)
    } else {
        let mut data = vec![0.0f32; 3 * plane];
        for (x, y, p) in img.enumerate_pixels() {
            let idx = (y * w + x) as usize;
            for c in 0..3 {
                data[c * plane + idx] = p[c] as f32 / 255.0;
            }
        }
        (vec![1, 3, h as usize, w as usize], data)
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one_and_keeps_order() {
        let p = softmax(&[1.0, 3.0, 0.5, 1000.0]);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(p[3] > 0.99);

        let q = softmax(&[2.0, 1.0, 0.0]);
        assert!(q[0] > q[1] && q[1] > q[2]);
    }

    #[test]
    fn test_grayscale_input_layout() {
        let img = RgbImage::from_pixel(4, 2, Rgb([255, 255, 255]));
        let (shape, data) = to_tensor_input(&img, InputLayout { size: 4, grayscale: true });
        assert_eq!(shape, vec![1, 1, 2, 4]);
        assert_eq!(data.len(), 8);
        assert!((data[0] - 255.0).abs() < 1e-3);
    }

    #[test]
    fn test_rgb_input_is_planar() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(1, 0, Rgb([255, 0, 51]));
        let (shape, data) = to_tensor_input(&img, InputLayout { size: 2, grayscale: false });
        assert_eq!(shape, vec![1, 3, 1, 2]);
        assert_eq!(data, vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.2]);
    }

    #[test]
    fn test_crop_face_clamps_to_frame() {
        let frame = Frame::new(50, 40);
        let crop = crop_face(&frame, &Rect::new(40.0, 30.0, 30.0, 30.0));
        assert_eq!(crop.dimensions(), (10, 10));
    }
}
