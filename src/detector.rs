use anyhow::{Context, Result};
use image::{imageops::FilterType, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use tracing::debug;

use crate::pipeline::FaceAnnotator;
use crate::types::{Annotated, Frame, Rect};

const INPUT_W: u32 = 320;
const INPUT_H: u32 = 240;

/// UltraFace (RFB-320) face detector.
pub struct FaceDetector {
    session: Session,
    anchors: Vec<(f32, f32, f32, f32)>, // cx, cy, w, h
    score_threshold: f32,
    iou_threshold: f32,
    box_color: Rgb<u8>,
}

impl FaceDetector {
    pub fn new(model_path: &Path, score_threshold: f32, iou_threshold: f32, box_color: Rgb<u8>) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .with_execution_providers([
                ort::execution_providers::CoreMLExecutionProvider::default().build(),
                ort::execution_providers::CPUExecutionProvider::default().build(),
            ])?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load face detector {}", model_path.display()))?;

        let anchors = generate_anchors(INPUT_W as usize, INPUT_H as usize);
        Ok(Self {
            session,
            anchors,
            score_threshold,
            iou_threshold,
            box_color,
        })
    }

    /// All faces in `frame`, in frame pixels, ordered left to right.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<Rect>> {
        let resized = image::imageops::resize(frame, INPUT_W, INPUT_H, FilterType::Triangle);

        // NCHW [1, 3, 240, 320], (pixel - 127) / 128
        let plane = (INPUT_W * INPUT_H) as usize;
        let mut input_data = vec![0.0f32; 3 * plane];
        for (x, y, p) in resized.enumerate_pixels() {
            let idx = (y * INPUT_W + x) as usize;
            for c in 0..3 {
                input_data[c * plane + idx] = (p[c] as f32 - 127.0) / 128.0;
            }
        }

        let input_tensor = Tensor::from_array((vec![1, 3, INPUT_H as usize, INPUT_W as usize], input_data))?;
        let outputs = self.session.run(ort::inputs![input_tensor])?;

        let (_scores_shape, scores_data) = outputs["scores"].try_extract_tensor::<f32>()?;
        let (_boxes_shape, boxes_data) = outputs["boxes"].try_extract_tensor::<f32>()?;

        let candidates = decode_boxes(&self.anchors, scores_data, boxes_data, self.score_threshold);
        let kept = non_max_suppression(candidates, self.iou_threshold);

        // Scale back to original frame
        let sx = frame.width() as f32 / INPUT_W as f32;
        let sy = frame.height() as f32 / INPUT_H as f32;
        let mut faces: Vec<Rect> = kept
            .into_iter()
            .filter_map(|(r, _)| {
                Rect::new(r.x * sx, r.y * sy, r.width * sx, r.height * sy).clamp_to(frame.width(), frame.height())
            })
            .collect();
        faces.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));

        debug!(faces = faces.len(), "face detection");
        Ok(faces)
    }
}

impl FaceAnnotator for FaceDetector {
    fn name(&self) -> String {
        "Face Detection (UltraFace)".to_string()
    }

    fn annotate(&mut self, mut frame: Frame) -> Result<Annotated> {
        let faces = self.detect(&frame)?;
        for face in &faces {
            draw_box(&mut frame, face, self.box_color);
        }
        Ok(Annotated { frame, faces })
    }
}

/// Two-pixel outline around `rect`.
pub fn draw_box(frame: &mut Frame, rect: &Rect, color: Rgb<u8>) {
    for inset in 0..2 {
        let w = rect.width as i32 - 2 * inset;
        let h = rect.height as i32 - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let r = imageproc::rect::Rect::at(rect.x as i32 + inset, rect.y as i32 + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(frame, r, color);
    }
}

/// Candidate boxes above `threshold`, in 320x240 input pixels, with their scores.
fn decode_boxes(
    anchors: &[(f32, f32, f32, f32)],
    scores_raw: &[f32],
    boxes_raw: &[f32],
    threshold: f32,
) -> Vec<(Rect, f32)> {
    // Variance for UltraFace
    let center_variance = 0.1;
    let size_variance = 0.2;

    let n = anchors
        .len()
        .min(scores_raw.len() / 2)
        .min(boxes_raw.len() / 4);

    let mut out = Vec::new();
    for i in 0..n {
        let score = scores_raw[i * 2 + 1];
        if score <= threshold {
            continue;
        }
        let cx_enc = boxes_raw[i * 4];
        let cy_enc = boxes_raw[i * 4 + 1];
        let w_enc = boxes_raw[i * 4 + 2];
        let h_enc = boxes_raw[i * 4 + 3];

        let (ax, ay, aw, ah) = anchors[i];

        let cx = cx_enc * center_variance * aw + ax;
        let cy = cy_enc * center_variance * ah + ay;
        let w = (w_enc * size_variance).exp() * aw;
        let h = (h_enc * size_variance).exp() * ah;

        let x = cx - w / 2.0;
        let y = cy - h / 2.0;

        out.push((
            Rect::new(x * INPUT_W as f32, y * INPUT_H as f32, w * INPUT_W as f32, h * INPUT_H as f32),
            score,
        ));
    }
    out
}

/// Greedy NMS, highest score first.
fn non_max_suppression(mut candidates: Vec<(Rect, f32)>, iou_threshold: f32) -> Vec<(Rect, f32)> {
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<(Rect, f32)> = Vec::new();
    for (rect, score) in candidates {
        if kept.iter().all(|(k, _)| k.iou(&rect) <= iou_threshold) {
            kept.push((rect, score));
        }
    }
    kept
}

fn generate_anchors(width: usize, height: usize) -> Vec<(f32, f32, f32, f32)> {
    // UltraFace configs
    let shrinkage_list = [8, 16, 32, 64];
    let min_boxes: [&[f32]; 4] = [&[10.0, 16.0, 24.0], &[32.0, 48.0], &[64.0, 96.0], &[128.0, 192.0, 256.0]];
    let mut anchors = Vec::new();

    let w = width as f32;
    let h = height as f32;

    for (i, &shrinkage) in shrinkage_list.iter().enumerate() {
        let feature_h = (h / shrinkage as f32).ceil() as usize;
        let feature_w = (w / shrinkage as f32).ceil() as usize;

        for v in 0..feature_h {
            for u in 0..feature_w {
                let cx = (u as f32 * shrinkage as f32 + shrinkage as f32 / 2.0) / w;
                let cy = (v as f32 * shrinkage as f32 + shrinkage as f32 / 2.0) / h;

                for &min_box in min_boxes[i] {
                    anchors.push((cx, cy, min_box / w, min_box / h));
                }
            }
        }
    }
    anchors
}
