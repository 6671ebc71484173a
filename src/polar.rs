use anyhow::{ensure, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use std::f32::consts::{FRAC_PI_2, TAU};

use crate::font::Lettering;
use crate::pipeline::Visualizer;
use crate::types::{EmotionVector, Identity};

/// Name of the last axis, which repeats the first angle to close the outline.
pub const CLOSING_AXIS: &str = "_close";

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const GRID: Rgb<u8> = Rgb([200, 200, 200]);
const INK: Rgb<u8> = Rgb([40, 40, 40]);
const RINGS: [f32; 4] = [0.25, 0.5, 0.75, 1.0];

/// Square polar ("radar") plot of an emotion vector.
pub struct PolarPlot {
    size: u32,
    // (label, angle in radians), closing axis last
    axes: Vec<(String, f32)>,
    color: Rgb<u8>,
    lettering: Lettering,
}

impl PolarPlot {
    pub fn new(labels: &[String], size: u32, color: Rgb<u8>, lettering: Lettering) -> Result<Self> {
        ensure!(!labels.is_empty(), "Polar plot needs at least one axis");
        ensure!(size >= 64, "Polar plot size {} is too small", size);

        let n = labels.len() as f32;
        let mut axes: Vec<(String, f32)> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i as f32 * TAU / n))
            .collect();
        axes.push((CLOSING_AXIS.to_string(), TAU));

        Ok(Self { size, axes, color, lettering })
    }

    fn center(&self) -> (f32, f32) {
        let s = self.size as f32;
        (s / 2.0, s / 2.0 + s * 0.04)
    }

    fn radius(&self) -> f32 {
        self.size as f32 * 0.34
    }

    /// Pixel position at `fraction` of the full radius along `angle`. Angle 0 points up, clockwise.
    fn point(&self, angle: f32, fraction: f32) -> (f32, f32) {
        let (cx, cy) = self.center();
        let r = self.radius() * fraction;
        let a = angle - FRAC_PI_2;
        (cx + r * a.cos(), cy + r * a.sin())
    }

    fn draw_grid(&self, img: &mut RgbImage) {
        let (cx, cy) = self.center();
        for ring in RINGS {
            let r = (self.radius() * ring).round() as i32;
            draw_hollow_circle_mut(img, (cx as i32, cy as i32), r, GRID);
        }

        for (label, angle) in &self.axes[..self.axes.len() - 1] {
            draw_line_segment_mut(img, (cx, cy), self.point(*angle, 1.0), GRID);

            let (lx, ly) = self.point(*angle, 1.15);
            let (tw, th) = self.lettering.measure(label);
            let x = lx as i32 - tw as i32 / 2;
            let y = ly as i32 - th as i32 / 2;
            self.lettering.draw(img, x, y, label, INK);
        }
    }

    fn draw_values(&self, img: &mut RgbImage, probs: &EmotionVector) {
        let points: Vec<(f32, f32)> = self
            .axes
            .iter()
            .enumerate()
            .map(|(i, (label, angle))| {
                // The closing axis reuses the first label's value
                let label = if i == self.axes.len() - 1 { &self.axes[0].0 } else { label };
                let value = probs.get(label).unwrap_or(0.0).clamp(0.0, 1.0);
                self.point(*angle, value)
            })
            .collect();

        for pair in points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            draw_line_segment_mut(img, a, b, self.color);
            draw_line_segment_mut(img, (a.0 + 1.0, a.1), (b.0 + 1.0, b.1), self.color);
            draw_line_segment_mut(img, (a.0, a.1 + 1.0), (b.0, b.1 + 1.0), self.color);
        }
        for &(x, y) in &points[..points.len() - 1] {
            draw_filled_circle_mut(img, (x as i32, y as i32), 3, self.color);
        }
    }
}

impl Visualizer for PolarPlot {
    fn axis_labels(&self) -> Vec<String> {
        self.axes.iter().map(|(l, _)| l.clone()).collect()
    }

    fn render(&mut self, identity: &Identity, probs: &EmotionVector) -> Result<RgbImage> {
        let mut img = RgbImage::from_pixel(self.size, self.size, BACKGROUND);
        self.draw_grid(&mut img);
        self.draw_values(&mut img, probs);

        let title = identity.to_string();
        let (tw, _) = self.lettering.measure(&title);
        let x = (self.size as i32 - tw as i32) / 2;
        self.lettering.draw(&mut img, x.max(0), (self.size / 50) as i32, &title, INK);
        Ok(img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        ["happy", "sad", "angry", "calm"].iter().map(|s| s.to_string()).collect()
    }

    fn plot() -> PolarPlot {
        PolarPlot::new(&labels(), 200, Rgb([255, 0, 0]), Lettering::Bitmap { scale: 1 }).unwrap()
    }

    #[test]
    fn test_axes_end_with_closing_spoke() {
        let p = plot();
        let axes = p.axis_labels();
        assert_eq!(axes.len(), 5);
        assert_eq!(axes.last().map(String::as_str), Some(CLOSING_AXIS));
        assert_eq!(p.emotion_axes(), labels());
    }

    #[test]
    fn test_render_is_fixed_size() {
        let mut p = plot();
        let img = p.render(&Identity::Unknown, &EmotionVector::zeros(&p.emotion_axes())).unwrap();
        assert_eq!(img.dimensions(), (200, 200));
    }

    #[test]
    fn test_full_value_reaches_outer_ring() {
        let mut p = plot();
        let v = EmotionVector::from_labels(&labels(), &[1.0, 0.0, 0.0, 0.0]);
        let img = p.render(&Identity::Person(0), &v).unwrap();

        // "happy" sits straight up at full radius
        let (x, y) = p.point(0.0, 1.0);
        assert_eq!(img.get_pixel(x as u32, y as u32).0, [255, 0, 0]);
    }

    #[test]
    fn test_rejects_degenerate_setup() {
        assert!(PolarPlot::new(&[], 200, Rgb([0, 0, 0]), Lettering::Bitmap { scale: 1 }).is_err());
        assert!(PolarPlot::new(&labels(), 10, Rgb([0, 0, 0]), Lettering::Bitmap { scale: 1 }).is_err());
    }
}
