use image::{Rgb, RgbImage};
use rusttype::{point, Font, Scale};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub struct FontRenderer {
    font: Font<'static>,
}

impl FontRenderer {
    pub fn try_load(family: &str) -> Option<Self> {
        // Common macOS/Linux locations, then the working directory
        let paths = [
            format!("/Library/Fonts/{}.ttf", family),
            format!("/System/Library/Fonts/{}.ttf", family),
            format!("/System/Library/Fonts/Supplemental/{}.ttf", family),
            format!("/usr/share/fonts/truetype/{}.ttf", family),
            format!("/usr/share/fonts/truetype/dejavu/{}.ttf", family),
            format!("/usr/share/fonts/TTF/{}.ttf", family),
            format!("{}.ttf", family),
        ];

        for p in paths.iter() {
            if !Path::new(p).exists() {
                continue;
            }
            if let Ok(data) = fs::read(p) {
                if let Some(font) = Font::try_from_vec(data) {
                    info!("Loaded font from {}", p);
                    return Some(Self { font });
                }
            }
        }

        debug!("Could not find font family '{}'. Falling back to bitmap.", family);
        None
    }

    pub fn draw_text(&self, img: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>, size_pt: f32) {
        let scale = Scale::uniform(size_pt);
        let v_metrics = self.font.v_metrics(scale);
        let start = point(x as f32, y as f32 + v_metrics.ascent);
        let (width, height) = img.dimensions();

        for glyph in self.font.layout(text, scale, start) {
            if let Some(bb) = glyph.pixel_bounding_box() {
                glyph.draw(|gx, gy, v| {
                    // Hard threshold, no blending
                    if v < 0.2 {
                        return;
                    }
                    let px = bb.min.x + gx as i32;
                    let py = bb.min.y + gy as i32;
                    if px >= 0 && py >= 0 && (px as u32) < width && (py as u32) < height {
                        img.put_pixel(px as u32, py as u32, color);
                    }
                });
            }
        }
    }

    /// (width, line height) in pixels.
    pub fn measure(&self, text: &str, size_pt: f32) -> (u32, u32) {
        let scale = Scale::uniform(size_pt);
        let v_metrics = self.font.v_metrics(scale);
        let width = self
            .font
            .layout(text, scale, point(0.0, 0.0))
            .filter_map(|g| g.pixel_bounding_box().map(|bb| bb.max.x))
            .max()
            .unwrap_or(0)
            .max(0) as u32;
        let height = (v_metrics.ascent - v_metrics.descent + v_metrics.line_gap).ceil() as u32;
        (width, height)
    }
}
