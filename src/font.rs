//! A compact 3x5 bitmap font, used when no TrueType font can be found.
//! Lowercase letters are drawn as uppercase.
use image::{Rgb, RgbImage};

use crate::ttf::FontRenderer;

pub const GLYPH_W: u32 = 3;
pub const GLYPH_H: u32 = 5;

pub fn draw_text_line(img: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>, scale: u32) {
    let mut cx = x;
    for c in text.chars() {
        draw_char(img, cx, y, c, color, scale);
        cx += ((GLYPH_W + 1) * scale) as i32; // glyph + 1 column spacing
    }
}

pub fn measure_text_width(text: &str, scale: u32) -> u32 {
    (text.chars().count() as u32 * (GLYPH_W + 1) * scale).saturating_sub(scale)
}

// Each row is 3 bits, bit 2 is the leftmost column.
fn glyph(c: char) -> [u8; 5] {
    match c.to_ascii_uppercase() {
        '0' => [0x7, 0x5, 0x5, 0x5, 0x7],
        '1' => [0x2, 0x6, 0x2, 0x2, 0x7],
        '2' => [0x7, 0x1, 0x7, 0x4, 0x7],
        '3' => [0x7, 0x1, 0x7, 0x1, 0x7],
        '4' => [0x5, 0x5, 0x7, 0x1, 0x1],
        '5' => [0x7, 0x4, 0x7, 0x1, 0x7],
        '6' => [0x7, 0x4, 0x7, 0x5, 0x7],
        '7' => [0x7, 0x1, 0x2, 0x4, 0x4],
        '8' => [0x7, 0x5, 0x7, 0x5, 0x7],
        '9' => [0x7, 0x5, 0x7, 0x1, 0x7],
        'A' => [0x2, 0x5, 0x7, 0x5, 0x5],
        'B' => [0x6, 0x5, 0x6, 0x5, 0x6],
        'C' => [0x7, 0x4, 0x4, 0x4, 0x7],
        'D' => [0x6, 0x5, 0x5, 0x5, 0x6],
        'E' => [0x7, 0x4, 0x6, 0x4, 0x7],
        'F' => [0x7, 0x4, 0x6, 0x4, 0x4],
        'G' => [0x7, 0x4, 0x5, 0x5, 0x7],
        'H' => [0x5, 0x5, 0x7, 0x5, 0x5],
        'I' => [0x7, 0x2, 0x2, 0x2, 0x7],
        'J' => [0x1, 0x1, 0x1, 0x5, 0x7],
        'K' => [0x5, 0x5, 0x6, 0x5, 0x5],
        'L' => [0x4, 0x4, 0x4, 0x4, 0x7],
        'M' => [0x5, 0x7, 0x5, 0x5, 0x5],
        'N' => [0x6, 0x5, 0x5, 0x5, 0x5],
        'O' => [0x7, 0x5, 0x5, 0x5, 0x7],
        'P' => [0x7, 0x5, 0x7, 0x4, 0x4],
        'Q' => [0x7, 0x5, 0x5, 0x7, 0x1],
        'R' => [0x6, 0x5, 0x6, 0x5, 0x5],
        'S' => [0x3, 0x4, 0x2, 0x1, 0x6],
        'T' => [0x7, 0x2, 0x2, 0x2, 0x2],
        'U' => [0x5, 0x5, 0x5, 0x5, 0x7],
        'V' => [0x5, 0x5, 0x5, 0x5, 0x2],
        'W' => [0x5, 0x5, 0x5, 0x7, 0x5],
        'X' => [0x5, 0x5, 0x2, 0x5, 0x5],
        'Y' => [0x5, 0x5, 0x2, 0x2, 0x2],
        'Z' => [0x7, 0x1, 0x2, 0x4, 0x7],
        ' ' => [0x0, 0x0, 0x0, 0x0, 0x0],
        ':' => [0x0, 0x2, 0x0, 0x2, 0x0],
        '.' => [0x0, 0x0, 0x0, 0x0, 0x2],
        ',' => [0x0, 0x0, 0x0, 0x2, 0x4],
        '-' => [0x0, 0x0, 0x7, 0x0, 0x0],
        '%' => [0x5, 0x1, 0x2, 0x4, 0x5],
        '(' => [0x2, 0x4, 0x4, 0x4, 0x2],
        ')' => [0x2, 0x1, 0x1, 0x1, 0x2],
        _ => [0x7, 0x7, 0x7, 0x7, 0x7], // block
    }
}

fn draw_char(img: &mut RgbImage, x: i32, y: i32, c: char, color: Rgb<u8>, scale: u32) {
    let (width, height) = img.dimensions();
    for (row, bits) in glyph(c).iter().enumerate() {
        for col in 0..GLYPH_W {
            if (bits >> (2 - col)) & 1 == 0 {
                continue;
            }
            for dy in 0..scale {
                for dx in 0..scale {
                    let px = x + (col * scale + dx) as i32;
                    let py = y + (row as u32 * scale + dy) as i32;
                    if px >= 0 && py >= 0 && (px as u32) < width && (py as u32) < height {
                        img.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
    }
}

/// Text drawing with a TrueType font when one was found, bitmap glyphs otherwise.
pub enum Lettering {
    Truetype { font: FontRenderer, size_pt: f32 },
    Bitmap { scale: u32 },
}

impl Lettering {
    pub fn load(family: &str, size_pt: f32, bitmap_scale: u32) -> Self {
        match FontRenderer::try_load(family) {
            Some(font) => Lettering::Truetype { font, size_pt },
            None => Lettering::Bitmap { scale: bitmap_scale.max(1) },
        }
    }

    pub fn draw(&self, img: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
        match self {
            Lettering::Truetype { font, size_pt } => font.draw_text(img, x, y, text, color, *size_pt),
            Lettering::Bitmap { scale } => draw_text_line(img, x, y, text, color, *scale),
        }
    }

    pub fn measure(&self, text: &str) -> (u32, u32) {
        match self {
            Lettering::Truetype { font, size_pt } => font.measure(text, *size_pt),
            Lettering::Bitmap { scale } => (measure_text_width(text, *scale), GLYPH_H * scale),
        }
    }
}
