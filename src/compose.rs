use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::ComposeError;

pub const MAX_TILES: usize = 10;

/// Exact-size resize. Aspect ratio is not preserved.
pub fn resize(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    if img.dimensions() == (width, height) {
        return img.clone();
    }
    imageops::resize(img, width.max(1), height.max(1), FilterType::Triangle)
}

/// `left` then `right`, side by side.
pub fn hconcat(left: &RgbImage, right: &RgbImage) -> Result<RgbImage, ComposeError> {
    if left.height() != right.height() {
        return Err(ComposeError::Mismatch {
            left: left.dimensions(),
            right: right.dimensions(),
        });
    }
    let mut out = RgbImage::new(left.width() + right.width(), left.height());
    imageops::replace(&mut out, left, 0, 0);
    imageops::replace(&mut out, right, left.width() as i64, 0);
    Ok(out)
}

/// `top` above `bottom`.
pub fn vconcat(top: &RgbImage, bottom: &RgbImage) -> Result<RgbImage, ComposeError> {
    if top.width() != bottom.width() {
        return Err(ComposeError::Mismatch {
            left: top.dimensions(),
            right: bottom.dimensions(),
        });
    }
    let mut out = RgbImage::new(top.width(), top.height() + bottom.height());
    imageops::replace(&mut out, top, 0, 0);
    imageops::replace(&mut out, bottom, 0, top.height() as i64);
    Ok(out)
}

/// Grid shape used for `n` tiles: `(cols, rows)`.
pub fn grid_shape(n: usize) -> (usize, usize) {
    let mut cols = 1;
    while cols * cols < n {
        cols += 1;
    }
    let rows = (n + cols - 1) / cols;
    (cols, rows)
}

/// Lay out 1 to 10 images row-major on a near-square grid.
///
/// Cells take the size of the largest input, images sit in the top-left corner
/// of their cell and unused cells stay black.
pub fn tile(images: &[RgbImage]) -> Result<RgbImage, ComposeError> {
    match images.len() {
        0 => return Err(ComposeError::Empty),
        1 => return Ok(images[0].clone()),
        n if n > MAX_TILES => return Err(ComposeError::TooMany(n)),
        _ => {}
    }

    let cell_w = images.iter().map(|i| i.width()).max().unwrap_or(1);
    let cell_h = images.iter().map(|i| i.height()).max().unwrap_or(1);
    let (cols, _) = grid_shape(images.len());

    let mut out: Option<RgbImage> = None;
    for chunk in images.chunks(cols) {
        let mut row = RgbImage::new(cell_w * cols as u32, cell_h);
        for (i, img) in chunk.iter().enumerate() {
            imageops::replace(&mut row, img, (i as u32 * cell_w) as i64, 0);
        }
        out = Some(match out {
            Some(above) => vconcat(&above, &row)?,
            None => row,
        });
    }
    out.ok_or(ComposeError::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(w: u32, h: u32, v: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([v, v, v]))
    }

    #[test]
    fn test_resize_exact() {
        let out = resize(&solid(31, 17, 9), 700, 500);
        assert_eq!(out.dimensions(), (700, 500));
    }

    #[test]
    fn test_hconcat_places_left_first() {
        let out = hconcat(&solid(2, 3, 10), &solid(4, 3, 200)).unwrap();
        assert_eq!(out.dimensions(), (6, 3));
        assert_eq!(out.get_pixel(1, 1), &Rgb([10, 10, 10]));
        assert_eq!(out.get_pixel(2, 1), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_concat_rejects_mismatched_sizes() {
        assert!(matches!(
            hconcat(&solid(2, 3, 0), &solid(2, 4, 0)),
            Err(ComposeError::Mismatch { .. })
        ));
        assert!(vconcat(&solid(2, 3, 0), &solid(3, 3, 0)).is_err());
        assert_eq!(vconcat(&solid(2, 3, 0), &solid(2, 1, 0)).unwrap().dimensions(), (2, 4));
    }

    #[test]
    fn test_grid_shape() {
        assert_eq!(grid_shape(1), (1, 1));
        assert_eq!(grid_shape(2), (2, 1));
        assert_eq!(grid_shape(3), (2, 2));
        assert_eq!(grid_shape(4), (2, 2));
        assert_eq!(grid_shape(5), (3, 2));
        assert_eq!(grid_shape(9), (3, 3));
        assert_eq!(grid_shape(10), (4, 3));
    }

    #[test]
    fn test_tile_bounds() {
        assert_eq!(tile(&[]), Err(ComposeError::Empty));
        let many: Vec<_> = (0..11).map(|_| solid(2, 2, 0)).collect();
        assert_eq!(tile(&many), Err(ComposeError::TooMany(11)));
    }

    #[test]
    fn test_tile_layout() {
        let imgs: Vec<_> = (0..3).map(|i| solid(5, 5, 50 * (i + 1))).collect();
        let out = tile(&imgs).unwrap();
        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(out.get_pixel(0, 0), &Rgb([50, 50, 50]));
        assert_eq!(out.get_pixel(5, 0), &Rgb([100, 100, 100]));
        assert_eq!(out.get_pixel(0, 5), &Rgb([150, 150, 150]));
        // fourth cell is padding
        assert_eq!(out.get_pixel(9, 9), &Rgb([0, 0, 0]));
    }
}
