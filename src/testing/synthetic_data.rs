//! Generated images standing in for microscope frames
//!
//! A checkerboard is the simplest target whose Laplacian variance grows with
//! contrast, so lowering the contrast is enough to simulate defocus.

use crate::errors::Result;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use std::io::Cursor;

/// Grey checkerboard with cells of `cell` pixels, centred on mid grey.
pub fn checkerboard(width: u32, height: u32, cell: u32, contrast: u8) -> GrayImage {
    let cell = cell.max(1);
    let (low, high) = levels(contrast);
    GrayImage::from_fn(width, height, |x, y| {
        if ((x / cell) + (y / cell)) % 2 == 0 {
            Luma([low])
        } else {
            Luma([high])
        }
    })
}

/// Colour frame for the synthetic camera. `frame_number` shifts the pattern
/// so consecutive frames differ.
pub fn synthetic_frame(width: u32, height: u32, frame_number: u64, contrast: u8) -> RgbImage {
    let (low, high) = levels(contrast);
    let shift = (frame_number % 4) as u32;
    RgbImage::from_fn(width, height, |x, y| {
        let v = if (((x + shift) / 4) + (y / 4)) % 2 == 0 {
            low
        } else {
            high
        };
        Rgb([v, v, v.saturating_add((x % 8) as u8)])
    })
}

fn levels(contrast: u8) -> (u8, u8) {
    let half = contrast / 2;
    (128 - half.min(128), 128u8.saturating_add(half))
}

pub fn encode_png(image: &GrayImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
    Ok(buffer)
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(image)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkerboard_levels() {
        let board = checkerboard(4, 4, 2, 100);
        assert_eq!(board.get_pixel(0, 0)[0], 78);
        assert_eq!(board.get_pixel(2, 0)[0], 178);
        assert_eq!(board.get_pixel(2, 2)[0], 78);
    }

    #[test]
    fn test_frames_differ() {
        assert_ne!(synthetic_frame(16, 16, 0, 100), synthetic_frame(16, 16, 1, 100));
    }

    #[test]
    fn test_jpeg_decodes() {
        let bytes = encode_jpeg(&synthetic_frame(16, 8, 0, 100), 90).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }
}
