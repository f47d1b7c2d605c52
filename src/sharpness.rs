//! Focus metric: variance of the Laplacian of the luma plane.
//!
//! In-focus detail produces strong second derivatives, so the response
//! spreads wide and its variance rises. Only the ordering of values matters
//! to the autofocus; absolute values depend on the scene.

use crate::capture::CaptureEngine;
use crate::errors::Result;
use image::GrayImage;

/// Something that can report the sharpness of what the camera sees now.
pub trait SharpnessProbe {
    fn sharpness(&self) -> Result<f64>;
}

impl SharpnessProbe for CaptureEngine {
    fn sharpness(&self) -> Result<f64> {
        let frame = self.get_frame()?;
        let value = laplacian_variance(&frame.data)?;
        log::debug!("Frame {} sharpness {:.3}", frame.sequence, value);
        Ok(value)
    }
}

/// Sharpness of an encoded image.
pub fn laplacian_variance(encoded: &[u8]) -> Result<f64> {
    let luma = image::load_from_memory(encoded)?.to_luma8();
    Ok(luma_laplacian_variance(&luma))
}

/// Variance of the 4-neighbour Laplacian over the interior pixels.
/// Images smaller than 3x3 have no interior and score 0.
pub fn luma_laplacian_variance(luma: &GrayImage) -> f64 {
    let (width, height) = luma.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let stride = width as usize;
    let pixels = luma.as_raw();
    let at = |x: usize, y: usize| f64::from(pixels[y * stride + x]);

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 1..height as usize - 1 {
        for x in 1..width as usize - 1 {
            let response =
                at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += response;
            sum_sq += response * response;
        }
    }

    let n = ((width - 2) as f64) * ((height - 2) as f64);
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}
