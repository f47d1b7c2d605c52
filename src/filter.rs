//! Flat-field colour correction
//!
//! A defocused shot of the field just below the sample records the uneven
//! illumination and the colour cast of the optics. Dividing the photo by that
//! background and stretching the quotient back over 0..=255 evens both out.

use crate::autofocus::AutofocusEngine;
use crate::capture::CaptureEngine;
use crate::config::{settle, RigConfig};
use crate::errors::Result;
use crate::motion::MotionState;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::borrow::Cow;

/// Divide `image` by `background` per channel and min-max normalize the
/// quotient over all channels.
///
/// A background of another size is resized to match. Zero background
/// samples divide as one. A constant quotient normalizes to black.
pub fn flat_field(image: &RgbImage, background: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let background = if background.dimensions() == (width, height) {
        Cow::Borrowed(background)
    } else {
        log::debug!(
            "Resizing background {:?} to {}x{}",
            background.dimensions(),
            width,
            height
        );
        Cow::Owned(imageops::resize(background, width, height, FilterType::Triangle))
    };

    let ratios: Vec<f32> = image
        .as_raw()
        .iter()
        .zip(background.as_raw())
        .map(|(&p, &b)| f32::from(p) / f32::from(b.max(1)))
        .collect();

    let (min, max) = ratios
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &r| (lo.min(r), hi.max(r)));
    let scale = if max - min > f32::EPSILON {
        255.0 / (max - min)
    } else {
        0.0
    };

    let mut corrected = RgbImage::new(width, height);
    for (out, ratio) in corrected.iter_mut().zip(&ratios) {
        *out = ((ratio - min) * scale).round().clamp(0.0, 255.0) as u8;
    }
    corrected
}

/// Shoot the background below the focus plane, go back up, refocus, and
/// flat-field `foreground` with it.
pub fn color_correct(
    motion: &mut MotionState,
    camera: &CaptureEngine,
    config: &RigConfig,
    foreground: &RgbImage,
) -> Result<RgbImage> {
    let offset = config.filter.background_offset;
    motion.move_z(-offset)?.require()?;
    settle(config.filter.settle_ms);

    let background = camera
        .get_photo()
        .and_then(|data| Ok(image::load_from_memory(&data)?.to_rgb8()));
    let returned = motion.move_z(offset).and_then(|outcome| outcome.require());
    let background = match (background, returned) {
        (Ok(background), Ok(())) => background,
        (Err(e), returned) => {
            if let Err(r) = returned {
                log::error!("Could not return above the background: {}", r);
            }
            return Err(e);
        }
        (Ok(_), Err(e)) => return Err(e),
    };
    log::info!("Background captured {} below the focus plane", offset);

    let af = &config.autofocus;
    AutofocusEngine::new(motion, camera, af.clone()).fine_search(af.fine_start_step)?;

    Ok(flat_field(foreground, &background))
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(image)?;
    Ok(jpeg)
}
