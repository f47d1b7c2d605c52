use super::links::SimulatedPrinter;
use super::synthetic_data::{encode_jpeg, synthetic_frame};
use crate::capture::{CameraDevice, Resolution};
use crate::errors::{Result, RigError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

const PEAK_CONTRAST: f64 = 200.0;

#[derive(Debug, Default)]
struct CameraStats {
    configured: Vec<Resolution>,
    frames: u64,
    stills: u64,
    still_z: Vec<f64>,
    fail_frames: bool,
}

/// Camera producing JPEG checkerboards.
///
/// Attached to a [`SimulatedPrinter`] with [`SyntheticCamera::tracking`] it
/// records the stage height of every still, and with
/// [`SyntheticCamera::focused_at`] the image contrast falls off with the
/// distance from the focal plane.
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    frame_delay: Duration,
    printer: Option<SimulatedPrinter>,
    focal_plane: Option<f64>,
    stats: Arc<Mutex<CameraStats>>,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_delay: Duration::from_millis(2),
            printer: None,
            focal_plane: None,
            stats: Arc::new(Mutex::new(CameraStats::default())),
        }
    }

    pub fn tracking(mut self, printer: &SimulatedPrinter) -> Self {
        self.printer = Some(printer.clone());
        self
    }

    pub fn focused_at(mut self, z: f64) -> Self {
        self.focal_plane = Some(z);
        self
    }

    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    /// Make every streamed frame fail until switched back.
    pub fn fail_frames(&self, fail: bool) {
        self.stats().fail_frames = fail;
    }

    pub fn frames_captured(&self) -> u64 {
        self.stats().frames
    }

    pub fn stills_captured(&self) -> u64 {
        self.stats().stills
    }

    /// Stage z at each still; NaN when no printer is tracked.
    pub fn still_positions(&self) -> Vec<f64> {
        self.stats().still_z.clone()
    }

    pub fn configured(&self) -> Vec<Resolution> {
        self.stats().configured.clone()
    }

    fn stats(&self) -> MutexGuard<'_, CameraStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stage_z(&self) -> f64 {
        self.printer
            .as_ref()
            .map_or(f64::NAN, |printer| printer.position().z)
    }

    fn contrast(&self) -> u8 {
        match self.focal_plane {
            Some(plane) if self.printer.is_some() => {
                let distance = (self.stage_z() - plane).abs();
                (PEAK_CONTRAST / (1.0 + 20.0 * distance)).round() as u8
            }
            _ => PEAK_CONTRAST as u8,
        }
    }

    fn render(&self, sequence: u64) -> Result<Vec<u8>> {
        encode_jpeg(
            &synthetic_frame(self.width, self.height, sequence, self.contrast()),
            90,
        )
    }
}

impl CameraDevice for SyntheticCamera {
    fn configure(&mut self, resolution: Resolution) -> Result<()> {
        self.stats().configured.push(resolution);
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<Vec<u8>> {
        thread::sleep(self.frame_delay);
        let sequence = {
            let mut stats = self.stats();
            if stats.fail_frames {
                return Err(RigError::Camera("synthetic frame failure".to_string()));
            }
            stats.frames += 1;
            stats.frames
        };
        self.render(sequence)
    }

    fn capture_still(&mut self) -> Result<Vec<u8>> {
        let z = self.stage_z();
        {
            let mut stats = self.stats();
            stats.stills += 1;
            stats.still_z.push(z);
        }
        self.render(0)
    }
}
