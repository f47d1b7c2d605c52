//! Camera capture: the device seam and the streaming/still engine.

pub mod engine;

pub use engine::CaptureEngine;

use crate::errors::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<[u32; 2]> for Resolution {
    fn from(value: [u32; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A camera the engine can drive.
///
/// Implementations return *encoded* images (JPEG or PNG). The engine moves
/// the device between its own thread and the streaming thread, so only one
/// thread ever talks to it at a time.
pub trait CameraDevice: Send {
    /// Switch the sensor mode. Called before streaming and before stills.
    fn configure(&mut self, resolution: Resolution) -> Result<()>;

    /// Grab the next preview frame.
    fn capture_frame(&mut self) -> Result<Vec<u8>>;

    /// Take a full-quality still at the configured resolution.
    fn capture_still(&mut self) -> Result<Vec<u8>>;
}

/// A streamed frame. Each call to [`CaptureEngine::get_frame`] returns its
/// own copy.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub resolution: Resolution,
    /// Encoded image bytes as delivered by the camera
    pub data: Vec<u8>,
}

impl Frame {
    pub fn decode(&self) -> Result<image::DynamicImage> {
        Ok(image::load_from_memory(&self.data)?)
    }
}

/// Lifecycle of the streaming thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamState {
    Idle,
    Starting,
    Streaming,
    Stopping,
}
