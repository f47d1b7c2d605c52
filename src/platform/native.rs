use crate::capture::{CameraDevice, Resolution};
use crate::errors::{Result, RigError};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
    CallbackCamera,
};

const STREAM_QUALITY: u8 = 85;
const STILL_QUALITY: u8 = 95;

/// A camera known to the OS backend.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub index: String,
    pub name: String,
    pub description: String,
}

/// List the cameras the native backend can open.
pub fn list_cameras() -> Result<Vec<CameraInfo>> {
    let cameras = query(ApiBackend::Auto)
        .map_err(|e| RigError::Camera(format!("Failed to query cameras: {}", e)))?;

    Ok(cameras
        .into_iter()
        .map(|info| CameraInfo {
            index: info.index().to_string(),
            name: info.human_name(),
            description: info.description().to_string(),
        })
        .collect())
}

/// The rig camera through nokhwa.
///
/// The sensor mode can only be chosen when the device is opened, so
/// [`CameraDevice::configure`] reopens the camera at the new resolution.
/// Frames are re-encoded as JPEG.
pub struct NokhwaCamera {
    index: u32,
    fps: u32,
    camera: Option<CallbackCamera>,
    resolution: Option<Resolution>,
}

impl NokhwaCamera {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            fps: 30,
            camera: None,
            resolution: None,
        }
    }

    fn close(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                log::warn!("Failed to stop camera {}: {}", self.index, e);
            }
        }
    }

    fn grab(&mut self, quality: u8) -> Result<Vec<u8>> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| RigError::Camera("camera not configured".to_string()))?;

        let frame = camera
            .poll_frame()
            .map_err(|e| RigError::Camera(format!("Failed to capture frame: {}", e)))?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| RigError::Camera(format!("Failed to decode frame: {}", e)))?;

        let (width, height) = (decoded.width(), decoded.height());
        let rgb = RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| RigError::Camera("frame buffer size mismatch".to_string()))?;

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(&rgb)?;
        Ok(jpeg)
    }
}

impl CameraDevice for NokhwaCamera {
    fn configure(&mut self, resolution: Resolution) -> Result<()> {
        if self.resolution == Some(resolution) && self.camera.is_some() {
            return Ok(());
        }
        self.close();

        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            nokhwa::utils::CameraFormat::new(
                nokhwa::utils::Resolution::new(resolution.width, resolution.height),
                FrameFormat::MJPEG,
                self.fps,
            ),
        ));
        let mut camera = CallbackCamera::new(CameraIndex::Index(self.index), requested, |_| {})
            .map_err(|e| RigError::Camera(format!("Failed to initialize camera: {}", e)))?;
        camera
            .open_stream()
            .map_err(|e| RigError::Camera(format!("Failed to start stream: {}", e)))?;

        log::info!("Camera {} opened at {}", self.index, resolution);
        self.camera = Some(camera);
        self.resolution = Some(resolution);
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<Vec<u8>> {
        self.grab(STREAM_QUALITY)
    }

    fn capture_still(&mut self) -> Result<Vec<u8>> {
        self.grab(STILL_QUALITY)
    }
}

impl Drop for NokhwaCamera {
    fn drop(&mut self) {
        self.close();
    }
}
