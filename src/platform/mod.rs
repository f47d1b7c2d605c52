//! Native camera backend.
//!
//! Only compiled with the `native-camera` feature; without it the capture
//! engine runs against any other [`crate::capture::CameraDevice`].

#[cfg(feature = "native-camera")]
pub mod native;

#[cfg(feature = "native-camera")]
pub use native::{list_cameras, CameraInfo, NokhwaCamera};
