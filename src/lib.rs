//! stagecam: control software for a serial-driven macro photography rig
//!
//! A camera looks down on a three-axis stage driven by a G-code motion
//! controller, with a second serial controller for the lights. This crate
//! coordinates the stage with the camera.
//!
//! # Features
//! - Safe, acknowledged G-code motion with a mirrored stage position
//! - Ring and bottom light control
//! - Live stream with idle shutdown and exclusive still capture
//! - Two-phase hill-climb autofocus on a Laplacian sharpness metric
//! - Focus stacking through an external merge tool
//! - Tiled scans with per-tile focus stacking and stitching
//! - Flat-field colour correction against a defocused background
//!
//! # Usage
//! ```rust,ignore
//! use stagecam::{Rig, RigConfig};
//!
//! fn main() -> stagecam::Result<()> {
//!     stagecam::init_logging();
//!     let mut rig = Rig::connect(RigConfig::load_or_default(), "20")?;
//!     let report = rig.autofocus()?;
//!     println!("in focus at z={}", report.fine.z);
//!     Ok(())
//! }
//! ```
pub mod autofocus;
pub mod capture;
pub mod config;
pub mod errors;
pub mod filter;
pub mod focus_stack;
pub mod lens;
pub mod light;
pub mod motion;
pub mod platform;
pub mod registry;
pub mod rig;
pub mod scan;
pub mod serial;
pub mod sharpness;
pub mod tools;

// Testing utilities - simulated devices for offline testing
pub mod testing;

// Re-exports for convenience
pub use autofocus::{AutofocusEngine, AutofocusReport, FocusSample};
pub use capture::{CameraDevice, CaptureEngine, Frame, Resolution, StreamState};
pub use config::RigConfig;
pub use errors::{Result, RigError};
pub use focus_stack::{FocusMerger, FocusStackResult, FocusStackTool, FocusStacker};
pub use lens::{LensCatalog, LensProfile};
pub use light::{LightState, Rgbw};
pub use motion::{Axis, AxisPosition, MotionMode, MotionState, MoveOutcome};
pub use registry::{DeviceKind, DeviceRegistry};
pub use rig::Rig;
pub use scan::{ScanOrchestrator, ScanOutcome, ScanPattern, ScanRequest, TileStitcher, XyStitchTool};
pub use serial::{PortLink, SerialLink};
pub use sharpness::SharpnessProbe;

/// Initialize logging for the rig
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "stagecam=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        native_camera: cfg!(feature = "native-camera"),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub native_camera: bool,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "stagecam");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }
}
