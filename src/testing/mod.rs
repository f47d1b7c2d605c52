//! Testing utilities for stagecam
//!
//! Simulated controllers, a synthetic camera and fake external tools, so the
//! whole rig can be exercised offline without hardware.

pub mod camera;
pub mod fakes;
pub mod links;
pub mod synthetic_data;

pub use camera::SyntheticCamera;
pub use fakes::{CopyMerger, FnProbe, RecordingStitcher, StitchCall};
pub use links::{ScriptedLink, SimulatedPrinter};

use crate::config::RigConfig;
use crate::lens::LensProfile;

/// Default configuration with every settle and boot delay zeroed.
pub fn fast_config() -> RigConfig {
    let mut config = RigConfig::default();

    config.serial.motion_boot_delay_ms = 0;
    config.serial.light_boot_delay_ms = 0;
    config.serial.probe_boot_delay_ms = 0;
    config.motion.center.settle_ms = 0;

    config.camera.idle_timeout_ms = 2000;
    config.camera.first_frame_timeout_ms = 2000;
    config.camera.photo_settle_ms = 0;

    config.autofocus.coarse_settle_ms = 0;
    config.autofocus.fine_settle_ms = 0;
    config.autofocus.undo_settle_ms = 0;
    config.autofocus.park_settle_ms = 0;

    config.focus_stack.settle_ms = 0;
    config.scan.tile_settle_ms = 0;
    config.scan.row_settle_ms = 0;
    config.filter.settle_ms = 0;
    config
}

/// The 20x objective from the stock catalog.
pub fn test_lens() -> LensProfile {
    LensProfile {
        id: "20".to_string(),
        init_pos: 3.0,
        step_stitch: 0.4,
        step_focus: 0.05,
        magnification: 20.0,
    }
}
