//! Configuration management for the rig
//!
//! Provides TOML loading, saving and validation for serial links, stage
//! choreography, camera resolutions, autofocus tuning, scan layout and the
//! external tool names. Every delay is expressed in milliseconds so tests can
//! zero them.

use crate::errors::{Result, RigError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub serial: SerialConfig,
    pub motion: MotionConfig,
    pub camera: CameraConfig,
    pub autofocus: AutofocusConfig,
    pub focus_stack: FocusStackConfig,
    pub scan: ScanConfig,
    pub filter: FilterConfig,
    pub tools: ToolsConfig,
    pub lens: LensConfig,
}

/// Serial link settings shared by both controllers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud_rate: u32,
    /// Read timeout on the motion controller link
    pub motion_timeout_ms: u64,
    /// Read timeout on the lighting controller link
    pub light_timeout_ms: u64,
    /// Read timeout while probing ports during discovery
    pub probe_timeout_ms: u64,
    /// Only ports whose name contains this string are probed
    pub port_filter: String,
    /// The controllers reset when a port opens; wait this long before talking
    pub motion_boot_delay_ms: u64,
    pub light_boot_delay_ms: u64,
    pub probe_boot_delay_ms: u64,
}

/// Stage envelope and fixed choreographies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub z_min: f64,
    pub z_max: f64,
    /// Relative z raise before homing
    pub home_clearance: f64,
    /// Absolute z used while swapping lenses
    pub lens_change_z: f64,
    pub travel_feedrate: f64,
    pub center: CenterConfig,
}

/// The startup centering sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CenterConfig {
    pub low_z: f64,
    pub travel_z: f64,
    pub x: f64,
    pub y: f64,
    pub work_z: f64,
    pub travel_feedrate: f64,
    pub work_feedrate: f64,
    pub settle_ms: u64,
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub device_index: u32,
    /// Streaming resolution [width, height]
    pub stream_resolution: [u32; 2],
    /// Still photo resolution [width, height]
    pub photo_resolution: [u32; 2],
    /// Stop the stream when no frame was requested for this long
    pub idle_timeout_ms: u64,
    /// Give up waiting for the first frame of a fresh stream after this long
    pub first_frame_timeout_ms: u64,
    /// Pause after a still capture before streaming may resume
    pub photo_settle_ms: u64,
}

/// Hill-climb tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutofocusConfig {
    pub coarse_steps: u32,
    /// A coarse sample beating its predecessor by more than this ends the sweep
    pub early_stop_margin: f64,
    pub fine_start_step: f64,
    pub coarse_feedrate: f64,
    pub coarse_settle_ms: u64,
    pub fine_settle_ms: u64,
    pub undo_settle_ms: u64,
    pub park_settle_ms: u64,
}

/// Focus bracket capture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusStackConfig {
    /// Total samples; half above and half below the focus plane
    pub samples: u32,
    /// z distance between neighbouring samples
    pub step: f64,
    pub settle_ms: u64,
    /// Root for standalone focus stack sessions
    pub root: PathBuf,
    /// Sessions kept on disk before the oldest are purged
    pub retention: usize,
}

/// Tile scan layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub root: PathBuf,
    /// Sessions kept on disk before the oldest are purged
    pub retention: usize,
    pub feedrate: f64,
    pub step_per_fov: f64,
    /// Pause between focusing a tile and capturing it
    pub tile_settle_ms: u64,
    /// Pause after moving to the next row
    pub row_settle_ms: u64,
    /// Focus samples per tile when focus stacking
    pub stack_samples: u32,
}

/// Flat-field colour correction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// The background is shot this far below the focus plane
    pub background_offset: f64,
    pub settle_ms: u64,
    /// JPEG quality of the corrected photo
    pub jpeg_quality: u8,
}

/// External executables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub focus_stack: PathBuf,
    pub stitch: PathBuf,
    pub stitch_finalize: PathBuf,
}

/// Lens catalog location and default lens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LensConfig {
    pub catalog: PathBuf,
    pub default_lens: String,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            motion_timeout_ms: 8000,
            light_timeout_ms: 2000,
            probe_timeout_ms: 2000,
            port_filter: "ttyUSB".to_string(),
            motion_boot_delay_ms: 4000,
            light_boot_delay_ms: 5000,
            probe_boot_delay_ms: 2000,
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            z_min: 0.0,
            z_max: 100.0,
            home_clearance: 20.0,
            lens_change_z: 20.0,
            travel_feedrate: 3000.0,
            center: CenterConfig::default(),
        }
    }
}

impl Default for CenterConfig {
    fn default() -> Self {
        Self {
            low_z: 3.0,
            travel_z: 20.0,
            x: 69.0,
            y: 104.0,
            work_z: 3.2,
            travel_feedrate: 3000.0,
            work_feedrate: 1000.0,
            settle_ms: 10_000,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            stream_resolution: [1640, 1232],
            photo_resolution: [4056, 3040],
            idle_timeout_ms: 10_000,
            first_frame_timeout_ms: 5000,
            photo_settle_ms: 200,
        }
    }
}

impl Default for AutofocusConfig {
    fn default() -> Self {
        Self {
            coarse_steps: 20,
            early_stop_margin: 3.0,
            fine_start_step: 0.025,
            coarse_feedrate: 100.0,
            coarse_settle_ms: 1000,
            fine_settle_ms: 1500,
            undo_settle_ms: 500,
            park_settle_ms: 2000,
        }
    }
}

impl Default for FocusStackConfig {
    fn default() -> Self {
        Self {
            samples: 3,
            step: 0.02,
            settle_ms: 1000,
            root: PathBuf::from("./tmp/fs"),
            retention: 10,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./tmp/stitch"),
            retention: 10,
            feedrate: 100.0,
            step_per_fov: 0.8,
            tile_settle_ms: 3000,
            row_settle_ms: 1000,
            stack_samples: 3,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            background_offset: 0.7,
            settle_ms: 500,
            jpeg_quality: 95,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            focus_stack: PathBuf::from("focus-stack"),
            stitch: PathBuf::from("xy-stitch"),
            stitch_finalize: PathBuf::from("xy-ts"),
        }
    }
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            catalog: PathBuf::from("./config/lens.json"),
            default_lens: "20".to_string(),
        }
    }
}

pub(crate) fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Sleep for a configured settle delay; zero skips the syscall.
pub(crate) fn settle(ms: u64) {
    if ms > 0 {
        std::thread::sleep(millis(ms));
    }
}

impl RigConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;

        let config: RigConfig = toml::from_str(&contents)
            .map_err(|e| RigError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| RigError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("stagecam.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(RigError::Config(msg.to_string()));

        if self.serial.baud_rate == 0 {
            return fail("Baud rate must be positive");
        }
        if self.serial.motion_timeout_ms == 0 || self.serial.light_timeout_ms == 0 {
            return fail("Serial timeouts must be positive");
        }

        if self.motion.z_min >= self.motion.z_max {
            return fail("z_min must be below z_max");
        }
        let z_range = self.motion.z_min..=self.motion.z_max;
        if !z_range.contains(&self.motion.lens_change_z)
            || !z_range.contains(&self.motion.center.work_z)
            || !z_range.contains(&self.motion.center.travel_z)
            || !z_range.contains(&self.motion.center.low_z)
        {
            return fail("Choreography z positions must lie inside the safe envelope");
        }

        for res in [self.camera.stream_resolution, self.camera.photo_resolution] {
            if res[0] == 0 || res[1] == 0 {
                return fail("Invalid camera resolution");
            }
        }
        if self.camera.idle_timeout_ms == 0 {
            return fail("Idle timeout must be positive");
        }

        if self.autofocus.coarse_steps == 0 {
            return fail("Coarse search needs at least one step");
        }
        if self.autofocus.fine_start_step <= 0.0 {
            return fail("Fine search step must be positive");
        }

        if self.focus_stack.samples == 0 || self.focus_stack.step <= 0.0 {
            return fail("Focus stack needs at least one sample and a positive step");
        }

        if self.scan.retention == 0 || self.focus_stack.retention == 0 {
            return fail("Session retention must keep at least one session");
        }
        if self.scan.step_per_fov <= 0.0 {
            return fail("Scan step per field of view must be positive");
        }
        if self.scan.stack_samples == 0 {
            return fail("Scan focus stack needs at least one sample");
        }

        if self.filter.background_offset <= 0.0 {
            return fail("Background offset must be positive");
        }
        if !(1..=100).contains(&self.filter.jpeg_quality) {
            return fail("JPEG quality must be between 1 and 100");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RigConfig::default();
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.motion_timeout_ms, 8000);
        assert_eq!(config.camera.idle_timeout_ms, 10_000);
        assert_eq!(config.autofocus.coarse_steps, 20);
        assert_eq!(config.scan.retention, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut bad = RigConfig::default();
        bad.motion.z_min = 50.0;
        bad.motion.z_max = 10.0;
        assert!(bad.validate().is_err());

        let mut bad = RigConfig::default();
        bad.camera.photo_resolution = [0, 3040];
        assert!(bad.validate().is_err());

        let mut bad = RigConfig::default();
        bad.motion.center.work_z = 150.0;
        assert!(bad.validate().is_err());

        let mut bad = RigConfig::default();
        bad.filter.jpeg_quality = 0;
        assert!(bad.validate().is_err());

        let mut bad = RigConfig::default();
        bad.scan.retention = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nested").join("stagecam.toml");

        let mut config = RigConfig::default();
        config.autofocus.coarse_steps = 12;
        config.lens.default_lens = "10".to_string();
        config.save_to_file(&config_path).unwrap();

        let loaded = RigConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.autofocus.coarse_steps, 12);
        assert_eq!(loaded.lens.default_lens, "10");
        assert_eq!(loaded.camera.stream_resolution, [1640, 1232]);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("partial.toml");
        fs::write(&config_path, "[scan]\nretention = 4\n").unwrap();

        let loaded = RigConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.scan.retention, 4);
        assert_eq!(loaded.scan.feedrate, 100.0);
        assert_eq!(loaded.serial.port_filter, "ttyUSB");
    }

    #[test]
    fn test_config_toml_format() {
        let toml_string = toml::to_string_pretty(&RigConfig::default()).unwrap();
        assert!(toml_string.contains("[serial]"));
        assert!(toml_string.contains("[motion.center]"));
        assert!(toml_string.contains("[autofocus]"));
        assert!(toml_string.contains("[tools]"));
        assert!(toml_string.contains("idle_timeout_ms"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = RigConfig::load_from_file("nonexistent_file.toml");
        assert_eq!(result.unwrap().scan.retention, 10);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("broken.toml");
        fs::write(&config_path, "[scan\nretention = ").unwrap();
        assert!(matches!(
            RigConfig::load_from_file(&config_path),
            Err(RigError::Config(_))
        ));
    }
}
