//! Motion stage control over the G-code link.
//!
//! [`MotionState`] mirrors what the controller has acknowledged: the axis
//! position, the positioning mode and the feedrate. Every mirror update happens
//! after the controller answered `ok`, so after an error the mirror still shows
//! the last confirmed state.

pub mod types;

pub use types::{Axis, AxisPosition, MotionMode, MoveOutcome};

use crate::config::{settle, MotionConfig};
use crate::errors::{Result, RigError};
use crate::lens::LensProfile;
use crate::registry::{DeviceKind, DeviceRegistry, DeviceToken};
use crate::serial::SerialLink;

pub struct MotionState {
    link: Box<dyn SerialLink>,
    _token: DeviceToken,
    position: AxisPosition,
    focus_z: f64,
    feedrate: Option<f64>,
    mode: MotionMode,
    lens: LensProfile,
    config: MotionConfig,
}

impl MotionState {
    /// Take ownership of the motion controller link.
    ///
    /// Nothing is sent yet; call [`MotionState::initialize`] to home and
    /// center the stage.
    pub fn new(
        registry: &DeviceRegistry,
        link: Box<dyn SerialLink>,
        lens: LensProfile,
        config: MotionConfig,
    ) -> Result<Self> {
        let token = registry.claim(DeviceKind::Motion)?;
        log::info!("Motion controller on {} with lens {}", link.name(), lens.id);
        Ok(Self {
            link,
            _token: token,
            position: AxisPosition::default(),
            focus_z: lens.init_pos,
            feedrate: None,
            mode: MotionMode::Absolute,
            lens,
            config,
        })
    }

    /// Wait for the controller to boot, then home and center the stage.
    pub fn initialize(&mut self, boot_delay_ms: u64) -> Result<()> {
        log::info!("Waiting {} ms for the motion controller to boot", boot_delay_ms);
        settle(boot_delay_ms);
        self.home()?;
        self.center()
    }

    pub fn is_safe(&self, z: f64) -> bool {
        z.is_finite() && z >= self.config.z_min && z <= self.config.z_max
    }

    /// Raise z by the home clearance, then home all axes.
    pub fn home(&mut self) -> Result<()> {
        let clearance = self.config.home_clearance;
        if let MoveOutcome::UnsafeMove { requested, .. } = self.move_z(clearance)? {
            log::warn!("Homing without z clearance raise (would reach {})", requested);
        }
        self.link.send("G28")?;
        self.position = AxisPosition::default();
        log::info!("Stage homed");
        Ok(())
    }

    /// Startup choreography: lift, travel to the stage center, drop to the
    /// working height and wait for the stage to settle.
    pub fn center(&mut self) -> Result<()> {
        let center = self.config.center.clone();
        self.set_z(center.low_z)?.require()?;
        self.set_feedrate(center.travel_feedrate)?;
        self.set_z(center.travel_z)?.require()?;
        self.set_axis(Axis::Y, center.y)?.require()?;
        self.set_axis(Axis::X, center.x)?.require()?;
        self.set_z(center.work_z)?.require()?;
        self.set_feedrate(center.work_feedrate)?;
        settle(center.settle_ms);
        log::info!("Stage centered at {}", self.position);
        Ok(())
    }

    pub fn ensure_mode(&mut self, mode: MotionMode) -> Result<()> {
        if self.mode != mode {
            self.link.send(mode.command())?;
            self.mode = mode;
            log::debug!("Positioning mode now {:?}", mode);
        }
        Ok(())
    }

    /// Absolute move of one axis.
    pub fn set_axis(&mut self, axis: Axis, target: f64) -> Result<MoveOutcome> {
        if axis == Axis::Z && !self.is_safe(target) {
            return Ok(self.reject(axis, target));
        }
        self.ensure_mode(MotionMode::Absolute)?;
        self.link.send(&format!("G1 {}{}", axis.letter(), target))?;
        self.position.set(axis, target);
        Ok(MoveOutcome::Moved)
    }

    /// Relative move of one axis.
    pub fn move_axis(&mut self, axis: Axis, delta: f64) -> Result<MoveOutcome> {
        let target = self.position.get(axis) + delta;
        if axis == Axis::Z && !self.is_safe(target) {
            return Ok(self.reject(axis, target));
        }
        self.ensure_mode(MotionMode::Relative)?;
        self.link.send(&format!("G0 {}{}", axis.letter(), delta))?;
        self.position.set(axis, target);
        Ok(MoveOutcome::Moved)
    }

    pub fn set_z(&mut self, z: f64) -> Result<MoveOutcome> {
        self.set_axis(Axis::Z, z)
    }

    pub fn move_z(&mut self, dz: f64) -> Result<MoveOutcome> {
        self.move_axis(Axis::Z, dz)
    }

    fn reject(&self, axis: Axis, requested: f64) -> MoveOutcome {
        log::warn!(
            "Unsafe move rejected: {} to {} outside [{}, {}]",
            axis,
            requested,
            self.config.z_min,
            self.config.z_max
        );
        MoveOutcome::UnsafeMove { axis, requested }
    }

    pub fn set_feedrate(&mut self, rate: f64) -> Result<()> {
        self.link.send(&format!("G0 F{}", rate))?;
        self.feedrate = Some(rate);
        Ok(())
    }

    /// Lift the stage to the lens-change height and switch to `profile`.
    ///
    /// The caller swaps the physical lens, then refocuses or calls
    /// [`MotionState::restore_focus`].
    pub fn change_lens(&mut self, profile: LensProfile) -> Result<()> {
        let previous = self.feedrate;
        self.set_feedrate(self.config.travel_feedrate)?;
        self.set_z(self.config.lens_change_z)?.require()?;
        log::info!("Lens {} -> {}", self.lens.id, profile.id);
        self.lens = profile;
        if let Some(rate) = previous {
            self.set_feedrate(rate)?;
        }
        Ok(())
    }

    /// Return z to the last autofocus solution.
    pub fn restore_focus(&mut self) -> Result<MoveOutcome> {
        self.set_z(self.focus_z)
    }

    pub fn set_focus_z(&mut self, z: f64) -> Result<()> {
        if !self.is_safe(z) {
            return Err(RigError::InvalidArgument(format!(
                "focus z {} outside the safe envelope",
                z
            )));
        }
        self.focus_z = z;
        Ok(())
    }

    /// Show `text` on the controller's display.
    pub fn display(&mut self, text: &str) -> Result<()> {
        self.link.send(&format!("M117 {}", text))?;
        Ok(())
    }

    pub fn position(&self) -> AxisPosition {
        self.position
    }

    pub fn z(&self) -> f64 {
        self.position.z
    }

    pub fn focus_z(&self) -> f64 {
        self.focus_z
    }

    /// Last acknowledged feedrate; `None` until one was set.
    pub fn feedrate(&self) -> Option<f64> {
        self.feedrate
    }

    pub fn mode(&self) -> MotionMode {
        self.mode
    }

    pub fn lens(&self) -> &LensProfile {
        &self.lens
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn port_name(&self) -> &str {
        self.link.name()
    }
}
