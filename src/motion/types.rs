use crate::errors::{Result, RigError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// G-code word letter for this axis.
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Positioning mode of the motion controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionMode {
    Absolute,
    Relative,
}

impl MotionMode {
    pub fn command(self) -> &'static str {
        match self {
            MotionMode::Absolute => "G90",
            MotionMode::Relative => "G91",
        }
    }
}

impl Default for MotionMode {
    fn default() -> Self {
        MotionMode::Absolute
    }
}

/// Stage position in millimetres, as last acknowledged by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AxisPosition {
    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub(crate) fn set(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
        }
    }
}

impl fmt::Display for AxisPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{:.3} Y:{:.3} Z:{:.3}", self.x, self.y, self.z)
    }
}

/// Result of a move request that passed the protocol layer.
///
/// A rejected move is not an error: nothing was sent and the position is
/// unchanged. Callers that cannot continue without the move use
/// [`MoveOutcome::require`].
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveOutcome {
    Moved,
    UnsafeMove { axis: Axis, requested: f64 },
}

impl MoveOutcome {
    pub fn is_moved(&self) -> bool {
        matches!(self, MoveOutcome::Moved)
    }

    pub fn require(self) -> Result<()> {
        match self {
            MoveOutcome::Moved => Ok(()),
            MoveOutcome::UnsafeMove { axis, requested } => {
                Err(RigError::UnsafeMove { axis, requested })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_commands() {
        assert_eq!(MotionMode::Absolute.command(), "G90");
        assert_eq!(MotionMode::Relative.command(), "G91");
        assert_eq!(MotionMode::default(), MotionMode::Absolute);
    }

    #[test]
    fn test_require() {
        assert!(MoveOutcome::Moved.require().is_ok());
        let rejected = MoveOutcome::UnsafeMove {
            axis: Axis::Z,
            requested: -1.0,
        };
        assert!(!rejected.is_moved());
        assert!(matches!(
            rejected.require(),
            Err(RigError::UnsafeMove { axis: Axis::Z, .. })
        ));
    }

    #[test]
    fn test_position_accessors() {
        let mut pos = AxisPosition::default();
        pos.set(Axis::Y, 104.0);
        assert_eq!(pos.get(Axis::Y), 104.0);
        assert_eq!(pos.to_string(), "X:0.000 Y:104.000 Z:0.000");
    }
}
