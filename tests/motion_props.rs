//! Property-Based Tests for the motion stage
//!
//! Run with: cargo test --test motion_props

use proptest::prelude::*;
use stagecam::config::MotionConfig;
use stagecam::testing::{test_lens, SimulatedPrinter};
use stagecam::{DeviceRegistry, MotionMode, MotionState, MoveOutcome};

fn stage() -> (DeviceRegistry, SimulatedPrinter, MotionState) {
    let registry = DeviceRegistry::new();
    let printer = SimulatedPrinter::new();
    let motion = MotionState::new(
        &registry,
        Box::new(printer.clone()),
        test_lens(),
        MotionConfig::default(),
    )
    .unwrap();
    (registry, printer, motion)
}

fn unsafe_z() -> impl Strategy<Value = f64> {
    prop_oneof![-1000.0f64..-1e-6, 100.000_001f64..1000.0]
}

// ═══════════════════════════════════════════════════════════════════════════
// SAFE ENVELOPE
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: an absolute z target outside [0, 100] is rejected without
    /// any command reaching the controller
    #[test]
    fn unsafe_absolute_z_is_never_sent(start in 0.0f64..=100.0, target in unsafe_z()) {
        let (_r, printer, mut motion) = stage();
        motion.set_z(start).unwrap().require().unwrap();
        printer.clear_sent();

        let outcome = motion.set_z(target).unwrap();
        prop_assert!(!outcome.is_moved());
        let is_unsafe = matches!(outcome, MoveOutcome::UnsafeMove { .. });
        prop_assert!(is_unsafe);
        prop_assert!(printer.sent().is_empty());
        prop_assert_eq!(motion.z(), start);
        prop_assert_eq!(printer.position().z, start);
    }

    /// INVARIANT: a relative move that would leave the envelope is rejected
    #[test]
    fn unsafe_relative_z_is_never_sent(start in 0.0f64..=100.0, delta in -300.0f64..300.0) {
        let (_r, printer, mut motion) = stage();
        motion.set_z(start).unwrap().require().unwrap();

        let outcome = motion.move_z(delta).unwrap();
        let target = start + delta;
        if (0.0..=100.0).contains(&target) {
            prop_assert!(outcome.is_moved());
            prop_assert!((printer.position().z - target).abs() < 1e-9);
        } else {
            prop_assert!(!outcome.is_moved());
            prop_assert_eq!(printer.position().z, start);
        }
        prop_assert!((motion.z() - printer.position().z).abs() < 1e-9);
    }

    /// INVARIANT: x and y are not limited by the z envelope
    #[test]
    fn xy_moves_always_reach_the_controller(x in -50.0f64..250.0) {
        let (_r, printer, mut motion) = stage();
        prop_assert!(motion.set_axis(stagecam::Axis::X, x).unwrap().is_moved());
        prop_assert_eq!(printer.position().x, x);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// POSITIONING MODE
// ═══════════════════════════════════════════════════════════════════════════

fn mode() -> impl Strategy<Value = MotionMode> {
    prop_oneof![Just(MotionMode::Absolute), Just(MotionMode::Relative)]
}

proptest! {
    /// INVARIANT: one mode command per actual transition, none for repeats
    #[test]
    fn mode_switches_only_on_change(modes in prop::collection::vec(mode(), 1..20)) {
        let (_r, printer, mut motion) = stage();

        let mut current = MotionMode::Absolute;
        let mut transitions = 0;
        for m in &modes {
            motion.ensure_mode(*m).unwrap();
            if *m != current {
                transitions += 1;
                current = *m;
            }
        }

        prop_assert_eq!(printer.sent().len(), transitions);
        prop_assert_eq!(motion.mode(), current);
        prop_assert_eq!(printer.mode(), current);
    }
}

#[test]
fn same_mode_twice_sends_one_command() {
    let (_r, printer, mut motion) = stage();
    motion.ensure_mode(MotionMode::Relative).unwrap();
    motion.ensure_mode(MotionMode::Relative).unwrap();
    assert_eq!(printer.sent(), vec!["G91"]);
}

#[test]
fn halted_controller_leaves_mirror_untouched() {
    let (_r, printer, mut motion) = stage();
    motion.set_z(5.0).unwrap().require().unwrap();
    printer.halt_on("G1 Z9");

    let err = motion.set_z(9.0).unwrap_err();
    assert!(matches!(err, stagecam::RigError::ControllerHalted(_)));
    assert_eq!(motion.z(), 5.0);
}
