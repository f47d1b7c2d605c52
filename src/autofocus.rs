//! Two-phase hill-climbing autofocus.
//!
//! The coarse phase sweeps z upward from the lens' start position in lens
//! focus steps and parks at the sharpest sample. The fine phase climbs from
//! wherever the stage is with a shrinking step, first upward and, if that
//! never improved, downward.

use crate::config::{settle, AutofocusConfig};
use crate::errors::{Result, RigError};
use crate::motion::{MotionState, MoveOutcome};
use crate::sharpness::SharpnessProbe;
use serde::Serialize;

/// Upper bound on accepted steps in one climbing direction.
const MAX_CLIMB_STEPS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FocusSample {
    pub z: f64,
    pub sharpness: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AutofocusReport {
    pub coarse: FocusSample,
    pub fine: FocusSample,
}

/// Best sample by sharpness; on ties the earlier sample wins.
pub fn best_sample(samples: &[FocusSample]) -> Option<FocusSample> {
    samples.iter().copied().fold(None, |best, sample| match best {
        Some(b) if sample.sharpness <= b.sharpness => Some(b),
        _ => Some(sample),
    })
}

fn round_to_hundredths(z: f64) -> f64 {
    (z * 100.0).round() / 100.0
}

pub struct AutofocusEngine<'a> {
    motion: &'a mut MotionState,
    probe: &'a dyn SharpnessProbe,
    config: AutofocusConfig,
}

impl<'a> AutofocusEngine<'a> {
    pub fn new(
        motion: &'a mut MotionState,
        probe: &'a dyn SharpnessProbe,
        config: AutofocusConfig,
    ) -> Self {
        Self {
            motion,
            probe,
            config,
        }
    }

    fn sample(&self) -> Result<FocusSample> {
        let sharpness = self.probe.sharpness()?;
        Ok(FocusSample {
            z: self.motion.z(),
            sharpness,
        })
    }

    /// Sweep `steps` lens focus steps up from the lens start position and
    /// park at the sharpest one (z rounded to 0.01).
    pub fn coarse_search(&mut self, steps: u32) -> Result<FocusSample> {
        if steps == 0 {
            return Err(RigError::InvalidArgument(
                "coarse search needs at least one step".to_string(),
            ));
        }

        let lens = self.motion.lens().clone();
        log::info!(
            "Coarse focus: {} steps of {} from z={}",
            steps,
            lens.step_focus,
            lens.init_pos
        );
        self.motion.set_z(lens.init_pos)?.require()?;
        settle(self.config.coarse_settle_ms);

        let mut samples = Vec::with_capacity(steps as usize);
        let mut previous: Option<f64> = None;
        for _ in 0..steps {
            if let MoveOutcome::UnsafeMove { requested, .. } = self.motion.move_z(lens.step_focus)? {
                log::warn!("Coarse sweep reached the envelope at z={}", requested);
                break;
            }
            settle(self.config.coarse_settle_ms);

            let sample = self.sample()?;
            log::debug!("Coarse z={:.3} sharpness={:.3}", sample.z, sample.sharpness);
            samples.push(sample);

            if previous.is_some_and(|p| sample.sharpness > p + self.config.early_stop_margin) {
                log::info!("Coarse sweep stopped early at z={:.3}", sample.z);
                break;
            }
            previous = Some(sample.sharpness);
        }

        let best = match best_sample(&samples) {
            Some(best) => best,
            None => self.sample()?,
        };
        let best = FocusSample {
            z: round_to_hundredths(best.z),
            ..best
        };

        self.motion.set_z(best.z)?.require()?;
        settle(self.config.park_settle_ms);
        log::info!("Coarse focus at z={} (sharpness {:.3})", best.z, best.sharpness);
        Ok(best)
    }

    /// Climb from the current z; the stage ends at the best z seen, which is
    /// the start position when no move improved sharpness.
    pub fn fine_search(&mut self, start_step: f64) -> Result<FocusSample> {
        if start_step.is_nan() || start_step <= 0.0 {
            return Err(RigError::InvalidArgument(format!(
                "fine search step must be positive, got {}",
                start_step
            )));
        }

        settle(self.config.fine_settle_ms);
        let baseline = self.sample()?;

        let (improved, best) = self.climb(baseline, start_step)?;
        let best = if improved {
            best
        } else {
            log::debug!("No improvement upward, climbing down");
            self.climb(best, -start_step)?.1
        };

        self.motion.set_z(best.z)?.require()?;
        log::info!(
            "Fine focus: z {:.4} -> {:.4} (sharpness {:.3} -> {:.3})",
            baseline.z,
            best.z,
            baseline.sharpness,
            best.sharpness
        );
        Ok(best)
    }

    fn climb(&mut self, mut best: FocusSample, mut step: f64) -> Result<(bool, FocusSample)> {
        let mut improved = false;

        for _ in 0..MAX_CLIMB_STEPS {
            if let MoveOutcome::UnsafeMove { requested, .. } = self.motion.move_z(step)? {
                log::warn!("Fine climb stopped at the envelope (z={})", requested);
                break;
            }
            settle(self.config.fine_settle_ms);

            let sample = self.sample()?;
            if sample.sharpness > best.sharpness {
                best = sample;
                improved = true;
                step -= step / 4.0;
                log::debug!("Fine z={:.4} improved, step now {:.5}", sample.z, step);
            } else {
                self.motion.move_z(-step)?.require()?;
                settle(self.config.undo_settle_ms);
                break;
            }
        }

        Ok((improved, best))
    }

    /// Coarse then fine search at the coarse feedrate. The fine result
    /// becomes the stage's focus plane; the previous feedrate is restored.
    pub fn auto_focus(&mut self) -> Result<AutofocusReport> {
        let previous = self.motion.feedrate();
        self.motion.set_feedrate(self.config.coarse_feedrate)?;

        let outcome = self.run_phases();
        if let Some(rate) = previous {
            let restored = self.motion.set_feedrate(rate);
            if outcome.is_ok() {
                restored?;
            }
        }

        let report = outcome?;
        self.motion.set_focus_z(report.fine.z)?;
        Ok(report)
    }

    fn run_phases(&mut self) -> Result<AutofocusReport> {
        let coarse = self.coarse_search(self.config.coarse_steps)?;
        let fine = self.fine_search(self.config.fine_start_step)?;
        Ok(AutofocusReport { coarse, fine })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MotionConfig;
    use crate::registry::DeviceRegistry;
    use crate::testing::{fast_config, test_lens, FnProbe, SimulatedPrinter};

    fn setup(printer: &SimulatedPrinter) -> (DeviceRegistry, MotionState) {
        let registry = DeviceRegistry::new();
        let motion = MotionState::new(
            &registry,
            Box::new(printer.clone()),
            test_lens(),
            MotionConfig::default(),
        )
        .unwrap();
        (registry, motion)
    }

    fn peak_at(printer: &SimulatedPrinter, peak: f64) -> FnProbe<impl Fn() -> f64> {
        let printer = printer.clone();
        FnProbe::new(move || 10.0 - 2.0 * (printer.position().z - peak).abs())
    }

    #[test]
    fn test_best_sample_first_wins_ties() {
        let samples = [
            FocusSample { z: 1.0, sharpness: 2.0 },
            FocusSample { z: 2.0, sharpness: 5.0 },
            FocusSample { z: 3.0, sharpness: 5.0 },
        ];
        assert_eq!(best_sample(&samples).unwrap().z, 2.0);
        assert!(best_sample(&[]).is_none());
    }

    #[test]
    fn test_coarse_then_fine_converges() {
        let printer = SimulatedPrinter::new();
        let (_r, mut motion) = setup(&printer);
        let probe = peak_at(&printer, 3.52);

        let mut af = AutofocusEngine::new(&mut motion, &probe, fast_config().autofocus);
        let coarse = af.coarse_search(20).unwrap();
        assert_eq!(coarse.z, 3.5);

        let fine = af.fine_search(0.025).unwrap();
        assert!((fine.z - 3.52).abs() <= 0.025);
        assert!((motion.z() - fine.z).abs() < 1e-9);
    }

    #[test]
    fn test_coarse_stops_early_on_jump() {
        let printer = SimulatedPrinter::new();
        let (_r, mut motion) = setup(&printer);
        let sim = printer.clone();
        let probe = FnProbe::new(move || if sim.position().z > 3.22 { 50.0 } else { 1.0 });

        let mut af = AutofocusEngine::new(&mut motion, &probe, fast_config().autofocus);
        let best = af.coarse_search(20).unwrap();
        assert_eq!(best.z, 3.25);
        let steps = printer.sent().iter().filter(|c| *c == "G0 Z0.05").count();
        assert_eq!(steps, 5);
    }

    #[test]
    fn test_fine_falls_back_downward() {
        let printer = SimulatedPrinter::new();
        let (_r, mut motion) = setup(&printer);
        motion.set_z(3.6).unwrap().require().unwrap();
        let probe = peak_at(&printer, 3.52);

        let mut af = AutofocusEngine::new(&mut motion, &probe, fast_config().autofocus);
        let best = af.fine_search(0.025).unwrap();
        assert!(best.z < 3.6);
        assert!((best.z - 3.52).abs() <= 0.025);
        assert!(printer.sent().iter().any(|c| c == "G0 Z-0.025"));
    }

    #[test]
    fn test_fine_restores_start_without_improvement() {
        let printer = SimulatedPrinter::new();
        let (_r, mut motion) = setup(&printer);
        motion.set_z(3.0).unwrap().require().unwrap();
        let probe = peak_at(&printer, 3.0);

        let mut af = AutofocusEngine::new(&mut motion, &probe, fast_config().autofocus);
        let best = af.fine_search(0.025).unwrap();
        assert_eq!(best.z, 3.0);
        assert_eq!(motion.z(), 3.0);
    }

    #[test]
    fn test_unsafe_climb_ends_without_undo() {
        let printer = SimulatedPrinter::new();
        let (_r, mut motion) = setup(&printer);
        motion.set_z(99.99).unwrap().require().unwrap();
        printer.clear_sent();
        let probe = peak_at(&printer, 100.0);

        let mut af = AutofocusEngine::new(&mut motion, &probe, fast_config().autofocus);
        let best = af.fine_search(0.025).unwrap();
        assert_eq!(best.z, 99.99);
        assert_eq!(
            printer.sent(),
            vec!["G91", "G0 Z-0.025", "G0 Z0.025", "G90", "G1 Z99.99"]
        );
        assert_eq!(motion.z(), 99.99);
    }

    #[test]
    fn test_auto_focus_commits_and_restores_feedrate() {
        let printer = SimulatedPrinter::new();
        let (_r, mut motion) = setup(&printer);
        motion.set_feedrate(1000.0).unwrap();
        let probe = peak_at(&printer, 3.52);

        let report = AutofocusEngine::new(&mut motion, &probe, fast_config().autofocus)
            .auto_focus()
            .unwrap();

        assert_eq!(motion.feedrate(), Some(1000.0));
        assert_eq!(motion.focus_z(), report.fine.z);
        assert!(printer.sent().iter().any(|c| c == "G0 F100"));
    }

    #[test]
    fn test_invalid_arguments() {
        let printer = SimulatedPrinter::new();
        let (_r, mut motion) = setup(&printer);
        let probe = peak_at(&printer, 3.0);
        let mut af = AutofocusEngine::new(&mut motion, &probe, fast_config().autofocus);
        assert!(matches!(af.coarse_search(0), Err(RigError::InvalidArgument(_))));
        assert!(matches!(af.fine_search(0.0), Err(RigError::InvalidArgument(_))));
        assert!(printer.sent().is_empty());
    }
}
