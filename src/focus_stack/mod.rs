/// Focus Stacking Module
///
/// Extends the depth of field of a macro shot:
/// 1. Refine focus at the current position
/// 2. Capture stills at neighbouring focus planes by moving the stage in z
/// 3. Merge the bracket with the external `focus-stack` tool
///
/// The same bracket capture is used per tile by the scan orchestrator.
pub mod capture;
pub mod merge;

pub use capture::capture_samples;
pub use merge::{FocusMerger, FocusStackTool};

use crate::autofocus::{AutofocusEngine, FocusSample};
use crate::capture::CaptureEngine;
use crate::config::RigConfig;
use crate::errors::Result;
use crate::motion::MotionState;
use crate::scan::ScanSession;
use serde::Serialize;
use std::path::PathBuf;

/// Name of the merged image inside a focus stack directory.
pub const MERGED_NAME: &str = "o.jpeg";

/// Focus stack result
#[derive(Debug, Clone, Serialize)]
pub struct FocusStackResult {
    pub session_dir: PathBuf,
    /// The bracket stills handed to the merger
    pub samples: Vec<PathBuf>,
    /// The merged image
    pub output: PathBuf,
    /// Focus plane the bracket was centred on
    pub focus: FocusSample,
}

/// Standalone focus stacked photo.
pub struct FocusStacker<'a> {
    motion: &'a mut MotionState,
    camera: &'a CaptureEngine,
    merger: &'a dyn FocusMerger,
    config: &'a RigConfig,
}

impl<'a> FocusStacker<'a> {
    pub fn new(
        motion: &'a mut MotionState,
        camera: &'a CaptureEngine,
        merger: &'a dyn FocusMerger,
        config: &'a RigConfig,
    ) -> Self {
        Self {
            motion,
            camera,
            merger,
            config,
        }
    }

    /// Refocus, capture a bracket of `samples` stills `step` apart into a
    /// fresh session under the focus stack root and merge them.
    pub fn capture_stack(&mut self, samples: u32, step: f64) -> Result<FocusStackResult> {
        let fs_config = &self.config.focus_stack;
        let session = ScanSession::create(&fs_config.root, fs_config.retention)?;

        let focus = AutofocusEngine::new(
            &mut *self.motion,
            self.camera,
            self.config.autofocus.clone(),
        )
        .fine_search(self.config.autofocus.fine_start_step)?;

        let inputs = capture_samples(
            self.motion,
            self.camera,
            samples,
            step,
            fs_config.settle_ms,
            session.path(),
        )?;

        let output = session.path().join(MERGED_NAME);
        self.merger.merge(&inputs, &output)?;
        log::info!("Focus stack result {:?}", output);

        Ok(FocusStackResult {
            session_dir: session.path().to_path_buf(),
            samples: inputs,
            output,
            focus,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MotionConfig;
    use crate::errors::RigError;
    use crate::registry::DeviceRegistry;
    use crate::testing::{fast_config, test_lens, CopyMerger, SimulatedPrinter, SyntheticCamera};

    #[test]
    fn test_capture_stack_merges_into_session() {
        let root = tempfile::tempdir().unwrap();
        let mut config = fast_config();
        config.focus_stack.root = root.path().join("fs");

        let registry = DeviceRegistry::new();
        let printer = SimulatedPrinter::new();
        let mut motion = MotionState::new(
            &registry,
            Box::new(printer.clone()),
            test_lens(),
            MotionConfig::default(),
        )
        .unwrap();
        motion.set_z(3.0).unwrap().require().unwrap();
        let camera = SyntheticCamera::new(32, 24).tracking(&printer).focused_at(3.0);
        let engine =
            CaptureEngine::new(&registry, Box::new(camera.clone()), config.camera.clone()).unwrap();
        let merger = CopyMerger::new();

        let result = FocusStacker::new(&mut motion, &engine, &merger, &config)
            .capture_stack(3, 0.02)
            .unwrap();

        assert_eq!(result.samples.len(), 3);
        assert!(result.output.exists());
        assert_eq!(result.output.file_name().unwrap(), MERGED_NAME);
        assert!(result.session_dir.starts_with(root.path().join("fs")));
        assert_eq!(merger.calls(), 1);
        assert!((motion.z() - result.focus.z).abs() < 1e-9);
    }

    #[test]
    fn test_merge_failure_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let mut config = fast_config();
        config.focus_stack.root = root.path().to_path_buf();

        let registry = DeviceRegistry::new();
        let printer = SimulatedPrinter::new();
        let mut motion = MotionState::new(
            &registry,
            Box::new(printer.clone()),
            test_lens(),
            MotionConfig::default(),
        )
        .unwrap();
        motion.set_z(3.0).unwrap().require().unwrap();
        let engine = CaptureEngine::new(
            &registry,
            Box::new(SyntheticCamera::new(8, 8)),
            config.camera.clone(),
        )
        .unwrap();
        let merger = CopyMerger::failing();

        let err = FocusStacker::new(&mut motion, &engine, &merger, &config)
            .capture_stack(3, 0.02)
            .unwrap_err();
        assert!(matches!(err, RigError::ExternalToolFailure { .. }));
    }
}
