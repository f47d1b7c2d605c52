//! Stand-ins for the external merge and stitch tools and for the
//! sharpness metric.

use crate::errors::{Result, RigError};
use crate::focus_stack::FocusMerger;
use crate::scan::{TileStitcher, STITCHED_OUTPUT};
use crate::sharpness::SharpnessProbe;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Sharpness read from a closure, usually a function of the simulated
/// stage height.
pub struct FnProbe<F: Fn() -> f64> {
    metric: F,
}

impl<F: Fn() -> f64> FnProbe<F> {
    pub fn new(metric: F) -> Self {
        Self { metric }
    }
}

impl<F: Fn() -> f64> SharpnessProbe for FnProbe<F> {
    fn sharpness(&self) -> Result<f64> {
        Ok((self.metric)())
    }
}

/// "Merges" a stack by copying its first input.
#[derive(Debug, Default)]
pub struct CopyMerger {
    fail: bool,
    delay: Duration,
    calls: AtomicUsize,
}

impl CopyMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A merger that always exits with code 1.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FocusMerger for CopyMerger {
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        if self.fail {
            return Err(RigError::ExternalToolFailure {
                tool: "copy-merger".to_string(),
                code: Some(1),
            });
        }
        let first = inputs
            .first()
            .ok_or_else(|| RigError::InvalidArgument("no samples to merge".to_string()))?;
        fs::copy(first, output)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StitchCall {
    pub work_dir: PathBuf,
    pub tiles: Vec<String>,
}

/// Records stitch requests and writes a placeholder panorama. Fails if a
/// named tile is not on disk.
#[derive(Debug, Default)]
pub struct RecordingStitcher {
    calls: Mutex<Vec<StitchCall>>,
}

impl RecordingStitcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<StitchCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl TileStitcher for RecordingStitcher {
    fn stitch(&self, work_dir: &Path, tiles: &[String]) -> Result<PathBuf> {
        if let Some(missing) = tiles.iter().find(|t| !work_dir.join(t).exists()) {
            return Err(RigError::MissingOutput(work_dir.join(missing)));
        }

        let output = work_dir.join(STITCHED_OUTPUT);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&output, b"panorama")?;

        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(StitchCall {
                work_dir: work_dir.to_path_buf(),
                tiles: tiles.to_vec(),
            });
        Ok(output)
    }
}
