//! Tiled scans.
//!
//! The stage walks a grid of fields of view. At every tile the focus is
//! refined, then either one stream frame is saved as the tile or a focus
//! bracket is captured and handed to a background worker that merges it
//! into the tile. Once every worker joined, the tiles are stitched.
//!
//! Rows are `step_per_fov * 3 / 4` apart in y since frames are 4:3; columns
//! are `step_per_fov` apart in x.

pub mod pattern;
pub mod session;
pub mod stitch;
pub mod workers;

pub use pattern::{plan, ScanPattern, TileJob};
pub use session::{enforce_retention, ScanSession};
pub use stitch::{TileStitcher, XyStitchTool, STITCHED_OUTPUT};
pub use workers::WorkerGroup;

use crate::autofocus::AutofocusEngine;
use crate::capture::CaptureEngine;
use crate::config::{settle, RigConfig};
use crate::errors::{Result, RigError};
use crate::focus_stack::{capture_samples, FocusMerger, MERGED_NAME};
use crate::lens::LensProfile;
use crate::motion::{Axis, AxisPosition, MotionState};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Tiles per row
    pub fov_x: u32,
    /// Rows
    pub fov_y: u32,
    pub step_per_fov: f64,
    pub pattern: ScanPattern,
    /// Focus stack every tile instead of saving a single frame
    pub focus_stack: bool,
}

impl ScanRequest {
    pub fn new(fov_x: u32, fov_y: u32, pattern: ScanPattern, config: &RigConfig) -> Self {
        Self {
            fov_x,
            fov_y,
            step_per_fov: config.scan.step_per_fov,
            pattern,
            focus_stack: false,
        }
    }

    /// Step by the stitch step of `lens` instead of the configured default.
    pub fn for_lens(fov_x: u32, fov_y: u32, pattern: ScanPattern, lens: &LensProfile) -> Self {
        Self {
            fov_x,
            fov_y,
            step_per_fov: lens.step_stitch,
            pattern,
            focus_stack: false,
        }
    }

    pub fn with_focus_stack(mut self, enabled: bool) -> Self {
        self.focus_stack = enabled;
        self
    }

    pub fn with_step(mut self, step_per_fov: f64) -> Self {
        self.step_per_fov = step_per_fov;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.fov_x == 0 || self.fov_y == 0 {
            return Err(RigError::InvalidArgument(format!(
                "scan needs at least one tile, got {}x{}",
                self.fov_x, self.fov_y
            )));
        }
        if self.step_per_fov.is_nan() || self.step_per_fov <= 0.0 {
            return Err(RigError::InvalidArgument(format!(
                "step per field of view must be positive, got {}",
                self.step_per_fov
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub session_dir: PathBuf,
    /// Tile file names, lexically ordered
    pub tiles: Vec<String>,
    pub stitched: PathBuf,
}

pub struct ScanOrchestrator<'a> {
    motion: &'a mut MotionState,
    camera: &'a CaptureEngine,
    merger: Arc<dyn FocusMerger>,
    stitcher: &'a dyn TileStitcher,
    config: &'a RigConfig,
}

impl<'a> ScanOrchestrator<'a> {
    pub fn new(
        motion: &'a mut MotionState,
        camera: &'a CaptureEngine,
        merger: Arc<dyn FocusMerger>,
        stitcher: &'a dyn TileStitcher,
        config: &'a RigConfig,
    ) -> Self {
        Self {
            motion,
            camera,
            merger,
            stitcher,
            config,
        }
    }

    pub fn run(&mut self, request: &ScanRequest) -> Result<ScanOutcome> {
        request.validate()?;
        let scan = &self.config.scan;
        let session = ScanSession::create(&scan.root, scan.retention)?;
        log::info!(
            "Scanning {}x{} {} (focus stack: {})",
            request.fov_x,
            request.fov_y,
            request.pattern,
            request.focus_stack
        );

        let origin = self.motion.position();
        let previous_feedrate = self.motion.feedrate();
        self.motion.set_feedrate(scan.feedrate)?;

        let mut workers = WorkerGroup::new("stagecam-tile");
        let captured = self.capture_tiles(request, &session, &mut workers);
        let joined = workers.join_all();
        let returned = self.return_to(origin, previous_feedrate);

        let mut tiles = match (captured, joined) {
            (Err(e), _) | (Ok(_), Err(e)) => {
                if let Err(r) = returned {
                    log::error!("Could not return to the scan origin: {}", r);
                }
                return Err(e);
            }
            (Ok(tiles), Ok(_)) => tiles,
        };
        returned?;

        tiles.sort();
        let stitched = self.stitcher.stitch(session.path(), &tiles)?;
        log::info!("Scan done: {:?}", stitched);

        Ok(ScanOutcome {
            session_dir: session.path().to_path_buf(),
            tiles,
            stitched,
        })
    }

    fn capture_tiles(
        &mut self,
        request: &ScanRequest,
        session: &ScanSession,
        workers: &mut WorkerGroup<()>,
    ) -> Result<Vec<String>> {
        let columns = request.fov_x;
        let row_start_x = self.motion.position().x;
        let step_y = request.step_per_fov * 3.0 / 4.0;
        let jobs = plan(columns, request.fov_y, request.pattern);
        let mut tiles = Vec::with_capacity(jobs.len());

        for (index, job) in jobs.iter().enumerate() {
            let name = job.file_name(columns);
            self.capture_tile(request, job, &name, session, workers)
                .map_err(|e| RigError::tile(job.row, job.physical_column(columns), e))?;
            tiles.push(name);

            let row_continues = jobs.get(index + 1).is_some_and(|next| next.row == job.row);
            if row_continues {
                let step_x = job.x_direction() * request.step_per_fov;
                self.motion.move_axis(Axis::X, step_x)?.require()?;
                continue;
            }

            if request.pattern == ScanPattern::Raster {
                self.motion.set_axis(Axis::X, row_start_x)?.require()?;
            }
            self.motion.move_axis(Axis::Y, -step_y)?.require()?;
            settle(self.config.scan.row_settle_ms);
        }

        Ok(tiles)
    }

    fn capture_tile(
        &mut self,
        request: &ScanRequest,
        job: &TileJob,
        name: &str,
        session: &ScanSession,
        workers: &mut WorkerGroup<()>,
    ) -> Result<()> {
        let af = &self.config.autofocus;
        AutofocusEngine::new(&mut *self.motion, self.camera, af.clone())
            .fine_search(af.fine_start_step)?;
        settle(self.config.scan.tile_settle_ms);

        let tile_path = session.path().join(name);
        if !request.focus_stack {
            let frame = self.camera.get_frame()?;
            frame.decode()?.save(&tile_path)?;
            log::info!("Saved {}", name);
            return Ok(());
        }

        let (column, row) = job.physical_position(request.fov_x);
        let dir = session.subdir(Path::new(&row.to_string()).join(column.to_string()))?;
        let fs = &self.config.focus_stack;
        let inputs = capture_samples(
            self.motion,
            self.camera,
            self.config.scan.stack_samples,
            fs.step,
            fs.settle_ms,
            &dir,
        )?;

        let merger = Arc::clone(&self.merger);
        workers.spawn(name, move || {
            merge_tile(merger.as_ref(), &inputs, &dir, &tile_path)
                .map_err(|e| RigError::tile(row, column, e))
        })
    }

    fn return_to(&mut self, origin: AxisPosition, feedrate: Option<f64>) -> Result<()> {
        self.motion.set_axis(Axis::X, origin.x)?.require()?;
        self.motion.set_axis(Axis::Y, origin.y)?.require()?;
        if let Some(rate) = feedrate {
            self.motion.set_feedrate(rate)?;
        }
        Ok(())
    }
}

/// Merge one tile's bracket and convert the result into the tile file.
fn merge_tile(
    merger: &dyn FocusMerger,
    inputs: &[PathBuf],
    dir: &Path,
    tile_path: &Path,
) -> Result<()> {
    let merged = dir.join(MERGED_NAME);
    merger.merge(inputs, &merged)?;
    image::ImageReader::open(&merged)?
        .with_guessed_format()?
        .decode()?
        .save(tile_path)?;
    log::info!("Saved {:?}", tile_path);
    Ok(())
}
