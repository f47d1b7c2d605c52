use crate::errors::{Result, RigError};
use crate::tools::run_tool;
use std::path::{Path, PathBuf};

/// Location of the stitched panorama relative to the session directory.
pub const STITCHED_OUTPUT: &str = "single/out.jpg";

/// Turns a directory of named tiles into one panorama.
pub trait TileStitcher: Send + Sync {
    /// `tiles` are file names relative to `work_dir`. Returns the panorama.
    fn stitch(&self, work_dir: &Path, tiles: &[String]) -> Result<PathBuf>;
}

/// The external `xy-stitch` / `xy-ts` pair. Both run inside the work
/// directory; the second writes `single/out.jpg`.
#[derive(Debug, Clone)]
pub struct XyStitchTool {
    stitch: PathBuf,
    finalize: PathBuf,
}

impl XyStitchTool {
    pub fn new(stitch: impl Into<PathBuf>, finalize: impl Into<PathBuf>) -> Self {
        Self {
            stitch: stitch.into(),
            finalize: finalize.into(),
        }
    }
}

impl TileStitcher for XyStitchTool {
    fn stitch(&self, work_dir: &Path, tiles: &[String]) -> Result<PathBuf> {
        if tiles.is_empty() {
            return Err(RigError::InvalidArgument("nothing to stitch".to_string()));
        }

        log::info!("Stitching {} tiles in {:?}", tiles.len(), work_dir);
        run_tool(&self.stitch, tiles, Some(work_dir))?;
        run_tool(&self.finalize, ["--ignore-crop"], Some(work_dir))?;

        let output = work_dir.join(STITCHED_OUTPUT);
        if !output.exists() {
            return Err(RigError::MissingOutput(output));
        }
        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_stitch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tool = XyStitchTool::new("false", "true");
        let err = tool
            .stitch(dir.path(), &["c0000_r0000.tif".to_string()])
            .unwrap_err();
        assert!(matches!(err, RigError::ExternalToolFailure { .. }));
    }

    #[test]
    fn test_missing_panorama() {
        let dir = tempfile::tempdir().unwrap();
        let tool = XyStitchTool::new("true", "true");
        let err = tool
            .stitch(dir.path(), &["c0000_r0000.tif".to_string()])
            .unwrap_err();
        assert!(matches!(err, RigError::MissingOutput(ref p) if p.ends_with(STITCHED_OUTPUT)));
    }

    #[test]
    fn test_empty_tile_set() {
        let dir = tempfile::tempdir().unwrap();
        let tool = XyStitchTool::new("true", "true");
        assert!(tool.stitch(dir.path(), &[]).is_err());
    }
}
