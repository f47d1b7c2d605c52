/// Focus merging
///
/// A bracket of images taken at neighbouring focus planes is merged into one
/// all-in-focus image by an external tool (`focus-stack`). The tool takes the
/// input files and `--output=<path>`.
use crate::errors::{Result, RigError};
use crate::tools::run_tool;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub trait FocusMerger: Send + Sync {
    /// Merge `inputs` into `output`. On success `output` exists.
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;
}

/// The external `focus-stack` executable.
#[derive(Debug, Clone)]
pub struct FocusStackTool {
    program: PathBuf,
}

impl FocusStackTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl FocusMerger for FocusStackTool {
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        if inputs.is_empty() {
            return Err(RigError::InvalidArgument(
                "focus merge needs at least one input".to_string(),
            ));
        }

        let mut args: Vec<OsString> = inputs.iter().map(|p| p.clone().into_os_string()).collect();
        let mut output_arg = OsString::from("--output=");
        output_arg.push(output);
        args.push(output_arg);

        run_tool(&self.program, args, None)?;
        if !output.exists() {
            return Err(RigError::MissingOutput(output.to_path_buf()));
        }
        log::info!("Merged {} samples into {:?}", inputs.len(), output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_empty_input_rejected() {
        let tool = FocusStackTool::new("focus-stack");
        let err = tool.merge(&[], Path::new("o.jpeg")).unwrap_err();
        assert!(matches!(err, RigError::InvalidArgument(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_merge_has_no_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let sample = dir.path().join("0.jpeg");
        fs::write(&sample, b"x").unwrap();

        let tool = FocusStackTool::new("false");
        let err = tool.merge(&[sample], &dir.path().join("o.jpeg")).unwrap_err();
        assert!(matches!(
            err,
            RigError::ExternalToolFailure { code: Some(1), .. }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_success_without_output_is_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let sample = dir.path().join("0.jpeg");
        fs::write(&sample, b"x").unwrap();

        let tool = FocusStackTool::new("true");
        let err = tool.merge(&[sample], &dir.path().join("o.jpeg")).unwrap_err();
        assert!(matches!(err, RigError::MissingOutput(_)));
    }
}
