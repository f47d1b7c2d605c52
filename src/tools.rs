//! Invocation of the external image tools.

use crate::errors::{Result, RigError};
use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;

/// Run `program` with `args`, optionally inside `cwd`, and require a zero
/// exit status. A program that cannot be started counts as a failure with no
/// exit code.
pub fn run_tool<I, S>(program: &Path, args: I, cwd: Option<&Path>) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let tool = program.display().to_string();
    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    log::info!("Running {:?}", command);
    let status = command.status().map_err(|e| {
        log::error!("Failed to start {}: {}", tool, e);
        RigError::ExternalToolFailure {
            tool: tool.clone(),
            code: None,
        }
    })?;

    log::info!("{} ended with {:?}", tool, status.code());
    if !status.success() {
        return Err(RigError::ExternalToolFailure {
            tool,
            code: status.code(),
        });
    }
    Ok(())
}
