use crate::capture::CaptureEngine;
use crate::config::settle;
use crate::errors::Result;
use crate::motion::MotionState;
/// Focus bracket capture
///
/// Takes stills around the current focus plane: `0.jpeg` at the plane,
/// `1.jpeg`..`k.jpeg` above it and `-1.jpeg`..`-k.jpeg` below it, with
/// `k = samples / 2`. The stage is moved before each still and returned to
/// the focus plane at the end.
use std::path::{Path, PathBuf};

pub fn capture_samples(
    motion: &mut MotionState,
    camera: &CaptureEngine,
    samples: u32,
    step: f64,
    settle_ms: u64,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    let per_side = i64::from(samples / 2);
    log::info!(
        "Capturing focus bracket of {} stills, step {} into {:?}",
        2 * per_side + 1,
        step,
        dir
    );

    let mut paths = Vec::with_capacity((2 * per_side + 1) as usize);
    let mut save = |index: i64| -> Result<()> {
        let path = dir.join(format!("{}.jpeg", index));
        camera.save_photo(&path)?;
        paths.push(path);
        Ok(())
    };

    save(0)?;
    for direction in [1i64, -1] {
        let signed_step = step * direction as f64;
        for i in 1..=per_side {
            motion.move_z(signed_step)?.require()?;
            settle(settle_ms);
            save(i * direction)?;
            log::debug!("Bracket sample {} taken", i * direction);
        }
        if per_side > 0 {
            motion.move_z(-signed_step * per_side as f64)?.require()?;
        }
    }

    Ok(paths)
}
