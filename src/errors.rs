use crate::motion::Axis;
use crate::registry::DeviceKind;
use std::path::PathBuf;
use std::time::Duration;

/// Errors surfaced by the rig components.
///
/// Nothing in the crate terminates the process on a device fault; every
/// failure travels back to the caller through one of these variants.
#[derive(Debug, thiserror::Error)]
pub enum RigError {
    /// No terminal response line arrived within the link timeout.
    #[error("no response from {device} within {timeout:?}")]
    ProtocolTimeout { device: String, timeout: Duration },

    /// The motion controller reported that it halted.
    #[error("controller halted: {0}")]
    ControllerHalted(String),

    /// A requested position lies outside the stage's safe envelope.
    #[error("unsafe move rejected: {axis} to {requested}")]
    UnsafeMove { axis: Axis, requested: f64 },

    /// An expected controller could not be found during discovery.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// A merge or stitch executable exited unsuccessfully.
    #[error("{tool} failed with exit code {code:?}")]
    ExternalToolFailure { tool: String, code: Option<i32> },

    /// An external tool reported success but its output is missing.
    #[error("expected output not produced: {0}")]
    MissingOutput(PathBuf),

    /// A second instance of a single-instance device was requested.
    #[error("{0} already constructed")]
    AlreadyConstructed(DeviceKind),

    #[error("no frame captured within {0:?}")]
    CaptureTimeout(Duration),

    #[error("camera error: {0}")]
    Camera(String),

    /// A scan tile could not be produced.
    #[error("tile c{column:04}_r{row:04} failed: {source}")]
    TileFailed {
        row: u32,
        column: u32,
        #[source]
        source: Box<RigError>,
    },

    #[error("worker {0} panicked")]
    WorkerPanicked(String),

    #[error("unknown lens: {0}")]
    UnknownLens(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("lock poisoned by previous panic")]
    PoisonedLock,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RigError {
    pub(crate) fn tile(row: u32, column: u32, source: RigError) -> Self {
        RigError::TileFailed {
            row,
            column,
            source: Box::new(source),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for RigError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        RigError::PoisonedLock
    }
}

pub type Result<T> = std::result::Result<T, RigError>;
