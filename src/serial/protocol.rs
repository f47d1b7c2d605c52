//! Response classification for the motion controller's line protocol.

/// Token present in acknowledgments of completed commands.
pub const OK_TOKEN: &str = "ok";
/// Token the controller prints when it (re)boots.
pub const START_TOKEN: &str = "start";
/// Line printed by a controller that stopped executing.
pub const HALT_TOKEN: &str = "Error:Printer halted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// Echo, temperature report, busy notice. Keep reading.
    Informational,
    /// The command is done.
    Success,
    /// The controller halted; nothing more will be acknowledged.
    Halted,
}

pub fn classify(line: &str) -> ResponseClass {
    if line.contains(HALT_TOKEN) {
        ResponseClass::Halted
    } else if line.contains(OK_TOKEN) || line.contains(START_TOKEN) {
        ResponseClass::Success
    } else {
        ResponseClass::Informational
    }
}
