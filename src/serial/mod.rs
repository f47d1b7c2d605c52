//! Line-oriented serial links to the rig controllers.
//!
//! [`SerialLink`] is the byte channel seam: the real implementation is
//! [`PortLink`] over the `serialport` crate, tests use the simulated links in
//! [`crate::testing`]. The two provided methods carry the protocols spoken
//! over a link:
//!
//! - [`SerialLink::send`]: the motion controller's command/acknowledge
//!   exchange, which reads until an `ok`/`start` line and turns a halt
//!   report into [`RigError::ControllerHalted`];
//! - [`SerialLink::query`]: a single command/reply exchange with no
//!   classification, used by the lighting controller.

pub mod discovery;
pub mod port;
pub mod protocol;

pub use discovery::{
    classify_probe_response, discover_devices, identify_ports, DiscoveredPorts, ProbeResult,
};
pub use port::PortLink;
pub use protocol::{classify, ResponseClass};

use crate::errors::{Result, RigError};

pub trait SerialLink: Send {
    /// Human-readable name used in logs and errors (usually the port path).
    fn name(&self) -> &str;

    /// Write `line` followed by the `\n` terminator.
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Block until a full line arrives. Fails with
    /// [`RigError::ProtocolTimeout`] when the link timeout elapses first.
    /// The terminator is stripped.
    fn read_line(&mut self) -> Result<String>;

    /// Discard anything received but not yet read.
    fn clear_input(&mut self) -> Result<()>;

    /// Send a command and wait for the controller to acknowledge it.
    fn send(&mut self, command: &str) -> Result<String> {
        log::info!("[{}] Sending: {}", self.name(), command);
        self.clear_input()?;
        self.write_line(command)?;

        loop {
            let line = self.read_line()?;
            match classify(&line) {
                ResponseClass::Success => {
                    log::debug!("[{}] Ack: {}", self.name(), line);
                    return Ok(line);
                }
                ResponseClass::Halted => {
                    log::error!("[{}] Controller halted: {}", self.name(), line);
                    return Err(RigError::ControllerHalted(line));
                }
                ResponseClass::Informational => {
                    log::info!("[{}] Response: {}", self.name(), line);
                }
            }
        }
    }

    /// Send a command and return the single line that answers it.
    fn query(&mut self, command: &str) -> Result<String> {
        log::info!("[{}] Sending: {}", self.name(), command);
        self.clear_input()?;
        self.write_line(command)?;
        let line = self.read_line()?;
        log::info!("[{}] Response: {}", self.name(), line);
        Ok(line)
    }
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        (**self).write_line(line)
    }

    fn read_line(&mut self) -> Result<String> {
        (**self).read_line()
    }

    fn clear_input(&mut self) -> Result<()> {
        (**self).clear_input()
    }
}
