use super::SerialLink;
use crate::errors::{Result, RigError};
use serialport::{ClearBuffer, SerialPort};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

/// Granularity of the underlying blocking reads; the link timeout is
/// enforced on top of it.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Serial link over a physical port.
pub struct PortLink {
    port: Box<dyn SerialPort>,
    name: String,
    timeout: Duration,
    pending: Vec<u8>,
}

impl PortLink {
    /// Open `path` at `baud_rate`. Reads fail after `timeout` without a line.
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(POLL_INTERVAL.min(timeout))
            .open()?;

        log::debug!("Serial port '{}' opened at {} baud", path, baud_rate);

        Ok(Self {
            port,
            name: path.to_string(),
            timeout,
            pending: Vec::new(),
        })
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        Some(String::from_utf8_lossy(&raw).trim_end().to_string())
    }
}

impl SerialLink for PortLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        self.port.write_all(line.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; 256];

        loop {
            if let Some(line) = self.take_line() {
                return Ok(line);
            }
            if Instant::now() >= deadline {
                return Err(RigError::ProtocolTimeout {
                    device: self.name.clone(),
                    timeout: self.timeout,
                });
            }

            match self.port.read(&mut buf) {
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn clear_input(&mut self) -> Result<()> {
        self.pending.clear();
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}
