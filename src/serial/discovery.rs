//! Finds which serial port is the motion controller and which is the
//! lighting controller.
//!
//! Both enumerate as USB serial adapters with no stable ordering, so every
//! candidate port is opened and sent a display command. The motion controller
//! acknowledges it (or prints its boot banner); the lighting controller does
//! not know the command and says so.

use super::{PortLink, SerialLink};
use crate::config::{millis, settle, SerialConfig};
use crate::errors::{Result, RigError};

/// Command sent to every candidate port.
pub const PROBE_COMMAND: &str = "M117 Server booting...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Motion,
    Light,
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPorts {
    pub motion: String,
    pub light: String,
}

pub fn classify_probe_response(line: &str) -> ProbeResult {
    if line.contains("echo:start") || line.contains("ok") {
        ProbeResult::Motion
    } else if line.contains("Unknown") {
        ProbeResult::Light
    } else {
        ProbeResult::Unrecognized
    }
}

/// Serial ports whose name contains `filter`, sorted by name.
pub fn list_candidate_ports(filter: &str) -> Result<Vec<String>> {
    let mut ports: Vec<String> = serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .filter(|name| name.contains(filter))
        .collect();
    ports.sort();
    log::debug!("Candidate ports matching '{}': {:?}", filter, ports);
    Ok(ports)
}

/// Probe one link: send the probe command and read until a line identifies
/// the device or the link times out.
pub fn probe_link(link: &mut dyn SerialLink) -> Result<ProbeResult> {
    link.clear_input()?;
    link.write_line(PROBE_COMMAND)?;
    loop {
        match link.read_line() {
            Ok(line) => {
                log::debug!("[{}] Probe response: {}", link.name(), line);
                match classify_probe_response(&line) {
                    ProbeResult::Unrecognized => continue,
                    found => return Ok(found),
                }
            }
            Err(RigError::ProtocolTimeout { .. }) => return Ok(ProbeResult::Unrecognized),
            Err(e) => return Err(e),
        }
    }
}

/// Identify the controllers among `ports`, opening each with `open`.
///
/// A port that fails to open or answers with nothing recognizable is skipped.
/// Both devices must be found.
pub fn identify_ports<F>(ports: &[String], mut open: F, boot_delay_ms: u64) -> Result<DiscoveredPorts>
where
    F: FnMut(&str) -> Result<Box<dyn SerialLink>>,
{
    let mut motion = None;
    let mut light = None;

    for port in ports {
        if motion.is_some() && light.is_some() {
            break;
        }

        let mut link = match open(port) {
            Ok(link) => link,
            Err(e) => {
                log::warn!("Skipping {}: {}", port, e);
                continue;
            }
        };
        settle(boot_delay_ms);

        match probe_link(link.as_mut()) {
            Ok(ProbeResult::Motion) if motion.is_none() => {
                log::info!("Motion controller found on {}", port);
                motion = Some(port.clone());
            }
            Ok(ProbeResult::Light) if light.is_none() => {
                log::info!("Lighting controller found on {}", port);
                light = Some(port.clone());
            }
            Ok(other) => log::debug!("{}: {:?}, ignored", port, other),
            Err(e) => log::warn!("Probe of {} failed: {}", port, e),
        }
    }

    let motion = motion.ok_or_else(|| RigError::DeviceNotFound("motion controller".to_string()))?;
    let light = light.ok_or_else(|| RigError::DeviceNotFound("lighting controller".to_string()))?;
    Ok(DiscoveredPorts { motion, light })
}

/// Enumerate and probe the physical serial ports.
pub fn discover_devices(config: &SerialConfig) -> Result<DiscoveredPorts> {
    let ports = list_candidate_ports(&config.port_filter)?;
    if ports.is_empty() {
        return Err(RigError::DeviceNotFound(format!(
            "no serial ports matching '{}'",
            config.port_filter
        )));
    }

    let baud_rate = config.baud_rate;
    let timeout = millis(config.probe_timeout_ms);
    identify_ports(
        &ports,
        |port| Ok(Box::new(PortLink::open(port, baud_rate, timeout)?) as Box<dyn SerialLink>),
        config.probe_boot_delay_ms,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLink;
    use std::time::Duration;

    fn printer(name: &str) -> Box<dyn SerialLink> {
        Box::new(ScriptedLink::new(name).respond_with(|_| vec!["ok".to_string()]))
    }

    fn arduino(name: &str) -> Box<dyn SerialLink> {
        Box::new(
            ScriptedLink::new(name).respond_with(|_| vec!["Unknown command: M117".to_string()]),
        )
    }

    fn silent(name: &str) -> Box<dyn SerialLink> {
        Box::new(ScriptedLink::new(name).with_timeout(Duration::from_millis(10)))
    }

    #[test]
    fn test_classify_probe_response() {
        assert_eq!(classify_probe_response("echo:start"), ProbeResult::Motion);
        assert_eq!(classify_probe_response("ok"), ProbeResult::Motion);
        assert_eq!(classify_probe_response("Unknown command"), ProbeResult::Light);
        assert_eq!(classify_probe_response("Booting"), ProbeResult::Unrecognized);
    }

    #[test]
    fn test_identify_in_any_order() {
        let ports = vec![
            "/dev/ttyUSB0".to_string(),
            "/dev/ttyUSB1".to_string(),
            "/dev/ttyUSB2".to_string(),
        ];
        let found = identify_ports(
            &ports,
            |port| {
                Ok(match port {
                    "/dev/ttyUSB0" => silent(port),
                    "/dev/ttyUSB1" => arduino(port),
                    _ => printer(port),
                })
            },
            0,
        )
        .unwrap();
        assert_eq!(found.motion, "/dev/ttyUSB2");
        assert_eq!(found.light, "/dev/ttyUSB1");
    }

    #[test]
    fn test_missing_light_is_device_not_found() {
        let ports = vec!["/dev/ttyUSB0".to_string()];
        let err = identify_ports(&ports, |port| Ok(printer(port)), 0).unwrap_err();
        assert!(matches!(err, RigError::DeviceNotFound(ref d) if d.contains("lighting")));
    }

    #[test]
    fn test_unopenable_port_is_skipped() {
        let ports = vec![
            "/dev/ttyUSB0".to_string(),
            "/dev/ttyUSB1".to_string(),
            "/dev/ttyUSB2".to_string(),
        ];
        let found = identify_ports(
            &ports,
            |port| match port {
                "/dev/ttyUSB0" => Err(RigError::DeviceNotFound(port.to_string())),
                "/dev/ttyUSB1" => Ok(printer(port)),
                _ => Ok(arduino(port)),
            },
            0,
        )
        .unwrap();
        assert_eq!(found.motion, "/dev/ttyUSB1");
    }
}
