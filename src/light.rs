//! Lighting controller: a bottom (transmitted) light and a ring of RGBW LEDs.

use crate::errors::{Result, RigError};
use crate::registry::{DeviceKind, DeviceRegistry, DeviceToken};
use crate::serial::SerialLink;
use serde::{Deserialize, Serialize};

/// Number of individually addressable lights in the ring.
pub const RING_LIGHTS: usize = 12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgbw {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub w: u8,
}

impl Rgbw {
    pub const OFF: Rgbw = Rgbw::new(0, 0, 0, 0);
    pub const WHITE: Rgbw = Rgbw::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, w: u8) -> Self {
        Self { r, g, b, w }
    }

    fn command(&self) -> String {
        format!("L008 R{:03} G{:03} B{:03} W{:03}", self.r, self.g, self.b, self.w)
    }
}

pub struct LightState {
    link: Box<dyn SerialLink>,
    _token: DeviceToken,
    bottom_light: bool,
    ring: [Rgbw; RING_LIGHTS],
}

impl LightState {
    pub fn new(registry: &DeviceRegistry, link: Box<dyn SerialLink>) -> Result<Self> {
        let token = registry.claim(DeviceKind::Light)?;
        log::info!("Lighting controller on {}", link.name());
        Ok(Self {
            link,
            _token: token,
            bottom_light: false,
            ring: [Rgbw::WHITE; RING_LIGHTS],
        })
    }

    pub fn bottom_light_on(&mut self) -> Result<()> {
        self.set_bottom_light(true)
    }

    pub fn bottom_light_off(&mut self) -> Result<()> {
        self.set_bottom_light(false)
    }

    fn set_bottom_light(&mut self, on: bool) -> Result<()> {
        self.link.query(&format!("L012 {}", u8::from(on)))?;
        self.bottom_light = on;
        Ok(())
    }

    /// Set every ring light to the same color.
    pub fn set_ring(&mut self, color: Rgbw) -> Result<()> {
        self.link.query(&color.command())?;
        self.ring = [color; RING_LIGHTS];
        Ok(())
    }

    /// Set a single ring light.
    pub fn set_channel(&mut self, index: usize, color: Rgbw) -> Result<()> {
        if index >= RING_LIGHTS {
            return Err(RigError::InvalidArgument(format!(
                "ring light {} does not exist (0..{})",
                index, RING_LIGHTS
            )));
        }
        self.link
            .query(&format!("{} L {:02}", color.command(), index))?;
        self.ring[index] = color;
        Ok(())
    }

    pub fn bottom_light(&self) -> bool {
        self.bottom_light
    }

    pub fn ring(&self) -> &[Rgbw; RING_LIGHTS] {
        &self.ring
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLink;
    use std::time::Duration;

    fn arduino() -> ScriptedLink {
        ScriptedLink::new("arduino").respond_with(|cmd| vec![format!("ACK {}", cmd)])
    }

    #[test]
    fn test_bottom_light_commands() {
        let link = arduino();
        let registry = DeviceRegistry::new();
        let mut light = LightState::new(&registry, Box::new(link.clone())).unwrap();

        light.bottom_light_on().unwrap();
        assert!(light.bottom_light());
        light.bottom_light_off().unwrap();
        assert!(!light.bottom_light());
        assert_eq!(link.sent(), vec!["L012 1", "L012 0"]);
    }

    #[test]
    fn test_ring_formatting() {
        let link = arduino();
        let registry = DeviceRegistry::new();
        let mut light = LightState::new(&registry, Box::new(link.clone())).unwrap();

        light.set_ring(Rgbw::new(255, 7, 40, 0)).unwrap();
        light.set_channel(3, Rgbw::new(1, 2, 3, 4)).unwrap();

        assert_eq!(
            link.sent(),
            vec!["L008 R255 G007 B040 W000", "L008 R001 G002 B003 W004 L 03"]
        );
        assert_eq!(light.ring()[0], Rgbw::new(255, 7, 40, 0));
        assert_eq!(light.ring()[3], Rgbw::new(1, 2, 3, 4));
    }

    #[test]
    fn test_channel_out_of_range() {
        let link = arduino();
        let registry = DeviceRegistry::new();
        let mut light = LightState::new(&registry, Box::new(link.clone())).unwrap();

        assert!(matches!(
            light.set_channel(RING_LIGHTS, Rgbw::OFF),
            Err(RigError::InvalidArgument(_))
        ));
        assert!(link.sent().is_empty());
    }

    #[test]
    fn test_state_unchanged_without_reply() {
        let link = ScriptedLink::new("arduino").with_timeout(Duration::from_millis(5));
        let registry = DeviceRegistry::new();
        let mut light = LightState::new(&registry, Box::new(link)).unwrap();

        assert!(light.bottom_light_on().is_err());
        assert!(!light.bottom_light());
        assert!(light.set_ring(Rgbw::OFF).is_err());
        assert_eq!(light.ring()[0], Rgbw::WHITE);
    }
}
