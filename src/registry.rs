//! Single-instance contract for the rig's physical devices.
//!
//! There is exactly one motion controller, one lighting controller and one
//! camera. Instead of hidden statics, the top-level process owns a
//! [`DeviceRegistry`] and every device constructor claims its slot from it.
//! A second claim for the same device fails with
//! [`RigError::AlreadyConstructed`]; dropping the device releases the claim.

use crate::errors::{Result, RigError};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

/// The physical devices a rig is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DeviceKind {
    Motion,
    Light,
    Camera,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceKind::Motion => "motion controller",
            DeviceKind::Light => "lighting controller",
            DeviceKind::Camera => "camera",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    claimed: Arc<Mutex<HashSet<DeviceKind>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `kind`, failing if a live instance already holds it.
    pub fn claim(&self, kind: DeviceKind) -> Result<DeviceToken> {
        let mut claimed = self.claimed.lock()?;
        if !claimed.insert(kind) {
            log::error!("Refusing second construction of {}", kind);
            return Err(RigError::AlreadyConstructed(kind));
        }
        log::debug!("Registry claim: {}", kind);
        Ok(DeviceToken {
            kind,
            claimed: Arc::clone(&self.claimed),
        })
    }

    pub fn is_claimed(&self, kind: DeviceKind) -> bool {
        self.claimed
            .lock()
            .map(|c| c.contains(&kind))
            .unwrap_or(false)
    }
}

/// Proof that a device slot is held. Released on drop.
#[derive(Debug)]
pub struct DeviceToken {
    kind: DeviceKind,
    claimed: Arc<Mutex<HashSet<DeviceKind>>>,
}

impl DeviceToken {
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }
}

impl Drop for DeviceToken {
    fn drop(&mut self) {
        if let Ok(mut claimed) = self.claimed.lock() {
            claimed.remove(&self.kind);
            log::debug!("Registry release: {}", self.kind);
        }
    }
}
