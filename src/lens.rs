//! Lens profiles and the JSON catalog they are loaded from.
//!
//! The catalog maps a lens identifier (its magnification) to the stage
//! parameters that lens needs:
//!
//! ```json
//! { "20": { "init_pos": 3.0, "step_stitch": 0.4, "step_focus": 0.05 } }
//! ```

use crate::errors::{Result, RigError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Stage parameters of one objective lens. Immutable for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensProfile {
    pub id: String,
    /// Absolute z where the coarse focus sweep starts
    pub init_pos: f64,
    /// x/y travel covering one field of view
    pub step_stitch: f64,
    /// z increment of the coarse focus sweep
    pub step_focus: f64,
    pub magnification: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct LensEntry {
    init_pos: f64,
    step_stitch: f64,
    step_focus: f64,
}

#[derive(Debug, Clone, Default)]
pub struct LensCatalog {
    lenses: BTreeMap<String, LensEntry>,
}

impl LensCatalog {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            RigError::Config(format!("Failed to read lens catalog {:?}: {}", path, e))
        })?;
        let catalog = Self::from_json(&contents)?;
        log::info!("Loaded {} lens profiles from {:?}", catalog.len(), path);
        Ok(catalog)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let lenses: BTreeMap<String, LensEntry> = serde_json::from_str(contents)?;
        for (id, entry) in &lenses {
            if entry.step_focus <= 0.0 || entry.step_stitch <= 0.0 {
                return Err(RigError::Config(format!(
                    "Lens {} must have positive step sizes",
                    id
                )));
            }
        }
        Ok(Self { lenses })
    }

    pub fn len(&self) -> usize {
        self.lenses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lenses.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.lenses.keys().map(String::as_str)
    }

    /// Look up a lens. `"20"` and `"20.0"` name the same lens.
    pub fn get(&self, id: &str) -> Result<LensProfile> {
        let wanted = id.trim();
        let found = self.lenses.get_key_value(wanted).or_else(|| {
            let numeric = wanted.parse::<f64>().ok()?;
            self.lenses
                .iter()
                .find(|(key, _)| key.parse::<f64>().ok() == Some(numeric))
        });

        let (key, entry) = found.ok_or_else(|| RigError::UnknownLens(id.to_string()))?;
        Ok(LensProfile {
            id: key.clone(),
            init_pos: entry.init_pos,
            step_stitch: entry.step_stitch,
            step_focus: entry.step_focus,
            magnification: key.parse().unwrap_or(0.0),
        })
    }
}
