use crate::errors::RigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order in which the stage visits the tiles of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanPattern {
    /// Rows alternate direction; odd rows run right to left.
    Boustrophedon,
    /// Every row runs left to right; x returns to the row start in between.
    Raster,
}

impl fmt::Display for ScanPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanPattern::Boustrophedon => f.write_str("boustrophedon"),
            ScanPattern::Raster => f.write_str("raster"),
        }
    }
}

impl FromStr for ScanPattern {
    type Err = RigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "boustrophedon" | "snake" | "0" => Ok(ScanPattern::Boustrophedon),
            "raster" | "z" | "1" => Ok(ScanPattern::Raster),
            other => Err(RigError::InvalidArgument(format!(
                "unknown scan pattern '{}'",
                other
            ))),
        }
    }
}

/// One tile of a scan. `column` is the position within the row in capture
/// order; the physical column depends on the pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileJob {
    pub row: u32,
    pub column: u32,
    pub pattern: ScanPattern,
}

impl TileJob {
    pub fn physical_column(&self, columns: u32) -> u32 {
        debug_assert!(
            self.column < columns,
            "column {} outside a {} column scan",
            self.column,
            columns
        );
        match self.pattern {
            ScanPattern::Boustrophedon if self.row % 2 == 1 => {
                columns.saturating_sub(1).saturating_sub(self.column)
            }
            _ => self.column,
        }
    }

    /// Sign of the x step taken after this tile when the row continues.
    pub fn x_direction(&self) -> f64 {
        match self.pattern {
            ScanPattern::Boustrophedon if self.row % 2 == 1 => -1.0,
            _ => 1.0,
        }
    }

    /// Physical `(column, row)` of the tile.
    pub fn physical_position(&self, columns: u32) -> (u32, u32) {
        (self.physical_column(columns), self.row)
    }

    /// `c####_r####.tif` from the physical position.
    pub fn file_name(&self, columns: u32) -> String {
        format!("c{:04}_r{:04}.tif", self.physical_column(columns), self.row)
    }
}

/// All tiles of a `columns` x `rows` scan in capture order.
pub fn plan(columns: u32, rows: u32, pattern: ScanPattern) -> Vec<TileJob> {
    (0..rows)
        .flat_map(|row| {
            (0..columns).map(move |column| TileJob {
                row,
                column,
                pattern,
            })
        })
        .collect()
}
