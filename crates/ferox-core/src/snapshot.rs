use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// Renderer-facing colony record. Names are truncated to 32 bytes at build
/// time so transports with a fixed name buffer never have to cut mid-run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColonySnapshot {
    pub id: u32,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub population: i64,
    pub peak_population: i64,
    pub growth_rate: f32,
    pub color: [u8; 3],
    pub alive: bool,
    pub shape_seed: u32,
    pub wobble_phase: f32,
    pub shape_evolution: f32,
    // Condensed traits.
    pub aggression: f32,
    pub defense: f32,
    pub metabolism: f32,
    pub toxin_production: f32,
    pub spread_rate: f32,
}

/// Read-only view of the world built between ticks. Consumers treat it as
/// immutable; the engine never mutates a published snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub width: u32,
    pub height: u32,
    pub tick: u64,
    pub paused: bool,
    pub speed_multiplier: f32,
    pub colonies: Vec<ColonySnapshot>,
    /// Run-length-encoded per-cell colony ids, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<RleGrid>,
}

/// RLE colony-id grid: the uncompressed cell count followed by
/// (count, value) u16 pairs. Runs longer than `u16::MAX` are split.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RleGrid {
    pub cell_count: u32,
    pub runs: Vec<(u16, u16)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RleError {
    /// Decoded run lengths do not sum to the declared cell count.
    LengthMismatch { expected: u32, actual: u32 },
    /// A run with a zero length is never produced by the encoder.
    ZeroRun,
}

impl fmt::Display for RleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RleError::LengthMismatch { expected, actual } => {
                write!(f, "rle runs decode to {actual} cells, header says {expected}")
            }
            RleError::ZeroRun => write!(f, "rle stream contains a zero-length run"),
        }
    }
}

impl Error for RleError {}

/// Run-length-encode a colony-id grid.
pub fn rle_encode(cells: &[u16]) -> RleGrid {
    let mut runs = Vec::new();
    let mut iter = cells.iter().copied();
    if let Some(first) = iter.next() {
        let mut value = first;
        let mut count: u32 = 1;
        for v in iter {
            if v == value && count < u32::from(u16::MAX) {
                count += 1;
            } else {
                runs.push((count as u16, value));
                value = v;
                count = 1;
            }
        }
        runs.push((count as u16, value));
    }
    RleGrid {
        cell_count: cells.len() as u32,
        runs,
    }
}

/// Decode back to the flat grid, validating the declared length.
pub fn rle_decode(grid: &RleGrid) -> Result<Vec<u16>, RleError> {
    let mut out = Vec::with_capacity(grid.cell_count as usize);
    for &(count, value) in &grid.runs {
        if count == 0 {
            return Err(RleError::ZeroRun);
        }
        out.extend(std::iter::repeat_n(value, usize::from(count)));
    }
    if out.len() as u32 != grid.cell_count {
        return Err(RleError::LengthMismatch {
            expected: grid.cell_count,
            actual: out.len() as u32,
        });
    }
    Ok(out)
}

/// Truncate to at most 32 bytes on a char boundary.
pub fn truncate_name(name: &str) -> String {
    if name.len() <= 32 {
        return name.to_string();
    }
    let mut end = 32;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}
