//! Region tasks for the parallel age and spread phases.
//!
//! The grid is split into `R × R` rectangles; each becomes one pool task.
//! Tasks communicate only through atomic cell ops and the per-colony atomic
//! counters, so inter-task order within a phase is irrelevant.

use super::World;
use crate::colony::ColonyStats;
use crate::grid::{CellGrid, DIR_WEIGHT, NEIGHBORS_8};
use crate::pool::WorkerCtx;
use rand::Rng;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Region {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

/// Split the grid into `per_side × per_side` rectangles covering every cell.
pub(crate) fn make_regions(width: usize, height: usize, per_side: usize) -> Vec<Region> {
    let mut regions = Vec::with_capacity(per_side * per_side);
    for ry in 0..per_side {
        for rx in 0..per_side {
            let x0 = rx * width / per_side;
            let x1 = (rx + 1) * width / per_side;
            let y0 = ry * height / per_side;
            let y1 = (ry + 1) * height / per_side;
            if x0 < x1 && y0 < y1 {
                regions.push(Region { x0, y0, x1, y1 });
            }
        }
    }
    regions
}

/// Per-colony inputs the spread task needs, copied dense-by-id so tasks never
/// touch the serial colony table.
#[derive(Clone, Debug, Default)]
pub(crate) struct SpreadParams {
    pub active: bool,
    pub dormant: bool,
    pub spread_rate: f32,
    pub metabolism: f32,
    pub spread_weights: [f32; 8],
    pub hidden_weights: [f32; 8],
    pub social_factor: f32,
    pub signal_sensitivity: f32,
    pub detection_range: f32,
    pub max_tracked: u8,
    pub density_tolerance: f32,
    pub edge_affinity: f32,
    /// Colony signal strength cleared its quorum threshold last tick.
    pub quorum_active: bool,
}

/// Immutable per-tick read set for the spread phase. Built once, shared by
/// every region task, dropped at the barrier.
pub(crate) struct SpreadShared {
    grid: Arc<CellGrid>,
    stats: Arc<Vec<ColonyStats>>,
    params: Vec<SpreadParams>,
    signals: Vec<f32>,
    signal_source: Vec<u32>,
    alarms: Vec<f32>,
}

impl World {
    pub(crate) fn run_age_phase(&self) {
        for &region in &self.regions {
            let grid = Arc::clone(&self.grid);
            self.pool.submit(Box::new(move |_ctx| {
                age_region(&grid, region);
            }));
        }
        self.pool.wait();
    }

    pub(crate) fn run_spread_phase(&self) {
        let mut params = vec![SpreadParams::default(); self.colonies.next_id_hint() as usize];
        for colony in self.colonies.iter_active() {
            let Some(slot) = params.get_mut(colony.id as usize) else {
                continue;
            };
            *slot = SpreadParams {
                active: true,
                dormant: colony.is_dormant,
                spread_rate: colony.genome.spread_rate,
                metabolism: colony.genome.metabolism,
                spread_weights: colony.genome.spread_weights,
                hidden_weights: colony.genome.hidden_weights,
                social_factor: colony.genome.social_factor,
                signal_sensitivity: colony.genome.signal_sensitivity,
                detection_range: colony.genome.detection_range,
                max_tracked: colony.genome.max_tracked,
                density_tolerance: colony.genome.density_tolerance,
                edge_affinity: colony.genome.edge_affinity,
                quorum_active: colony.signal_strength > colony.genome.quorum_threshold,
            };
        }

        let shared = Arc::new(SpreadShared {
            grid: Arc::clone(&self.grid),
            stats: Arc::clone(&self.stats),
            params,
            signals: self.fields.signals.clone(),
            signal_source: self.fields.signal_source.clone(),
            alarms: self.fields.alarms.clone(),
        });

        for &region in &self.regions {
            let shared = Arc::clone(&shared);
            self.pool.submit(Box::new(move |ctx| {
                spread_region(&shared, region, ctx);
            }));
        }
        self.pool.wait();
    }
}

fn age_region(grid: &CellGrid, region: Region) {
    for y in region.y0..region.y1 {
        for x in region.x0..region.x1 {
            let cell = grid.cell(grid.index(x, y));
            if !cell.is_empty() {
                cell.bump_age();
            }
        }
    }
}

fn spread_region(shared: &SpreadShared, region: Region, ctx: &mut WorkerCtx) {
    let grid = &shared.grid;
    let width = grid.width();
    for y in region.y0..region.y1 {
        for x in region.x0..region.x1 {
            let cell = grid.cell(y * width + x);
            let id = cell.colony_id();
            if id == 0 {
                continue;
            }
            // Cells claimed during this tick's spread carry age 0 and must
            // not cascade further within the tick.
            if cell.age() == 0 {
                continue;
            }
            // Ids beyond the stats array are skipped entirely: their claims
            // could not be counted (growth degraded, see error policy).
            if id as usize >= shared.stats.len() {
                continue;
            }
            let Some(params) = shared.params.get(id as usize) else {
                continue;
            };
            if !params.active || params.dormant {
                continue;
            }

            for (d, (dx, dy)) in NEIGHBORS_8.iter().enumerate() {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if !grid.in_bounds(nx, ny) {
                    continue;
                }
                let target_idx = ny as usize * width + nx as usize;
                let target = grid.cell(target_idx);
                if target.colony_id() != 0 {
                    // Occupied by us or by a rival: direct overwrite is
                    // forbidden here, combat resolves rivals serially.
                    continue;
                }

                let noise: f32 = ctx.rng.random_range(0.6..1.4);
                let social = social_influence(shared, params, id, d, target_idx, nx, ny, ctx);
                let prob = params.spread_rate
                    * params.metabolism
                    * params.spread_weights[d]
                    * DIR_WEIGHT[d]
                    * noise
                    * social;

                if ctx.rng.random::<f32>() < prob && CellGrid::try_claim(target, 0, id) {
                    target.age.store(0, Ordering::Relaxed);
                    shared.stats[id as usize].add_cells(1);
                }
            }
        }
    }
}

/// Social multiplier in [0.3, 2.0]: own scent attracts, foreign scent acts
/// through `social_factor`, alarms damp, the decision layer biases each
/// direction, quorum activation boosts expansion, and a sparse scan of up
/// to `max_tracked` nearby cells folds local crowding in against
/// `density_tolerance`.
#[allow(clippy::too_many_arguments)]
fn social_influence(
    shared: &SpreadShared,
    params: &SpreadParams,
    id: u32,
    d: usize,
    target_idx: usize,
    x: i32,
    y: i32,
    ctx: &mut WorkerCtx,
) -> f32 {
    let mut influence = 1.0f32 + 0.15 * params.hidden_weights[d];

    let scent = shared.signals[target_idx];
    if scent > 0.0 {
        let direction = if shared.signal_source[target_idx] == id {
            1.0
        } else {
            params.social_factor
        };
        influence += scent * params.signal_sensitivity * direction;
    }
    influence -= shared.alarms[target_idx] * params.signal_sensitivity * 0.5;
    if params.quorum_active {
        influence += 0.2;
    }

    // Frontier pull: cells within two steps of the grid edge.
    let grid = &shared.grid;
    let near_edge = x < 2
        || y < 2
        || x >= grid.width() as i32 - 2
        || y >= grid.height() as i32 - 2;
    if near_edge {
        influence += 0.3 * params.edge_affinity;
    }

    let radius = 1 + (params.detection_range * 3.0) as i32;
    let mut sampled = 0u32;
    let mut rivals = 0u32;
    for _ in 0..params.max_tracked {
        let ox = ctx.rng.random_range(-radius..=radius);
        let oy = ctx.rng.random_range(-radius..=radius);
        if let Some(cell) = grid.get(x + ox, y + oy) {
            sampled += 1;
            let owner = cell.colony_id();
            if owner != 0 && owner != id {
                rivals += 1;
            }
        }
    }
    if sampled > 0 {
        let crowd = rivals as f32 / sampled as f32;
        influence += params.social_factor * 0.4 * crowd;
        influence -= (crowd - params.density_tolerance).max(0.0) * 0.4;
    }

    influence.clamp(0.3, 2.0)
}
