pub mod parallel;
pub mod serial;
#[cfg(test)]
mod tests;

use crate::colony::{grow_stats, Colony, ColonyError, ColonyStats, ColonyTable};
use crate::command::Command;
use crate::fields::EnvFields;
use crate::genome::Genome;
use crate::grid::CellGrid;
use crate::pool::WorkerPool;
use crate::snapshot::{rle_encode, truncate_name, ColonySnapshot, WorldSnapshot};
use parallel::Region;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// World construction parameters. There is no runtime reconfiguration; a
/// `reset` command rebuilds the world from the same config with a fresh seed.
#[derive(Clone, Debug)]
pub struct WorldConfig {
    pub width: usize,
    pub height: usize,
    pub initial_colonies: usize,
    pub workers: usize,
    pub seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 200,
            height: 120,
            initial_colonies: 6,
            workers: 4,
            seed: 42,
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), WorldInitError> {
        if self.width == 0 || self.height == 0 {
            return Err(WorldInitError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.workers == 0 {
            return Err(WorldInitError::InvalidWorkerCount);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldInitError {
    InvalidDimensions { width: usize, height: usize },
    InvalidWorkerCount,
}

impl fmt::Display for WorldInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldInitError::InvalidDimensions { width, height } => {
                write!(f, "world dimensions must be positive, got {width}x{height}")
            }
            WorldInitError::InvalidWorkerCount => write!(f, "worker count must be at least 1"),
        }
    }
}

impl Error for WorldInitError {}

/// Wall-clock section timings for one tick.
#[derive(Clone, Debug, Default)]
pub struct TickTimings {
    pub age_us: u64,
    pub spread_us: u64,
    pub serial_us: u64,
    pub total_us: u64,
}

/// Per-tick event counters, reset at tick start.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TickMetrics {
    pub tick: u64,
    pub active_colonies: usize,
    pub occupied_cells: usize,
    pub deaths: usize,
    pub combat_flips: usize,
    pub speciations: usize,
    pub divisions: usize,
    pub merges: usize,
    pub spawns: usize,
    pub nutrient_total: f64,
    pub toxin_total: f64,
}

const NAME_ROOTS: [&str; 12] = [
    "Vor", "Myx", "Cla", "Teth", "Aru", "Pell", "Quor", "Sarn", "Ill", "Gryx", "Ost", "Nev",
];
const NAME_STEMS: [&str; 10] = [
    "ula", "ides", "ax", "ospora", "ellum", "ivora", "una", "aster", "omys", "ix",
];

fn generate_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let root = NAME_ROOTS[rng.random_range(0..NAME_ROOTS.len())];
    let stem = NAME_STEMS[rng.random_range(0..NAME_STEMS.len())];
    format!("{root}{stem}")
}

/// The simulation world: atomic cell grid, colony table, environmental
/// fields, and the worker pool that drives the parallel phases.
pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) grid: Arc<CellGrid>,
    pub(crate) stats: Arc<Vec<ColonyStats>>,
    pub(crate) colonies: ColonyTable,
    pub(crate) fields: EnvFields,
    pub(crate) pool: WorkerPool,
    pub(crate) rng: ChaCha12Rng,
    pub(crate) regions: Vec<Region>,
    /// Serial-only flood-fill scratch, -1 = unlabeled.
    pub(crate) component_scratch: Vec<i8>,
    pub(crate) cells_by_colony: Vec<Vec<usize>>,
    pub(crate) pending_commands: Vec<Command>,
    pub(crate) paused: bool,
    pub(crate) speed_multiplier: f32,
    pub(crate) tick: u64,
    pub(crate) selected_colony: u32,
    pub(crate) metrics: TickMetrics,
    pub(crate) id_exhausted_logged: bool,
}

impl World {
    pub fn new(config: WorldConfig) -> Result<Self, WorldInitError> {
        config.validate()?;
        let per_side = if config.workers > 4 { 4 } else { 2 };
        let grid = Arc::new(CellGrid::new(config.width, config.height));
        let len = grid.len();
        let mut world = Self {
            grid,
            stats: Arc::new(Vec::new()),
            colonies: ColonyTable::new(),
            fields: EnvFields::new(config.width, config.height),
            pool: WorkerPool::new(config.workers, config.seed),
            rng: ChaCha12Rng::seed_from_u64(config.seed),
            regions: parallel::make_regions(config.width, config.height, per_side),
            component_scratch: vec![-1; len],
            cells_by_colony: Vec::new(),
            pending_commands: Vec::new(),
            paused: false,
            speed_multiplier: 1.0,
            tick: 0,
            selected_colony: 0,
            metrics: TickMetrics::default(),
            id_exhausted_logged: false,
            config,
        };
        world.seed_initial_colonies();
        Ok(world)
    }

    pub fn width(&self) -> usize {
        self.config.width
    }

    pub fn height(&self) -> usize {
        self.config.height
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.speed_multiplier
    }

    /// Advisory selection from the last `select_colony` command.
    pub fn selected_colony(&self) -> u32 {
        self.selected_colony
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn colonies(&self) -> &ColonyTable {
        &self.colonies
    }

    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    pub fn fields(&self) -> &EnvFields {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut EnvFields {
        &mut self.fields
    }

    pub fn stats_for(&self, id: u32) -> Option<&ColonyStats> {
        self.stats.get(id as usize)
    }

    fn seed_initial_colonies(&mut self) {
        for _ in 0..self.config.initial_colonies {
            let genome = Genome::random(&mut self.rng);
            let name = generate_name(&mut self.rng);
            // A handful of placement attempts; a crowded grid just seeds
            // fewer genesis colonies.
            for _ in 0..32 {
                let x = self.rng.random_range(0..self.config.width);
                let y = self.rng.random_range(0..self.config.height);
                if self
                    .spawn_colony_cell(x, y, name.clone(), genome.clone(), 0)
                    .is_some()
                {
                    break;
                }
            }
        }
    }

    /// Register a colony and make sure its atomic stats row exists. Growth
    /// failure degrades gracefully: the colony exists but its counters are
    /// skipped by parallel phases until a later growth succeeds.
    pub(crate) fn add_colony(
        &mut self,
        name: String,
        genome: Genome,
        parent_id: u32,
    ) -> Result<u32, ColonyError> {
        let shape_seed = self.rng.random();
        let colony = Colony::new(0, name, genome, parent_id, shape_seed);
        let id = match self.colonies.add_colony(colony) {
            Ok(id) => id,
            Err(e) => {
                if !self.id_exhausted_logged {
                    warn!("colony id space exhausted; no new colonies until reset");
                    self.id_exhausted_logged = true;
                }
                return Err(e);
            }
        };
        if !grow_stats(&mut self.stats, id as usize + 1) {
            warn!(id, "stats array growth failed; counters for this colony degrade");
        }
        Ok(id)
    }

    /// Seed a single-cell colony at (x, y) if the cell is empty.
    pub(crate) fn spawn_colony_cell(
        &mut self,
        x: usize,
        y: usize,
        name: String,
        genome: Genome,
        parent_id: u32,
    ) -> Option<u32> {
        if x >= self.config.width || y >= self.config.height {
            return None;
        }
        let idx = self.grid.index(x, y);
        if !self.grid.cell(idx).is_empty() {
            return None;
        }
        let id = self.add_colony(name, genome, parent_id).ok()?;
        self.grid.set_owner(idx, id);
        if let Some(stats) = self.stats.get(id as usize) {
            stats.add_cells(1);
        }
        if let Some(colony) = self.colonies.get_any_mut(id) {
            colony.centroid = [x as f32, y as f32];
            colony.last_population = 1;
        }
        Some(id)
    }

    /// Queue a command for application at the start of the next tick.
    pub fn push_command(&mut self, command: Command) {
        self.pending_commands.push(command);
    }

    fn apply_command(&mut self, command: Command) {
        match command {
            Command::Pause => self.paused = true,
            Command::Resume => self.paused = false,
            Command::SpeedUp => {
                self.speed_multiplier = (self.speed_multiplier * 1.5).clamp(0.1, 100.0);
            }
            Command::SlowDown => {
                self.speed_multiplier = (self.speed_multiplier / 1.5).clamp(0.1, 100.0);
            }
            Command::Reset => self.reset(),
            Command::SelectColony { id } => self.selected_colony = id,
            Command::SpawnColony { x, y, name } => {
                let genome = Genome::random(&mut self.rng);
                let name = if name.is_empty() {
                    generate_name(&mut self.rng)
                } else {
                    name
                };
                self.spawn_colony_cell(x as usize, y as usize, name, genome, 0);
            }
        }
    }

    /// Tear down and reinitialize with fresh random colonies. The reseed is
    /// drawn from the current RNG so consecutive resets differ.
    pub fn reset(&mut self) {
        let seed: u64 = self.rng.random();
        let len = self.grid.len();
        self.grid = Arc::new(CellGrid::new(self.config.width, self.config.height));
        self.stats = Arc::new(Vec::new());
        self.colonies = ColonyTable::new();
        self.fields = EnvFields::new(self.config.width, self.config.height);
        self.rng = ChaCha12Rng::seed_from_u64(seed);
        self.component_scratch = vec![-1; len];
        self.cells_by_colony.clear();
        self.tick = 0;
        self.selected_colony = 0;
        self.metrics = TickMetrics::default();
        self.id_exhausted_logged = false;
        self.seed_initial_colonies();
        debug!(seed, "world reset");
    }

    /// Advance the world one tick: drain commands, run the parallel age and
    /// spread phases with a barrier after each, then the serial phases in
    /// their fixed order. A paused world applies commands but is otherwise
    /// left untouched.
    pub fn tick(&mut self) -> TickTimings {
        let total_start = Instant::now();

        let commands = std::mem::take(&mut self.pending_commands);
        for command in commands {
            self.apply_command(command);
        }
        if self.paused {
            return TickTimings {
                total_us: total_start.elapsed().as_micros() as u64,
                ..TickTimings::default()
            };
        }

        self.metrics = TickMetrics {
            tick: self.tick + 1,
            ..TickMetrics::default()
        };

        let t0 = Instant::now();
        self.run_age_phase();
        let age_us = t0.elapsed().as_micros() as u64;

        let t1 = Instant::now();
        self.run_spread_phase();
        let spread_us = t1.elapsed().as_micros() as u64;

        let t2 = Instant::now();
        self.run_serial_phases();
        let serial_us = t2.elapsed().as_micros() as u64;

        self.tick += 1;

        TickTimings {
            age_us,
            spread_us,
            serial_us,
            total_us: total_start.elapsed().as_micros() as u64,
        }
    }

    /// Build the renderer-facing view. Call between ticks; the result is
    /// detached from world state.
    pub fn snapshot(&self, include_grid: bool) -> WorldSnapshot {
        let colonies = self
            .colonies
            .iter_active()
            .map(|colony| {
                let (population, peak) = self
                    .stats
                    .get(colony.id as usize)
                    .map(|s| (s.cell_count(), s.max_cell_count()))
                    .unwrap_or((0, 0));
                ColonySnapshot {
                    id: colony.id,
                    name: truncate_name(&colony.name),
                    x: colony.centroid[0],
                    y: colony.centroid[1],
                    radius: (population.max(0) as f32 / std::f32::consts::PI).sqrt(),
                    population,
                    peak_population: peak,
                    growth_rate: colony.last_growth as f32,
                    color: colony.color,
                    alive: population > 0,
                    shape_seed: colony.shape_seed,
                    wobble_phase: colony.wobble_phase,
                    shape_evolution: colony.shape_evolution,
                    aggression: colony.genome.aggression,
                    defense: colony.genome.resilience,
                    metabolism: colony.genome.metabolism,
                    toxin_production: colony.genome.toxin_production,
                    spread_rate: colony.genome.spread_rate,
                }
            })
            .collect();

        let grid = include_grid.then(|| {
            let cells: Vec<u16> = (0..self.grid.len())
                .map(|idx| self.grid.cell(idx).colony_id() as u16)
                .collect();
            rle_encode(&cells)
        });

        WorldSnapshot {
            width: self.config.width as u32,
            height: self.config.height as u32,
            tick: self.tick,
            paused: self.paused,
            speed_multiplier: self.speed_multiplier,
            colonies,
            grid,
        }
    }
}
