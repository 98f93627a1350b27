use crate::genome::Genome;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

/// High-level colony condition, recomputed each tick by the behavior phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColonyState {
    #[default]
    Normal,
    Stressed,
    Dormant,
}

/// Colony metadata. Mutated only in serial phases; population counters live
/// in the separate atomic [`ColonyStats`] rows.
#[derive(Clone, Debug)]
pub struct Colony {
    pub id: u32,
    pub name: String,
    pub genome: Genome,
    /// Ticks since creation.
    pub age: u64,
    /// 0 for genesis colonies.
    pub parent_id: u32,
    pub active: bool,
    pub color: [u8; 3],
    pub shape_seed: u32,
    pub wobble_phase: f32,
    pub shape_evolution: f32,
    pub state: ColonyState,
    pub is_dormant: bool,
    pub stress_level: f32,
    pub biofilm_strength: f32,
    pub drift: [f32; 2],
    pub signal_strength: f32,
    /// Per-direction EWMA of attack outcomes, indexed like `NEIGHBORS_8`.
    pub success_history: [f32; 8],
    pub last_population: i64,
    /// Population delta observed by the latest behavior update.
    pub last_growth: i64,
    pub centroid: [f32; 2],
}

impl Colony {
    pub fn new(id: u32, name: String, genome: Genome, parent_id: u32, shape_seed: u32) -> Self {
        let color = genome.body_color;
        Self {
            id,
            name,
            genome,
            age: 0,
            parent_id,
            active: true,
            color,
            shape_seed,
            wobble_phase: 0.0,
            shape_evolution: 0.0,
            state: ColonyState::Normal,
            is_dormant: false,
            stress_level: 0.0,
            biofilm_strength: 0.0,
            drift: [0.0; 2],
            signal_strength: 0.0,
            success_history: [0.0; 8],
            last_population: 0,
            last_growth: 0,
            centroid: [0.0; 2],
        }
    }
}

/// Atomic per-colony counters, kept apart from the metadata so the parallel
/// phases touch a dense cache-friendly array indexed by colony id.
///
/// `cell_count` is signed: CAS races during spread can transiently
/// under-count, and the serial sync reconciles from the actual grid.
#[derive(Debug, Default)]
pub struct ColonyStats {
    pub cell_count: AtomicI64,
    pub max_cell_count: AtomicI64,
    pub generation: AtomicU32,
}

impl ColonyStats {
    pub fn cell_count(&self) -> i64 {
        self.cell_count.load(Ordering::Relaxed)
    }

    pub fn max_cell_count(&self) -> i64 {
        self.max_cell_count.load(Ordering::Relaxed)
    }

    /// Add `delta` cells and, on growth, raise the monotone peak.
    pub fn add_cells(&self, delta: i64) {
        let now = self.cell_count.fetch_add(delta, Ordering::AcqRel) + delta;
        if delta > 0 {
            self.raise_peak(now);
        }
    }

    /// Lock-free CAS-max of `max_cell_count`.
    pub fn raise_peak(&self, candidate: i64) {
        let mut peak = self.max_cell_count.load(Ordering::Relaxed);
        while candidate > peak {
            match self.max_cell_count.compare_exchange_weak(
                peak,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => peak = observed,
            }
        }
    }

    /// Serial reconciliation from a grid recount.
    pub fn set_count(&self, count: i64) {
        self.cell_count.store(count, Ordering::Release);
        self.raise_peak(count);
    }
}

/// Grow a stats array to cover ids `< min_len`, doubling geometrically.
///
/// Counter values carry over. Returns `false` when the allocation fails, in
/// which case the old array stays in place and cells with ids beyond its
/// capacity are skipped by the parallel phases until a later growth succeeds.
pub fn grow_stats(stats: &mut Arc<Vec<ColonyStats>>, min_len: usize) -> bool {
    if stats.len() >= min_len {
        return true;
    }
    let new_len = min_len.max(stats.len().saturating_mul(2)).max(16);
    let mut grown: Vec<ColonyStats> = Vec::new();
    if grown.try_reserve_exact(new_len).is_err() {
        return false;
    }
    for row in stats.iter() {
        grown.push(ColonyStats {
            cell_count: AtomicI64::new(row.cell_count()),
            max_cell_count: AtomicI64::new(row.max_cell_count()),
            generation: AtomicU32::new(row.generation.load(Ordering::Relaxed)),
        });
    }
    grown.resize_with(new_len, ColonyStats::default);
    *stats = Arc::new(grown);
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColonyError {
    /// The id counter saturated; no new colonies until reset.
    IdExhausted,
}

impl fmt::Display for ColonyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColonyError::IdExhausted => write!(f, "colony id space exhausted"),
        }
    }
}

impl Error for ColonyError {}

/// Dense colony storage plus an id→index lookup grown by doubling.
///
/// Ids are handed out by an atomic counter starting at 1 and never reused
/// within a run; deactivation is soft so `by_id` entries stay valid for the
/// lifetime of the world.
pub struct ColonyTable {
    colonies: Vec<Colony>,
    by_id: Vec<Option<usize>>,
    next_id: AtomicU32,
}

impl Default for ColonyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ColonyTable {
    pub fn new() -> Self {
        Self {
            colonies: Vec::new(),
            by_id: vec![None; 16],
            next_id: AtomicU32::new(1),
        }
    }

    pub fn next_id_hint(&self) -> u32 {
        self.next_id.load(Ordering::Relaxed)
    }

    /// Insert `colony`, assigning its id. Fails with `IdExhausted` when the
    /// counter saturates; the table is left untouched in that case.
    pub fn add_colony(&mut self, mut colony: Colony) -> Result<u32, ColonyError> {
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        if id == u32::MAX {
            // Park the counter at the ceiling so later calls keep failing
            // instead of wrapping.
            self.next_id.store(u32::MAX, Ordering::Release);
            return Err(ColonyError::IdExhausted);
        }
        colony.id = id;
        let slot = self.colonies.len();
        if id as usize >= self.by_id.len() {
            let grown = (id as usize + 1).max(self.by_id.len() * 2);
            self.by_id.resize(grown, None);
        }
        self.colonies.push(colony);
        self.by_id[id as usize] = Some(slot);
        Ok(id)
    }

    /// Lookup an *active* colony by id.
    pub fn get(&self, id: u32) -> Option<&Colony> {
        self.get_any(id).filter(|c| c.active)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Colony> {
        let slot = *self.by_id.get(id as usize)?;
        let colony = &mut self.colonies[slot?];
        colony.active.then_some(colony)
    }

    /// Lookup ignoring the active flag; deactivated entries remain resolvable
    /// for the rest of the run.
    pub fn get_any(&self, id: u32) -> Option<&Colony> {
        let slot = (*self.by_id.get(id as usize)?)?;
        Some(&self.colonies[slot])
    }

    pub fn get_any_mut(&mut self, id: u32) -> Option<&mut Colony> {
        let slot = (*self.by_id.get(id as usize)?)?;
        Some(&mut self.colonies[slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Colony> {
        self.colonies.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Colony> {
        self.colonies.iter_mut()
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &Colony> {
        self.colonies.iter().filter(|c| c.active)
    }

    pub fn active_count(&self) -> usize {
        self.colonies.iter().filter(|c| c.active).count()
    }

    pub fn len(&self) -> usize {
        self.colonies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colonies.is_empty()
    }

    pub fn active_ids(&self) -> Vec<u32> {
        self.colonies
            .iter()
            .filter(|c| c.active)
            .map(|c| c.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn colony(name: &str) -> Colony {
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        Colony::new(0, name.to_string(), Genome::random(&mut rng), 0, 42)
    }

    #[test]
    fn ids_are_assigned_monotonically_from_one() {
        let mut table = ColonyTable::new();
        let a = table.add_colony(colony("a")).unwrap();
        let b = table.add_colony(colony("b")).unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(table.get(1).unwrap().name, "a");
        assert_eq!(table.get(2).unwrap().name, "b");
    }

    #[test]
    fn lookup_grows_past_initial_capacity() {
        let mut table = ColonyTable::new();
        for i in 0..100 {
            table.add_colony(colony(&format!("c{i}"))).unwrap();
        }
        assert_eq!(table.get(100).unwrap().name, "c99");
        assert!(table.get(101).is_none());
    }

    #[test]
    fn deactivated_colonies_hide_from_get_but_not_get_any() {
        let mut table = ColonyTable::new();
        let id = table.add_colony(colony("x")).unwrap();
        table.get_any_mut(id).unwrap().active = false;
        assert!(table.get(id).is_none());
        assert!(table.get_any(id).is_some());
        assert_eq!(table.active_count(), 0);
    }

    #[test]
    fn stats_peak_is_monotone_under_adds_and_removals() {
        let stats = ColonyStats::default();
        stats.add_cells(10);
        stats.add_cells(-4);
        stats.add_cells(2);
        assert_eq!(stats.cell_count(), 8);
        assert_eq!(stats.max_cell_count(), 10);
        stats.set_count(25);
        assert_eq!(stats.max_cell_count(), 25);
        stats.set_count(3);
        assert_eq!(stats.max_cell_count(), 25, "peak never decreases");
    }

    #[test]
    fn stats_growth_preserves_counters() {
        let mut stats = Arc::new(vec![ColonyStats::default(), ColonyStats::default()]);
        stats[1].set_count(7);
        assert!(grow_stats(&mut stats, 40));
        assert!(stats.len() >= 40);
        assert_eq!(stats[1].cell_count(), 7);
        assert_eq!(stats[1].max_cell_count(), 7);
        assert_eq!(stats[0].cell_count(), 0);
    }

    #[test]
    fn concurrent_adds_reconcile() {
        let stats = Arc::new(ColonyStats::default());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let stats = Arc::clone(&stats);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    stats.add_cells(1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.cell_count(), 4000);
        assert_eq!(stats.max_cell_count(), 4000);
    }
}
