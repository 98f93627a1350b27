//! Serial phases, run in a fixed order after the parallel barrier:
//! sync → environment → scents → combat → turnover → mutation → divisions →
//! recombination → spawn → behavior → forward sync.
//!
//! Only this code mutates colony metadata and the environmental fields.

use super::{generate_name, World};
use crate::genome::Genome;
use crate::grid::{NEIGHBORS_4, NEIGHBORS_8};
use rand::Rng;
use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::sync::atomic::Ordering;
use tracing::debug;

const NUTRIENT_DEPLETION_BASE: f32 = 0.006;
const NUTRIENT_REGEN: f32 = 0.0025;
const NUTRIENT_DEATH_RETURN: f32 = 0.2;
const TOXIN_DECAY: f32 = 0.95;
const TOXIN_EMIT_BASE: f32 = 0.04;
const TOXIN_VULNERABILITY_BORDER: f32 = 0.3;
const TOXIN_VULNERABILITY_INTERIOR: f32 = 0.15;
const SCENT_EMIT_BASE: f32 = 0.3;
const BASE_DEATH_CHANCE: f32 = 0.0015;
const OLD_AGE_START: u8 = 140;
const SPECIATION_DISTANCE: f32 = 0.15;
const SPECIATION_MIN_CELLS: i64 = 20;
const SPECIATION_TRANSFER_FRACTION: f32 = 0.15;
const MIN_COMPONENT_CELLS: usize = 5;
const MAX_COMPONENTS: i8 = 127;
const FORCED_SPAWN_BELOW: usize = 4;

impl World {
    pub(crate) fn run_serial_phases(&mut self) {
        self.sync_from_grid();
        self.update_environment();
        self.update_scents();
        self.run_combat();
        self.run_turnover();
        self.run_mutation();
        self.check_divisions();
        self.check_recombinations();
        self.dynamic_spawn();
        self.update_behavior();
        self.sync_forward();
    }

    /// Reconcile per-colony `cell_count` from a full grid recount and return
    /// the number of occupied cells. Ids beyond the stats array are counted
    /// as occupied but tracked nowhere, matching the degraded-growth policy.
    fn reconcile_counts(&mut self) -> usize {
        let len = self.stats.len();
        let mut counts = vec![0i64; len];
        let mut sums = vec![[0.0f64; 2]; len];
        let mut occupied = 0usize;
        let width = self.grid.width();
        for idx in 0..self.grid.len() {
            let id = self.grid.cell(idx).colony_id() as usize;
            if id == 0 {
                continue;
            }
            occupied += 1;
            if id < len {
                counts[id] += 1;
                sums[id][0] += (idx % width) as f64;
                sums[id][1] += (idx / width) as f64;
            }
        }
        for (id, &count) in counts.iter().enumerate() {
            self.stats[id].set_count(count);
            if count > 0 {
                if let Some(colony) = self.colonies.get_any_mut(id as u32) {
                    colony.centroid = [
                        (sums[id][0] / count as f64) as f32,
                        (sums[id][1] / count as f64) as f32,
                    ];
                }
            }
        }
        occupied
    }

    /// Phase 1: fold the parallel phase's atomic writes back into the serial
    /// view: exact recount, fresh border flags.
    fn sync_from_grid(&mut self) {
        self.reconcile_counts();
        self.grid.refresh_borders();
    }

    /// Phase 2: nutrients deplete under occupation and regenerate on empty
    /// cells; toxins decay globally, border cells emit, then a damage pass
    /// kills exposed cells.
    fn update_environment(&mut self) {
        // Nutrients.
        for idx in 0..self.grid.len() {
            let id = self.grid.cell(idx).colony_id();
            if id == 0 {
                self.fields.regen_nutrient(idx, NUTRIENT_REGEN);
                continue;
            }
            if let Some(colony) = self.colonies.get(id) {
                let g = &colony.genome;
                let amount =
                    NUTRIENT_DEPLETION_BASE * g.metabolism * (1.0 - 0.5 * g.efficiency);
                self.fields.deplete_nutrient(idx, amount);
            }
        }

        // Toxins: global decay, then emission around borders.
        self.fields.decay_toxins(TOXIN_DECAY);
        let width = self.grid.width() as i32;
        for idx in 0..self.grid.len() {
            let cell = self.grid.cell(idx);
            let id = cell.colony_id();
            if id == 0 || !cell.is_border.load(Ordering::Relaxed) {
                continue;
            }
            let Some(colony) = self.colonies.get(id) else {
                continue;
            };
            let g = &colony.genome;
            if g.toxin_production <= 0.0 {
                continue;
            }
            let amount = TOXIN_EMIT_BASE * g.toxin_production * (1.0 + 0.5 * g.defense_priority);
            let x = (idx as i32) % width;
            let y = (idx as i32) / width;
            self.fields.deposit_toxin(x, y, amount, amount * 0.25);
        }

        // Damage pass.
        for idx in 0..self.grid.len() {
            let cell = self.grid.cell(idx);
            let id = cell.colony_id();
            if id == 0 {
                continue;
            }
            let Some(colony) = self.colonies.get(id) else {
                continue;
            };
            let g = &colony.genome;
            let vulnerability = if cell.is_border.load(Ordering::Relaxed) {
                TOXIN_VULNERABILITY_BORDER
            } else {
                TOXIN_VULNERABILITY_INTERIOR
            };
            let mut p = self.fields.toxins[idx] * (1.0 - g.toxin_resistance) * vulnerability;
            if colony.is_dormant {
                p *= 1.0 - 0.6 * g.dormancy_resistance;
            }
            if p > 0.0 && self.rng.random::<f32>() < p {
                self.grid.set_owner(idx, 0);
                if let Some(stats) = self.stats.get(id as usize) {
                    stats.add_cells(-1);
                }
                self.metrics.deaths += 1;
            }
        }
    }

    /// Phase 3: stage scent emission from occupied cells, then run the
    /// double-buffered diffusion for scent and the faster-fading alarms.
    pub(crate) fn update_scents(&mut self) {
        for idx in 0..self.grid.len() {
            let cell = self.grid.cell(idx);
            let id = cell.colony_id();
            if id == 0 {
                continue;
            }
            let Some(colony) = self.colonies.get(id) else {
                continue;
            };
            let mut amount = colony.genome.signal_emission * SCENT_EMIT_BASE;
            if cell.is_border.load(Ordering::Relaxed) {
                amount *= 2.0;
            }
            let count = self
                .stats
                .get(id as usize)
                .map(|s| s.cell_count())
                .unwrap_or(0);
            amount *= 1.0 + count.max(0) as f32 / 500.0;
            self.fields.stage_emission(idx, amount.min(1.0), id);
        }
        self.fields.diffuse_signals();
        self.fields.diffuse_alarms();
    }

    /// Phase 4: duels across 4-neighborhood borders. The attacker's learned
    /// per-direction success history grows on wins and decays on losses.
    fn run_combat(&mut self) {
        let width = self.grid.width() as i32;
        let height = self.grid.height() as i32;
        for idx in 0..self.grid.len() {
            let cell = self.grid.cell(idx);
            let attacker_id = cell.colony_id();
            if attacker_id == 0 || !cell.is_border.load(Ordering::Relaxed) {
                continue;
            }
            let x = (idx as i32) % width;
            let y = (idx as i32) / width;

            for (d4, (dx, dy)) in NEIGHBORS_4.iter().enumerate() {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= width || ny >= height {
                    continue;
                }
                let def_idx = (ny * width + nx) as usize;
                let def_cell = self.grid.cell(def_idx);
                let defender_id = def_cell.colony_id();
                if defender_id == 0
                    || defender_id == attacker_id
                    || !def_cell.is_border.load(Ordering::Relaxed)
                {
                    continue;
                }
                // Cardinal direction d4 maps onto the 8-direction tables.
                let d8 = d4 * 2;

                let (attack, learning_rate, engage) = {
                    let Some(attacker) = self.colonies.get(attacker_id) else {
                        continue;
                    };
                    let g = &attacker.genome;
                    let engage = self.rng.random::<f32>() < 0.15 + 0.35 * g.aggression;
                    let allies = self.count_neighbors_of(nx, ny, attacker_id);
                    let flanking = (1.0 + 0.2 * allies.saturating_sub(1) as f32).min(1.6);
                    let mut attack = g.aggression
                        * 1.2
                        * flanking
                        * g.spread_weights[d8]
                        * (1.0 + attacker.success_history[d8])
                        * (1.0 + 0.15 * g.specialization);
                    attack += g.toxin_production * 0.3;
                    attack -= self.fields.toxins[def_idx] * (1.0 - g.toxin_resistance) * 0.3;
                    attack += (self.fields.nutrients[idx] - 0.5) * 0.2;
                    (attack.max(0.0), g.learning_rate, engage)
                };
                if !engage {
                    continue;
                }

                let defense = {
                    let Some(defender) = self.colonies.get(defender_id) else {
                        continue;
                    };
                    let g = &defender.genome;
                    let own = self.count_neighbors_of(nx, ny, defender_id);
                    let formation = 1.0 + 0.3 * own as f32 / 8.0;
                    let mut defense = g.resilience
                        * formation
                        * (1.0 + defender.biofilm_strength * 0.3);
                    defense += g.toxin_resistance * 0.3;
                    defense -= (0.5 - self.fields.nutrients[def_idx]).max(0.0) * 0.2;
                    defense -= self.fields.toxins[def_idx] * (1.0 - g.toxin_resistance) * 0.3;
                    defense.max(0.0)
                };

                let noise = self.rng.random_range(0.8..1.2);
                let p = (attack / (attack + defense + 0.01) * noise).clamp(0.0, 0.95);
                if self.rng.random::<f32>() < p {
                    self.grid.set_owner(def_idx, attacker_id);
                    if let Some(stats) = self.stats.get(defender_id as usize) {
                        stats.add_cells(-1);
                    }
                    if let Some(stats) = self.stats.get(attacker_id as usize) {
                        stats.add_cells(1);
                    }
                    if let Some(attacker) = self.colonies.get_any_mut(attacker_id) {
                        let h = &mut attacker.success_history[d8];
                        *h = (*h + 0.05 * learning_rate).clamp(0.0, 1.0);
                    }
                    self.metrics.combat_flips += 1;
                } else if self.rng.random_bool(0.3) {
                    if let Some(attacker) = self.colonies.get_any_mut(attacker_id) {
                        let h = &mut attacker.success_history[d8];
                        *h = (*h - 0.02 * learning_rate).max(0.0);
                    }
                }
            }
        }
    }

    fn count_neighbors_of(&self, x: i32, y: i32, id: u32) -> usize {
        NEIGHBORS_8
            .iter()
            .filter(|(dx, dy)| {
                self.grid
                    .get(x + dx, y + dy)
                    .is_some_and(|c| c.colony_id() == id)
            })
            .count()
    }

    /// Phase 5: per-cell base death chance, modified by colony size, local
    /// nutrient shortfall, toxin excess, interior decay pressure, old age,
    /// and dormancy protection. Dead cells return nutrients.
    fn run_turnover(&mut self) {
        for idx in 0..self.grid.len() {
            let cell = self.grid.cell(idx);
            let id = cell.colony_id();
            if id == 0 {
                continue;
            }
            let Some(colony) = self.colonies.get(id) else {
                // Orphaned ownership (deactivated colony): clean up.
                self.grid.set_owner(idx, 0);
                continue;
            };
            let g = &colony.genome;
            let count = self
                .stats
                .get(id as usize)
                .map(|s| s.cell_count())
                .unwrap_or(0);

            let mut p = BASE_DEATH_CHANCE;
            p += (count as f32 / 5000.0).min(0.002);
            p += (0.35 - self.fields.nutrients[idx]).max(0.0)
                * 0.01
                * (0.5 + g.nutrient_sensitivity);
            p += (self.fields.toxins[idx] - 0.5).max(0.0) * 0.01 * (0.5 + g.toxin_sensitivity);
            if !cell.is_border.load(Ordering::Relaxed) && count > 150 {
                p += 0.001;
            }
            let age = cell.age();
            if age > OLD_AGE_START {
                p += (age - OLD_AGE_START) as f32 * 0.0002;
            }
            if colony.is_dormant {
                p *= 1.0 - 0.7 * g.dormancy_resistance;
            }

            if self.rng.random::<f32>() < p {
                // Heavy consumers leave less behind.
                let returned = NUTRIENT_DEATH_RETURN * (1.0 - 0.5 * g.resource_consumption);
                self.grid.set_owner(idx, 0);
                self.fields.regen_nutrient(idx, returned);
                if let Some(stats) = self.stats.get(id as usize) {
                    stats.add_cells(-1);
                }
                self.metrics.deaths += 1;
            }
        }

        // Emptied colonies are dropped here, softly: the table entry stays
        // resolvable for the rest of the run.
        let empty: Vec<u32> = self
            .colonies
            .iter_active()
            .filter(|c| {
                self.stats
                    .get(c.id as usize)
                    .map(|s| s.cell_count() <= 0)
                    .unwrap_or(true)
            })
            .map(|c| c.id)
            .collect();
        for id in empty {
            if let Some(colony) = self.colonies.get_any_mut(id) {
                colony.active = false;
                debug!(id, name = %colony.name, "colony died out");
            }
        }
    }

    /// Phase 6: genome mutation, escalating to speciation when the mutated
    /// genome drifts past the distance threshold on a large enough colony.
    fn run_mutation(&mut self) {
        let ids = self.colonies.active_ids();
        for id in ids {
            let (old_genome, stress, count) = {
                let Some(colony) = self.colonies.get(id) else {
                    continue;
                };
                let count = self
                    .stats
                    .get(id as usize)
                    .map(|s| s.cell_count())
                    .unwrap_or(0);
                (colony.genome.clone(), colony.stress_level, count)
            };

            let p = 0.01 + 0.04 * stress + 0.02 * (count as f32 / 1000.0).min(1.0);
            if !self.rng.random_bool(f64::from(p.clamp(0.0, 1.0))) {
                continue;
            }

            let mut mutated = old_genome.clone();
            mutated.mutate(&mut self.rng);
            let drift = old_genome.distance(&mutated);

            if drift > SPECIATION_DISTANCE && count >= SPECIATION_MIN_CELLS {
                // The child keeps the mutated genome; the parent reverts.
                if self.speciate(id, mutated) {
                    self.metrics.speciations += 1;
                }
                if let Some(colony) = self.colonies.get_any_mut(id) {
                    colony.genome = old_genome;
                }
            } else if let Some(colony) = self.colonies.get_any_mut(id) {
                colony.genome = mutated;
            }
        }
    }

    /// Carve a fragment of `parent_id` off into a new colony carrying
    /// `genome`, seeded by BFS from a random border cell.
    fn speciate(&mut self, parent_id: u32, genome: Genome) -> bool {
        let border_cells: Vec<usize> = (0..self.grid.len())
            .filter(|&idx| {
                let cell = self.grid.cell(idx);
                cell.colony_id() == parent_id && cell.is_border.load(Ordering::Relaxed)
            })
            .collect();
        if border_cells.is_empty() {
            return false;
        }
        let parent_count = self
            .stats
            .get(parent_id as usize)
            .map(|s| s.cell_count())
            .unwrap_or(0);
        let budget =
            ((parent_count as f32 * SPECIATION_TRANSFER_FRACTION).ceil() as usize).max(2);

        let seed = border_cells[self.rng.random_range(0..border_cells.len())];
        let width = self.grid.width() as i32;
        let height = self.grid.height() as i32;
        let mut transfer = Vec::with_capacity(budget);
        let mut queue = VecDeque::from([seed]);
        let mut seen = vec![seed];
        self.component_scratch[seed] = 1;
        while let Some(idx) = queue.pop_front() {
            if transfer.len() >= budget {
                break;
            }
            transfer.push(idx);
            let x = (idx as i32) % width;
            let y = (idx as i32) / width;
            for (dx, dy) in NEIGHBORS_8 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= width || ny >= height {
                    continue;
                }
                let n = (ny * width + nx) as usize;
                if self.component_scratch[n] == -1 && self.grid.cell(n).colony_id() == parent_id
                {
                    self.component_scratch[n] = 1;
                    seen.push(n);
                    queue.push_back(n);
                }
            }
        }
        for idx in seen {
            self.component_scratch[idx] = -1;
        }
        if transfer.len() < 2 {
            return false;
        }

        let name = generate_name(&mut self.rng);
        let Ok(child_id) = self.add_colony(name, genome, parent_id) else {
            return false;
        };
        for &idx in &transfer {
            self.grid.relabel(idx, child_id);
        }
        let moved = transfer.len() as i64;
        if let Some(stats) = self.stats.get(parent_id as usize) {
            stats.add_cells(-moved);
        }
        if let Some(stats) = self.stats.get(child_id as usize) {
            stats.add_cells(moved);
            let parent_gen = self
                .stats
                .get(parent_id as usize)
                .map(|s| s.generation.load(Ordering::Relaxed))
                .unwrap_or(0);
            stats.generation.store(parent_gen + 1, Ordering::Relaxed);
        }
        debug!(parent = parent_id, child = child_id, cells = moved, "speciation");
        true
    }

    /// Phase 7: flood-fill each colony's cells over 8-connectivity. Extra
    /// sizeable components become new colonies; fragments below the size
    /// floor are cleared. Component ids are 8-bit; labeling stops at the cap
    /// and unlabeled cells stay with the retained main mass.
    pub(crate) fn check_divisions(&mut self) {
        let id_span = self.colonies.next_id_hint() as usize;
        if self.cells_by_colony.len() < id_span {
            self.cells_by_colony.resize_with(id_span, Vec::new);
        }
        for list in &mut self.cells_by_colony {
            list.clear();
        }
        for idx in 0..self.grid.len() {
            let id = self.grid.cell(idx).colony_id() as usize;
            if id != 0 && id < self.cells_by_colony.len() {
                self.cells_by_colony[id].push(idx);
            }
        }

        let ids = self.colonies.active_ids();
        let width = self.grid.width() as i32;
        let height = self.grid.height() as i32;
        for id in ids {
            let cells = std::mem::take(&mut self.cells_by_colony[id as usize]);
            if cells.len() < 2 {
                self.cells_by_colony[id as usize] = cells;
                continue;
            }

            let mut components: Vec<Vec<usize>> = Vec::new();
            for &start in &cells {
                if self.component_scratch[start] != -1 {
                    continue;
                }
                if components.len() as i8 >= MAX_COMPONENTS {
                    break;
                }
                let label = components.len() as i8;
                let mut component = Vec::new();
                let mut queue = VecDeque::from([start]);
                self.component_scratch[start] = label;
                while let Some(idx) = queue.pop_front() {
                    component.push(idx);
                    let x = (idx as i32) % width;
                    let y = (idx as i32) / width;
                    for (dx, dy) in NEIGHBORS_8 {
                        let (nx, ny) = (x + dx, y + dy);
                        if nx < 0 || ny < 0 || nx >= width || ny >= height {
                            continue;
                        }
                        let n = (ny * width + nx) as usize;
                        if self.component_scratch[n] == -1
                            && self.grid.cell(n).colony_id() == id
                        {
                            self.component_scratch[n] = label;
                            queue.push_back(n);
                        }
                    }
                }
                components.push(component);
            }

            for &idx in &cells {
                self.component_scratch[idx] = -1;
            }

            if components.len() > 1 {
                self.split_components(id, components);
            }
            self.cells_by_colony[id as usize] = cells;
        }
    }

    fn split_components(&mut self, id: u32, mut components: Vec<Vec<usize>>) {
        let largest = components
            .iter()
            .enumerate()
            .max_by_key(|(_, c)| c.len())
            .map(|(i, _)| i)
            .unwrap_or(0);
        // The largest component stays with the original id.
        components.swap_remove(largest);

        let parent_genome = match self.colonies.get(id) {
            Some(c) => c.genome.clone(),
            None => return,
        };
        for component in components {
            if component.len() >= MIN_COMPONENT_CELLS {
                let mut genome = parent_genome.clone();
                genome.mutate(&mut self.rng);
                let name = generate_name(&mut self.rng);
                let Ok(child_id) = self.add_colony(name, genome, id) else {
                    continue;
                };
                for &idx in &component {
                    self.grid.relabel(idx, child_id);
                }
                let moved = component.len() as i64;
                let parent_gen = self
                    .stats
                    .get(id as usize)
                    .map(|s| s.generation.load(Ordering::Relaxed))
                    .unwrap_or(0);
                if let Some(stats) = self.stats.get(id as usize) {
                    stats.add_cells(-moved);
                }
                if let Some(stats) = self.stats.get(child_id as usize) {
                    stats.add_cells(moved);
                    stats.generation.store(parent_gen + 1, Ordering::Relaxed);
                }
                self.metrics.divisions += 1;
                debug!(parent = id, child = child_id, cells = moved, "division");
            } else {
                // Fragmentation: too small to survive on its own.
                for &idx in &component {
                    self.grid.set_owner(idx, 0);
                }
                if let Some(stats) = self.stats.get(id as usize) {
                    stats.add_cells(-(component.len() as i64));
                }
                self.metrics.deaths += component.len();
            }
        }
    }

    /// Phase 8: merge lineage-related colonies in contact whose genomes are
    /// close enough. The larger absorbs the smaller; the merged genome is the
    /// population-weighted mean.
    pub(crate) fn check_recombinations(&mut self) {
        let width = self.grid.width() as i32;
        let height = self.grid.height() as i32;
        let mut pairs: Vec<(u32, u32)> = Vec::new();
        for idx in 0..self.grid.len() {
            let a = self.grid.cell(idx).colony_id();
            if a == 0 {
                continue;
            }
            let x = (idx as i32) % width;
            let y = (idx as i32) / width;
            // East and south suffice: every adjacency is visited once.
            for (dx, dy) in [(1, 0), (0, 1)] {
                let (nx, ny) = (x + dx, y + dy);
                if nx >= width || ny >= height {
                    continue;
                }
                let b = self.grid.cell((ny * width + nx) as usize).colony_id();
                if b != 0 && b != a {
                    pairs.push((a.min(b), a.max(b)));
                }
            }
        }
        pairs.sort_unstable();
        pairs.dedup();

        let mut consumed: Vec<u32> = Vec::new();
        for (a, b) in pairs {
            if consumed.contains(&a) || consumed.contains(&b) {
                continue;
            }
            let Some(ca) = self.colonies.get(a) else {
                continue;
            };
            let Some(cb) = self.colonies.get(b) else {
                continue;
            };
            // Lineage gate: parent/child or shared non-genesis ancestor.
            // Two genesis colonies never merge.
            let related = ca.parent_id == b
                || cb.parent_id == a
                || (ca.parent_id != 0 && ca.parent_id == cb.parent_id);
            let threshold =
                0.05 + 0.1 * (ca.genome.merge_affinity + cb.genome.merge_affinity) * 0.5;
            let close = ca.genome.distance(&cb.genome) <= threshold;
            if !related || !close {
                // Contact without a merge still conducts horizontal genes.
                self.attempt_gene_transfer(a, b);
                continue;
            }

            let count_a = self.stats.get(a as usize).map(|s| s.cell_count()).unwrap_or(0);
            let count_b = self.stats.get(b as usize).map(|s| s.cell_count()).unwrap_or(0);
            let (survivor, absorbed, survivor_count, absorbed_count) = if count_a >= count_b {
                (a, b, count_a, count_b)
            } else {
                (b, a, count_b, count_a)
            };

            let merged_genome = {
                let gs = &self.colonies.get(survivor).expect("survivor active").genome;
                let ga = &self.colonies.get(absorbed).expect("absorbed active").genome;
                Genome::merge(
                    gs,
                    survivor_count.max(0) as f32,
                    ga,
                    absorbed_count.max(0) as f32,
                )
            };

            for idx in 0..self.grid.len() {
                if self.grid.cell(idx).colony_id() == absorbed {
                    self.grid.relabel(idx, survivor);
                }
            }
            if let Some(stats) = self.stats.get(survivor as usize) {
                stats.add_cells(absorbed_count.max(0));
            }
            if let Some(stats) = self.stats.get(absorbed as usize) {
                stats.set_count(0);
            }
            if let Some(colony) = self.colonies.get_any_mut(survivor) {
                colony.genome = merged_genome;
            }
            if let Some(colony) = self.colonies.get_any_mut(absorbed) {
                colony.active = false;
            }
            consumed.push(absorbed);
            self.metrics.merges += 1;
            debug!(survivor, absorbed, "recombination merge");
        }
    }

    /// Horizontal gene transfer across a contact front: the larger colony
    /// donates, pulling a random subset of the recipient's traits toward its
    /// own by a strength set by its `gene_transfer_rate`.
    fn attempt_gene_transfer(&mut self, a: u32, b: u32) {
        let count_a = self
            .stats
            .get(a as usize)
            .map(|s| s.cell_count())
            .unwrap_or(0);
        let count_b = self
            .stats
            .get(b as usize)
            .map(|s| s.cell_count())
            .unwrap_or(0);
        let (donor, recipient) = if count_a >= count_b { (a, b) } else { (b, a) };

        let (donor_genome, donor_rate) = match self.colonies.get(donor) {
            Some(c) => (c.genome.clone(), c.genome.gene_transfer_rate),
            None => return,
        };
        let recipient_rate = match self.colonies.get(recipient) {
            Some(c) => c.genome.gene_transfer_rate,
            None => return,
        };

        let p = f64::from((0.05 * (donor_rate + recipient_rate)).clamp(0.0, 1.0));
        if !self.rng.random_bool(p) {
            return;
        }
        if let Some(colony) = self.colonies.get_any_mut(recipient) {
            colony
                .genome
                .transfer_from(&donor_genome, 0.3 * donor_rate, &mut self.rng);
        }
    }

    /// Phase 9: keep the petri dish populated. Below the floor a genesis
    /// colony is forced in; otherwise spawning is probabilistic, biased by
    /// how empty the grid is.
    fn dynamic_spawn(&mut self) {
        let active = self.colonies.active_count();
        let occupied: i64 = self
            .colonies
            .iter_active()
            .filter_map(|c| self.stats.get(c.id as usize))
            .map(|s| s.cell_count().max(0))
            .sum();
        let empty_ratio = 1.0 - (occupied as f32 / self.grid.len() as f32).clamp(0.0, 1.0);

        let forced = active < FORCED_SPAWN_BELOW;
        let p = 0.02 * empty_ratio + if active < 8 { 0.01 } else { 0.0 };
        if !forced && !self.rng.random_bool(f64::from(p.clamp(0.0, 1.0))) {
            return;
        }

        for _ in 0..20 {
            let x = self.rng.random_range(0..self.config.width);
            let y = self.rng.random_range(0..self.config.height);
            if !self.grid.cell(self.grid.index(x, y)).is_empty() {
                continue;
            }
            let genome = Genome::random(&mut self.rng);
            let name = generate_name(&mut self.rng);
            if self.spawn_colony_cell(x, y, name, genome, 0).is_some() {
                self.metrics.spawns += 1;
            }
            break;
        }
    }

    /// Phase 10: recompute signal strength, stress, biofilm, the colony
    /// state machine, and the shape morph inputs; raise alarms from
    /// stressed colonies.
    fn update_behavior(&mut self) {
        let width = self.grid.width();
        let height = self.grid.height();
        for colony in self.colonies.iter_mut() {
            if !colony.active {
                continue;
            }
            let count = self
                .stats
                .get(colony.id as usize)
                .map(|s| s.cell_count())
                .unwrap_or(0);
            let g = &colony.genome;

            let cx = (colony.centroid[0] as usize).min(width.saturating_sub(1));
            let cy = (colony.centroid[1] as usize).min(height.saturating_sub(1));
            let cidx = cy * width + cx;
            let local_toxin = self.fields.toxins[cidx];
            let local_nutrient = self.fields.nutrients[cidx];

            let growth = count - colony.last_population;
            let decline = if growth < 0 {
                ((-growth) as f32 / count.max(1) as f32 * 4.0).min(1.0)
            } else {
                0.0
            };
            let pressure = decline
                + local_toxin * g.toxin_sensitivity * 0.5
                + (0.3 - local_nutrient).max(0.0) * g.nutrient_sensitivity;
            colony.stress_level = (g.memory_factor * colony.stress_level
                + (1.0 - g.memory_factor) * pressure)
                .clamp(0.0, 1.0);

            colony.signal_strength = (g.signal_emission
                * (0.3 + 0.7 * (count.max(0) as f32 / 500.0).min(1.0)))
            .clamp(0.0, 1.0);

            let biofilm_target = (0.5 * g.biofilm_investment
                + 0.5 * g.biofilm_tendency * (1.0 + 0.5 * colony.stress_level))
                .clamp(0.0, 1.0);
            colony.biofilm_strength =
                (0.9 * colony.biofilm_strength + 0.1 * biofilm_target).clamp(0.0, 1.0);

            colony.state = if colony.stress_level > g.sporulation_threshold
                && g.dormancy_threshold >= 0.5
            {
                crate::colony::ColonyState::Dormant
            } else if colony.stress_level > 0.5 {
                crate::colony::ColonyState::Stressed
            } else {
                crate::colony::ColonyState::Normal
            };
            colony.is_dormant = colony.state == crate::colony::ColonyState::Dormant;

            colony.drift = [
                0.9 * colony.drift[0] + 0.1 * g.motility * g.motility_direction.cos(),
                0.9 * colony.drift[1] + 0.1 * g.motility * g.motility_direction.sin(),
            ];
            colony.wobble_phase = (colony.wobble_phase + 0.15 + 0.1 * g.motility) % TAU;
            colony.shape_evolution += 0.01;
            colony.age += 1;

            if colony.stress_level > g.alarm_threshold {
                let amount = ((colony.stress_level - g.alarm_threshold) * 0.5).min(1.0);
                self.fields.raise_alarm(cidx, amount, colony.id);
            }

            colony.last_growth = growth;
            colony.last_population = count;
        }
    }

    /// Phase 11: re-establish the invariants consumers rely on (exact counts,
    /// fresh borders) and close out this tick's metrics.
    fn sync_forward(&mut self) {
        let occupied = self.reconcile_counts();
        self.grid.refresh_borders();
        self.metrics.occupied_cells = occupied;
        self.metrics.active_colonies = self.colonies.active_count();
        self.metrics.nutrient_total = self.fields.nutrients.iter().map(|&v| f64::from(v)).sum();
        self.metrics.toxin_total = self.fields.toxins.iter().map(|&v| f64::from(v)).sum();
    }
}
