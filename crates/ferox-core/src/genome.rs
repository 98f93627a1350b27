use rand::Rng;
use std::f32::consts::{PI, TAU};

/// Continuous trait vector governing a colony's behavior and appearance.
///
/// Every scalar trait is clamped to its documented range after each operation
/// (random init, mutation, merge, transfer). Spread and hidden weights are
/// indexed by the 8-neighborhood direction order of `grid::NEIGHBORS_8`.
#[derive(Clone, Debug, PartialEq)]
pub struct Genome {
    /// Per-direction spread preference, [0.1, 1.0].
    pub spread_weights: [f32; 8],

    // Growth, all [0, 1].
    pub spread_rate: f32,
    pub mutation_rate: f32,
    pub metabolism: f32,
    pub efficiency: f32,
    pub resource_consumption: f32,

    // Combat, all [0, 1].
    pub aggression: f32,
    pub resilience: f32,
    pub toxin_production: f32,
    pub toxin_resistance: f32,
    pub defense_priority: f32,

    // Social.
    pub detection_range: f32,
    /// Neighbor colonies sampled during spread, 1..=4.
    pub max_tracked: u8,
    /// [-1, 1]: negative avoids crowds, positive seeks them.
    pub social_factor: f32,
    pub merge_affinity: f32,
    pub signal_emission: f32,
    pub signal_sensitivity: f32,
    pub alarm_threshold: f32,
    pub gene_transfer_rate: f32,

    // Environmental sensing.
    pub nutrient_sensitivity: f32,
    pub toxin_sensitivity: f32,
    /// [-1, 1]: negative prefers the interior, positive the frontier.
    pub edge_affinity: f32,
    pub density_tolerance: f32,
    pub quorum_threshold: f32,

    // Survival.
    pub dormancy_threshold: f32,
    pub dormancy_resistance: f32,
    pub sporulation_threshold: f32,
    pub biofilm_investment: f32,
    pub biofilm_tendency: f32,
    pub motility: f32,
    /// Preferred drift heading, [0, 2π).
    pub motility_direction: f32,
    pub specialization: f32,

    // Decision layer.
    /// [-1, 1] each.
    pub hidden_weights: [f32; 8],
    pub learning_rate: f32,
    pub memory_factor: f32,

    // Appearance. `border_color` is always `body_color / 2`.
    pub body_color: [u8; 3],
    pub border_color: [u8; 3],
}

/// Strategy archetypes biasing random initialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Archetype {
    Berserker,
    Turtle,
    Swarm,
    Toxic,
    Hive,
    Nomad,
    Parasite,
    Chaotic,
}

const ARCHETYPES: [Archetype; 8] = [
    Archetype::Berserker,
    Archetype::Turtle,
    Archetype::Swarm,
    Archetype::Toxic,
    Archetype::Hive,
    Archetype::Nomad,
    Archetype::Parasite,
    Archetype::Chaotic,
];

/// Sum of the per-trait distance weights below.
const TRAIT_WEIGHT_TOTAL: f32 = 28.25;

fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

/// Minimal HSV→RGB used only for genome color sampling; renderer-side color
/// helpers live outside the engine.
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let h = h.rem_euclid(360.0) / 60.0;
    let c = v * s;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    [
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    ]
}

fn floor_channels(mut rgb: [u8; 3]) -> [u8; 3] {
    for ch in &mut rgb {
        *ch = (*ch).max(30);
    }
    rgb
}

impl Genome {
    /// Random genome biased by a uniformly drawn strategy archetype.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let archetype = ARCHETYPES[rng.random_range(0..ARCHETYPES.len())];
        Self::random_with_archetype(rng, archetype)
    }

    pub fn random_with_archetype<R: Rng + ?Sized>(rng: &mut R, archetype: Archetype) -> Self {
        let mut noise = |mean: f32, amp: f32| clamp01(mean + rng.random_range(-amp..=amp));

        // Baseline means; the archetype shifts a handful of them.
        let mut spread_rate = noise(0.5, 0.3);
        let mut aggression = noise(0.4, 0.3);
        let mut resilience = noise(0.4, 0.3);
        let mut toxin_production = noise(0.25, 0.2);
        let mut toxin_resistance = noise(0.35, 0.25);
        let mut metabolism = noise(0.5, 0.25);
        let mut signal_emission = noise(0.4, 0.3);
        let mut merge_affinity = noise(0.4, 0.3);
        let mut motility = noise(0.3, 0.25);
        let mut biofilm_tendency = noise(0.35, 0.3);
        let mut gene_transfer_rate = noise(0.25, 0.2);

        match archetype {
            Archetype::Berserker => {
                aggression = noise(0.85, 0.15);
                spread_rate = noise(0.75, 0.2);
                resilience = noise(0.25, 0.15);
            }
            Archetype::Turtle => {
                resilience = noise(0.85, 0.15);
                biofilm_tendency = noise(0.8, 0.15);
                spread_rate = noise(0.3, 0.15);
                aggression = noise(0.2, 0.15);
            }
            Archetype::Swarm => {
                spread_rate = noise(0.9, 0.1);
                metabolism = noise(0.75, 0.2);
                resilience = noise(0.2, 0.15);
            }
            Archetype::Toxic => {
                toxin_production = noise(0.85, 0.15);
                toxin_resistance = noise(0.9, 0.1);
                spread_rate = noise(0.4, 0.2);
            }
            Archetype::Hive => {
                signal_emission = noise(0.85, 0.15);
                merge_affinity = noise(0.8, 0.15);
                gene_transfer_rate = noise(0.6, 0.2);
            }
            Archetype::Nomad => {
                motility = noise(0.85, 0.15);
                spread_rate = noise(0.65, 0.2);
                biofilm_tendency = noise(0.15, 0.1);
            }
            Archetype::Parasite => {
                gene_transfer_rate = noise(0.85, 0.15);
                aggression = noise(0.6, 0.2);
                metabolism = noise(0.35, 0.2);
            }
            Archetype::Chaotic => {}
        }

        let mut spread_weights = [0.0f32; 8];
        for w in &mut spread_weights {
            *w = rng.random_range(0.7..=1.0);
        }
        // One or two preferred directions.
        let preferred = 1 + rng.random_range(0..2usize);
        for _ in 0..preferred {
            spread_weights[rng.random_range(0..8)] = rng.random_range(0.9..=1.0);
        }

        let mut hidden_weights = [0.0f32; 8];
        for w in &mut hidden_weights {
            *w = rng.random_range(-1.0..=1.0);
        }

        let body_color = floor_channels(hsv_to_rgb(
            rng.random_range(0.0..360.0),
            rng.random_range(0.7..=1.0),
            rng.random_range(0.6..=1.0),
        ));

        let mut genome = Self {
            spread_weights,
            spread_rate,
            mutation_rate: clamp01(rng.random_range(0.02..0.3)),
            metabolism,
            efficiency: rng.random(),
            resource_consumption: rng.random(),
            aggression,
            resilience,
            toxin_production,
            toxin_resistance,
            defense_priority: rng.random(),
            detection_range: rng.random(),
            max_tracked: rng.random_range(1..=4),
            social_factor: rng.random_range(-1.0..=1.0),
            merge_affinity,
            signal_emission,
            signal_sensitivity: rng.random(),
            alarm_threshold: rng.random(),
            gene_transfer_rate,
            nutrient_sensitivity: rng.random(),
            toxin_sensitivity: rng.random(),
            edge_affinity: rng.random_range(-1.0..=1.0),
            density_tolerance: rng.random(),
            quorum_threshold: rng.random(),
            dormancy_threshold: rng.random(),
            dormancy_resistance: rng.random(),
            sporulation_threshold: rng.random(),
            biofilm_investment: rng.random(),
            biofilm_tendency,
            motility,
            motility_direction: rng.random_range(0.0..TAU),
            specialization: rng.random(),
            hidden_weights,
            learning_rate: rng.random(),
            memory_factor: rng.random(),
            body_color,
            border_color: [0; 3],
        };
        genome.clamp_ranges();
        genome
    }

    /// Re-establish every documented trait range and the border-color
    /// invariant. Called at the end of every genome operation.
    pub fn clamp_ranges(&mut self) {
        for w in &mut self.spread_weights {
            *w = w.clamp(0.1, 1.0);
        }
        for w in &mut self.hidden_weights {
            *w = w.clamp(-1.0, 1.0);
        }
        self.spread_rate = clamp01(self.spread_rate);
        self.mutation_rate = clamp01(self.mutation_rate);
        self.metabolism = clamp01(self.metabolism);
        self.efficiency = clamp01(self.efficiency);
        self.resource_consumption = clamp01(self.resource_consumption);
        self.aggression = clamp01(self.aggression);
        self.resilience = clamp01(self.resilience);
        self.toxin_production = clamp01(self.toxin_production);
        self.toxin_resistance = clamp01(self.toxin_resistance);
        self.defense_priority = clamp01(self.defense_priority);
        self.detection_range = clamp01(self.detection_range);
        self.max_tracked = self.max_tracked.clamp(1, 4);
        self.social_factor = self.social_factor.clamp(-1.0, 1.0);
        self.merge_affinity = clamp01(self.merge_affinity);
        self.signal_emission = clamp01(self.signal_emission);
        self.signal_sensitivity = clamp01(self.signal_sensitivity);
        self.alarm_threshold = clamp01(self.alarm_threshold);
        self.gene_transfer_rate = clamp01(self.gene_transfer_rate);
        self.nutrient_sensitivity = clamp01(self.nutrient_sensitivity);
        self.toxin_sensitivity = clamp01(self.toxin_sensitivity);
        self.edge_affinity = self.edge_affinity.clamp(-1.0, 1.0);
        self.density_tolerance = clamp01(self.density_tolerance);
        self.quorum_threshold = clamp01(self.quorum_threshold);
        self.dormancy_threshold = clamp01(self.dormancy_threshold);
        self.dormancy_resistance = clamp01(self.dormancy_resistance);
        self.sporulation_threshold = clamp01(self.sporulation_threshold);
        self.biofilm_investment = clamp01(self.biofilm_investment);
        self.biofilm_tendency = clamp01(self.biofilm_tendency);
        self.motility = clamp01(self.motility);
        self.motility_direction = self.motility_direction.rem_euclid(TAU);
        self.specialization = clamp01(self.specialization);
        self.learning_rate = clamp01(self.learning_rate);
        self.memory_factor = clamp01(self.memory_factor);
        self.border_color = [
            self.body_color[0] / 2,
            self.body_color[1] / 2,
            self.body_color[2] / 2,
        ];
    }

    /// Bounded random drift of the trait vector.
    ///
    /// `mutation_chance = max(mutation_rate, 0.08)`; a 5% hypermutation event
    /// quadruples it for this invocation, and a 1% radical event instead
    /// fully randomizes exactly one of ten designated traits.
    pub fn mutate<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if rng.random_bool(0.01) {
            self.radical_mutation(rng);
            self.clamp_ranges();
            return;
        }

        let mut chance = self.mutation_rate.max(0.08);
        if rng.random_bool(0.05) {
            chance *= 4.0;
        }
        let chance = f64::from(chance.min(1.0));

        let mut drift = |v: &mut f32, amp: f32| {
            if rng.random_bool(chance) {
                *v += rng.random_range(-amp..=amp);
            }
        };

        for i in 0..8 {
            drift(&mut self.spread_weights[i], 0.15);
        }
        for i in 0..8 {
            drift(&mut self.hidden_weights[i], 0.25);
        }
        drift(&mut self.spread_rate, 0.2);
        drift(&mut self.mutation_rate, 0.05);
        drift(&mut self.metabolism, 0.2);
        drift(&mut self.efficiency, 0.15);
        drift(&mut self.resource_consumption, 0.15);
        drift(&mut self.aggression, 0.25);
        drift(&mut self.resilience, 0.25);
        drift(&mut self.toxin_production, 0.2);
        drift(&mut self.toxin_resistance, 0.2);
        drift(&mut self.defense_priority, 0.15);
        drift(&mut self.detection_range, 0.15);
        drift(&mut self.social_factor, 0.3);
        drift(&mut self.merge_affinity, 0.2);
        drift(&mut self.signal_emission, 0.2);
        drift(&mut self.signal_sensitivity, 0.2);
        drift(&mut self.alarm_threshold, 0.15);
        drift(&mut self.gene_transfer_rate, 0.15);
        drift(&mut self.nutrient_sensitivity, 0.15);
        drift(&mut self.toxin_sensitivity, 0.15);
        drift(&mut self.edge_affinity, 0.3);
        drift(&mut self.density_tolerance, 0.15);
        drift(&mut self.quorum_threshold, 0.15);
        drift(&mut self.dormancy_threshold, 0.15);
        drift(&mut self.dormancy_resistance, 0.15);
        drift(&mut self.sporulation_threshold, 0.15);
        drift(&mut self.biofilm_investment, 0.15);
        drift(&mut self.biofilm_tendency, 0.2);
        drift(&mut self.motility, 0.2);
        drift(&mut self.specialization, 0.15);
        drift(&mut self.learning_rate, 0.15);
        drift(&mut self.memory_factor, 0.15);

        if rng.random_bool((chance * 0.25).min(1.0)) {
            let step = if rng.random_bool(0.5) { 1i8 } else { -1 };
            self.max_tracked = self.max_tracked.saturating_add_signed(step);
        }
        if rng.random_bool(chance) {
            self.motility_direction += rng.random_range(-0.5..=0.5);
        }
        if rng.random_bool(0.3) {
            for ch in &mut self.body_color {
                let delta = rng.random_range(-30i16..=30);
                *ch = (i16::from(*ch) + delta).clamp(0, 255) as u8;
            }
        }

        self.clamp_ranges();
    }

    fn radical_mutation<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        match rng.random_range(0..10u8) {
            0 => self.spread_rate = rng.random(),
            1 => self.aggression = rng.random(),
            2 => self.resilience = rng.random(),
            3 => self.toxin_production = rng.random(),
            4 => self.toxin_resistance = rng.random(),
            5 => self.metabolism = rng.random(),
            6 => self.motility = rng.random(),
            7 => self.social_factor = rng.random_range(-1.0..=1.0),
            8 => self.signal_emission = rng.random(),
            _ => self.merge_affinity = rng.random(),
        }
    }

    /// Weighted ℓ1 distance between genomes, normalized to [0, 1].
    ///
    /// Symmetric, zero on identical genomes, 1.0 at full-range divergence of
    /// every trait. Weights total 28.25.
    pub fn distance(&self, other: &Genome) -> f32 {
        let mut acc = 0.0f32;
        let mut term = |a: f32, b: f32, range: f32, weight: f32| {
            acc += weight * ((a - b).abs() / range).min(1.0);
        };

        for i in 0..8 {
            term(self.spread_weights[i], other.spread_weights[i], 0.9, 0.25);
        }
        for i in 0..8 {
            term(self.hidden_weights[i], other.hidden_weights[i], 2.0, 0.25);
        }
        term(self.spread_rate, other.spread_rate, 1.0, 1.5);
        term(self.mutation_rate, other.mutation_rate, 1.0, 0.5);
        term(self.metabolism, other.metabolism, 1.0, 1.5);
        term(self.efficiency, other.efficiency, 1.0, 1.0);
        term(
            self.resource_consumption,
            other.resource_consumption,
            1.0,
            0.75,
        );
        term(self.aggression, other.aggression, 1.0, 1.5);
        term(self.resilience, other.resilience, 1.0, 1.5);
        term(self.toxin_production, other.toxin_production, 1.0, 1.25);
        term(self.toxin_resistance, other.toxin_resistance, 1.0, 1.25);
        term(self.defense_priority, other.defense_priority, 1.0, 0.75);
        term(self.detection_range, other.detection_range, 1.0, 0.5);
        term(
            f32::from(self.max_tracked),
            f32::from(other.max_tracked),
            3.0,
            0.25,
        );
        term(self.social_factor, other.social_factor, 2.0, 0.75);
        term(self.merge_affinity, other.merge_affinity, 1.0, 0.5);
        term(self.signal_emission, other.signal_emission, 1.0, 0.75);
        term(self.signal_sensitivity, other.signal_sensitivity, 1.0, 0.75);
        term(self.alarm_threshold, other.alarm_threshold, 1.0, 0.25);
        term(self.gene_transfer_rate, other.gene_transfer_rate, 1.0, 0.5);
        term(
            self.nutrient_sensitivity,
            other.nutrient_sensitivity,
            1.0,
            0.75,
        );
        term(self.toxin_sensitivity, other.toxin_sensitivity, 1.0, 0.75);
        term(self.edge_affinity, other.edge_affinity, 2.0, 0.5);
        term(self.density_tolerance, other.density_tolerance, 1.0, 0.5);
        term(self.quorum_threshold, other.quorum_threshold, 1.0, 0.25);
        term(self.dormancy_threshold, other.dormancy_threshold, 1.0, 0.5);
        term(
            self.dormancy_resistance,
            other.dormancy_resistance,
            1.0,
            0.5,
        );
        term(
            self.sporulation_threshold,
            other.sporulation_threshold,
            1.0,
            0.5,
        );
        term(self.biofilm_investment, other.biofilm_investment, 1.0, 0.5);
        term(self.biofilm_tendency, other.biofilm_tendency, 1.0, 0.5);
        term(self.motility, other.motility, 1.0, 0.5);
        // Circular difference, at most π apart.
        let mut angular = (self.motility_direction - other.motility_direction).abs();
        if angular > PI {
            angular = TAU - angular;
        }
        term(angular, 0.0, PI, 0.5);
        term(self.specialization, other.specialization, 1.0, 0.5);
        term(self.learning_rate, other.learning_rate, 1.0, 0.5);
        term(self.memory_factor, other.memory_factor, 1.0, 0.5);
        for i in 0..3 {
            term(
                f32::from(self.body_color[i]),
                f32::from(other.body_color[i]),
                255.0,
                0.25,
            );
        }

        acc / TRAIT_WEIGHT_TOTAL
    }

    /// Population-weighted per-field mean of two genomes.
    ///
    /// `motility_direction` uses the circular mean; `max_tracked` rounds to
    /// nearest and clamps to ≥ 1. Weights are non-negative populations.
    pub fn merge(a: &Genome, wa: f32, b: &Genome, wb: f32) -> Genome {
        let total = wa + wb;
        let fa = if total > 0.0 { wa / total } else { 0.5 };
        let fb = 1.0 - fa;
        let mix = |x: f32, y: f32| x * fa + y * fb;

        let mut spread_weights = [0.0f32; 8];
        for i in 0..8 {
            spread_weights[i] = mix(a.spread_weights[i], b.spread_weights[i]);
        }
        let mut hidden_weights = [0.0f32; 8];
        for i in 0..8 {
            hidden_weights[i] = mix(a.hidden_weights[i], b.hidden_weights[i]);
        }

        let sin = fa * a.motility_direction.sin() + fb * b.motility_direction.sin();
        let cos = fa * a.motility_direction.cos() + fb * b.motility_direction.cos();
        let motility_direction = if sin == 0.0 && cos == 0.0 {
            a.motility_direction
        } else {
            sin.atan2(cos).rem_euclid(TAU)
        };

        let mix_u8 = |x: u8, y: u8| {
            (f32::from(x) * fa + f32::from(y) * fb)
                .round()
                .clamp(0.0, 255.0) as u8
        };

        let mut genome = Genome {
            spread_weights,
            spread_rate: mix(a.spread_rate, b.spread_rate),
            mutation_rate: mix(a.mutation_rate, b.mutation_rate),
            metabolism: mix(a.metabolism, b.metabolism),
            efficiency: mix(a.efficiency, b.efficiency),
            resource_consumption: mix(a.resource_consumption, b.resource_consumption),
            aggression: mix(a.aggression, b.aggression),
            resilience: mix(a.resilience, b.resilience),
            toxin_production: mix(a.toxin_production, b.toxin_production),
            toxin_resistance: mix(a.toxin_resistance, b.toxin_resistance),
            defense_priority: mix(a.defense_priority, b.defense_priority),
            detection_range: mix(a.detection_range, b.detection_range),
            max_tracked: (f32::from(a.max_tracked) * fa + f32::from(b.max_tracked) * fb)
                .round()
                .max(1.0) as u8,
            social_factor: mix(a.social_factor, b.social_factor),
            merge_affinity: mix(a.merge_affinity, b.merge_affinity),
            signal_emission: mix(a.signal_emission, b.signal_emission),
            signal_sensitivity: mix(a.signal_sensitivity, b.signal_sensitivity),
            alarm_threshold: mix(a.alarm_threshold, b.alarm_threshold),
            gene_transfer_rate: mix(a.gene_transfer_rate, b.gene_transfer_rate),
            nutrient_sensitivity: mix(a.nutrient_sensitivity, b.nutrient_sensitivity),
            toxin_sensitivity: mix(a.toxin_sensitivity, b.toxin_sensitivity),
            edge_affinity: mix(a.edge_affinity, b.edge_affinity),
            density_tolerance: mix(a.density_tolerance, b.density_tolerance),
            quorum_threshold: mix(a.quorum_threshold, b.quorum_threshold),
            dormancy_threshold: mix(a.dormancy_threshold, b.dormancy_threshold),
            dormancy_resistance: mix(a.dormancy_resistance, b.dormancy_resistance),
            sporulation_threshold: mix(a.sporulation_threshold, b.sporulation_threshold),
            biofilm_investment: mix(a.biofilm_investment, b.biofilm_investment),
            biofilm_tendency: mix(a.biofilm_tendency, b.biofilm_tendency),
            motility: mix(a.motility, b.motility),
            motility_direction,
            specialization: mix(a.specialization, b.specialization),
            hidden_weights,
            learning_rate: mix(a.learning_rate, b.learning_rate),
            memory_factor: mix(a.memory_factor, b.memory_factor),
            body_color: [
                mix_u8(a.body_color[0], b.body_color[0]),
                mix_u8(a.body_color[1], b.body_color[1]),
                mix_u8(a.body_color[2], b.body_color[2]),
            ],
            border_color: [0; 3],
        };
        genome.clamp_ranges();
        genome
    }

    /// Horizontal gene transfer: pull a random subset of traits toward the
    /// donor by `strength`.
    pub fn transfer_from<R: Rng + ?Sized>(&mut self, donor: &Genome, strength: f32, rng: &mut R) {
        let strength = clamp01(strength);
        let mut pull = |mine: &mut f32, theirs: f32| {
            if rng.random_bool(0.35) {
                *mine += (theirs - *mine) * strength;
            }
        };

        pull(&mut self.spread_rate, donor.spread_rate);
        pull(&mut self.metabolism, donor.metabolism);
        pull(&mut self.efficiency, donor.efficiency);
        pull(&mut self.aggression, donor.aggression);
        pull(&mut self.resilience, donor.resilience);
        pull(&mut self.toxin_production, donor.toxin_production);
        pull(&mut self.toxin_resistance, donor.toxin_resistance);
        pull(&mut self.signal_emission, donor.signal_emission);
        pull(&mut self.signal_sensitivity, donor.signal_sensitivity);
        pull(&mut self.merge_affinity, donor.merge_affinity);
        pull(&mut self.biofilm_tendency, donor.biofilm_tendency);
        pull(&mut self.motility, donor.motility);
        for i in 0..8 {
            pull(&mut self.spread_weights[i], donor.spread_weights[i]);
        }

        self.clamp_ranges();
    }
}
