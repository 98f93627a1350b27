//! Deterministic procedural shape radius used by snapshot consumers to draw
//! organic colony outlines. Pure math over the inputs; the simulation never
//! reads it.

use std::f32::consts::TAU;

fn mix(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x7FEB_352D);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846C_A68B);
    h ^= h >> 16;
    h
}

/// Hash to [0, 1).
fn hash01(seed: u32, octave: u32, lattice: u32) -> f32 {
    let h = mix(seed ^ octave.wrapping_mul(0x9E37_79B1) ^ lattice.wrapping_mul(0x85EB_CA77));
    (h >> 8) as f32 / 16_777_216.0
}

fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

/// Periodic 1D value noise over the angle, `freq` lattice points per turn.
fn value_noise(seed: u32, octave: u32, angle: f32, freq: u32, shift: f32) -> f32 {
    let t = (angle.rem_euclid(TAU) / TAU) * freq as f32 + shift;
    let base = t.floor();
    let frac = t - base;
    let i0 = (base as i64).rem_euclid(freq as i64) as u32;
    let i1 = (i0 + 1) % freq;
    let n0 = hash01(seed, octave, i0);
    let n1 = hash01(seed, octave, i1);
    n0 + (n1 - n0) * smoothstep(frac)
}

/// Radius multiplier in [0.5, 1.5] for a colony outline at `angle`.
///
/// Three octaves of seeded value noise give the silhouette, `sin(phase)`
/// adds low-amplitude breathing, and `evolution` slowly rotates the noise
/// lattice so shapes morph over a colony's lifetime.
pub fn shape_at(seed: u32, angle: f32, phase: f32, evolution: f32) -> f32 {
    let mut radius = 1.0f32;
    let mut amplitude = 0.22f32;
    let mut freq = 3u32;
    for octave in 0..3u32 {
        let shift = evolution * (0.35 + 0.2 * octave as f32);
        let n = value_noise(seed, octave, angle, freq, shift);
        radius += amplitude * (n * 2.0 - 1.0);
        amplitude *= 0.5;
        freq *= 2;
    }
    radius += 0.05 * phase.sin();
    radius += 0.04 * (evolution * 0.5 + hash01(seed, 7, 0) * TAU).sin();
    radius.clamp(0.5, 1.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_stays_in_band() {
        for seed in [0u32, 1, 0xDEAD_BEEF, u32::MAX] {
            let mut angle = 0.0f32;
            while angle < TAU {
                for phase in [0.0f32, 1.3, 4.0] {
                    for evolution in [0.0f32, 0.5, 12.0] {
                        let r = shape_at(seed, angle, phase, evolution);
                        assert!((0.5..=1.5).contains(&r), "r={r} out of band");
                    }
                }
                angle += 0.17;
            }
        }
    }

    #[test]
    fn identical_inputs_are_deterministic() {
        let a = shape_at(123, 1.0, 0.5, 2.0);
        let b = shape_at(123, 1.0, 0.5, 2.0);
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_produce_different_silhouettes() {
        let mut differs = false;
        let mut angle = 0.0f32;
        while angle < TAU {
            if (shape_at(1, angle, 0.0, 0.0) - shape_at(2, angle, 0.0, 0.0)).abs() > 1e-3 {
                differs = true;
                break;
            }
            angle += 0.1;
        }
        assert!(differs, "seed had no effect on the outline");
    }

    #[test]
    fn silhouette_varies_with_angle() {
        let samples: Vec<f32> = (0..16)
            .map(|i| shape_at(77, i as f32 * TAU / 16.0, 0.0, 0.0))
            .collect();
        let min = samples.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = samples.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!(max - min > 0.01, "outline is a circle");
    }
}
