/// Environmental scalar fields, one value per grid cell, all clamped to
/// [0, 1]. Scent and alarm diffusion are double-buffered against permanent
/// scratch buffers; nothing here allocates after construction.
///
/// The kernels are written as straight slice loops so the autovectorizer can
/// take them; behavior is specified against the scalar form.

/// Fraction of scent a cell keeps for itself each diffusion step.
const SIGNAL_KEEP: f32 = 0.6;
/// Fraction handed to each 4-neighbor.
const SIGNAL_SPILL: f32 = 0.075;
/// Alarm analogs fade faster than scent.
const ALARM_KEEP: f32 = 0.45;
const ALARM_SPILL: f32 = 0.05;
/// Values below this snap to zero so stale sources do not linger.
const SNAP_TO_ZERO: f32 = 1e-4;

/// Multiplicative in-place decay with clamp.
pub fn mul_clamp(buf: &mut [f32], k: f32) {
    for v in buf {
        *v = (*v * k).clamp(0.0, 1.0);
    }
}

/// Subtract with clamp at zero (upper bound re-established by the caller's
/// deposits, which clamp).
pub fn sub_clamp(buf: &mut [f32], amounts: &[f32]) {
    for (v, a) in buf.iter_mut().zip(amounts) {
        *v = (*v - a).clamp(0.0, 1.0);
    }
}

/// Copy with clamp, used to re-enter the documented range from scratch data.
pub fn copy_clamp(dst: &mut [f32], src: &[f32]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d = s.clamp(0.0, 1.0);
    }
}

pub struct EnvFields {
    width: usize,
    height: usize,
    pub nutrients: Vec<f32>,
    pub toxins: Vec<f32>,
    pub signals: Vec<f32>,
    pub signal_source: Vec<u32>,
    pub alarms: Vec<f32>,
    pub alarm_source: Vec<u32>,
    /// Fresh emission staged by the current tick, consumed by diffusion.
    emission: Vec<f32>,
    emission_source: Vec<u32>,
    scratch: Vec<f32>,
    scratch_source: Vec<u32>,
}

impl EnvFields {
    pub fn new(width: usize, height: usize) -> Self {
        let len = width * height;
        Self {
            width,
            height,
            nutrients: vec![1.0; len],
            toxins: vec![0.0; len],
            signals: vec![0.0; len],
            signal_source: vec![0; len],
            alarms: vec![0.0; len],
            alarm_source: vec![0; len],
            emission: vec![0.0; len],
            emission_source: vec![0; len],
            scratch: vec![0.0; len],
            scratch_source: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.nutrients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nutrients.is_empty()
    }

    /// Deplete a nutrient cell, clamped at zero.
    pub fn deplete_nutrient(&mut self, idx: usize, amount: f32) {
        self.nutrients[idx] = (self.nutrients[idx] - amount).clamp(0.0, 1.0);
    }

    /// Regenerate a nutrient cell, clamped at one.
    pub fn regen_nutrient(&mut self, idx: usize, amount: f32) {
        self.nutrients[idx] = (self.nutrients[idx] + amount).clamp(0.0, 1.0);
    }

    /// Global multiplicative toxin decay.
    pub fn decay_toxins(&mut self, k: f32) {
        mul_clamp(&mut self.toxins, k);
    }

    /// Deposit toxin at a cell with a smaller spill to its 4-neighbors.
    pub fn deposit_toxin(&mut self, x: i32, y: i32, amount: f32, spill: f32) {
        let (w, h) = (self.width as i32, self.height as i32);
        if x < 0 || y < 0 || x >= w || y >= h {
            return;
        }
        let idx = y as usize * self.width + x as usize;
        self.toxins[idx] = (self.toxins[idx] + amount).clamp(0.0, 1.0);
        for (dx, dy) in crate::grid::NEIGHBORS_4 {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx >= w || ny >= h {
                continue;
            }
            let n = ny as usize * self.width + nx as usize;
            self.toxins[n] = (self.toxins[n] + spill).clamp(0.0, 1.0);
        }
    }

    /// Stage scent emission for this tick's diffusion step. The strongest
    /// emitter into a cell claims its source slot.
    pub fn stage_emission(&mut self, idx: usize, amount: f32, source: u32) {
        if amount <= 0.0 {
            return;
        }
        if amount > self.emission[idx] {
            self.emission_source[idx] = source;
        }
        self.emission[idx] = (self.emission[idx] + amount).min(1.0);
    }

    /// One double-buffered scent diffusion step:
    /// `new = 0.6·old + 0.075·each 4-neighbor + staged emission`, clamped,
    /// with the strongest contributor winning the source id. Consumes the
    /// staged emission.
    pub fn diffuse_signals(&mut self) {
        diffuse(
            self.width,
            self.height,
            &self.signals,
            &self.signal_source,
            &self.emission,
            &self.emission_source,
            &mut self.scratch,
            &mut self.scratch_source,
            SIGNAL_KEEP,
            SIGNAL_SPILL,
        );
        std::mem::swap(&mut self.signals, &mut self.scratch);
        std::mem::swap(&mut self.signal_source, &mut self.scratch_source);
        self.emission.fill(0.0);
        self.emission_source.fill(0);
    }

    /// Alarm analog of `diffuse_signals` with a faster fade. Alarm emission
    /// is deposited directly by the behavior phase via `raise_alarm`.
    pub fn diffuse_alarms(&mut self) {
        diffuse(
            self.width,
            self.height,
            &self.alarms,
            &self.alarm_source,
            &self.emission,
            &self.emission_source,
            &mut self.scratch,
            &mut self.scratch_source,
            ALARM_KEEP,
            ALARM_SPILL,
        );
        std::mem::swap(&mut self.alarms, &mut self.scratch);
        std::mem::swap(&mut self.alarm_source, &mut self.scratch_source);
        self.emission.fill(0.0);
        self.emission_source.fill(0);
    }

    pub fn raise_alarm(&mut self, idx: usize, amount: f32, source: u32) {
        if amount > self.alarms[idx] {
            self.alarm_source[idx] = source;
        }
        self.alarms[idx] = (self.alarms[idx] + amount).clamp(0.0, 1.0);
    }

    /// Force every field back into [0, 1]; used after bulk writes from
    /// outside the normal update path.
    pub fn clamp_all(&mut self) {
        for buf in [
            &mut self.nutrients,
            &mut self.toxins,
            &mut self.signals,
            &mut self.alarms,
        ] {
            for v in buf.iter_mut() {
                *v = v.clamp(0.0, 1.0);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn diffuse(
    width: usize,
    height: usize,
    field: &[f32],
    source: &[u32],
    emission: &[f32],
    emission_source: &[u32],
    out: &mut [f32],
    out_source: &mut [u32],
    keep: f32,
    spill: f32,
) {
    let w = width as i32;
    let h = height as i32;
    for y in 0..h {
        for x in 0..w {
            let idx = y as usize * width + x as usize;

            let mut total = field[idx] * keep;
            let mut best = field[idx] * keep;
            let mut best_src = source[idx];

            for (dx, dy) in crate::grid::NEIGHBORS_4 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w || ny >= h {
                    continue;
                }
                let n = ny as usize * width + nx as usize;
                let contrib = field[n] * spill;
                total += contrib;
                if contrib > best {
                    best = contrib;
                    best_src = source[n];
                }
            }

            let fresh = emission[idx];
            total += fresh;
            if fresh > best {
                best_src = emission_source[idx];
            }

            if total < SNAP_TO_ZERO {
                out[idx] = 0.0;
                out_source[idx] = 0;
            } else {
                out[idx] = total.clamp(0.0, 1.0);
                out_source[idx] = best_src;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_start_at_documented_defaults() {
        let f = EnvFields::new(8, 4);
        assert_eq!(f.len(), 32);
        assert!(f.nutrients.iter().all(|&v| v == 1.0));
        assert!(f.toxins.iter().all(|&v| v == 0.0));
        assert!(f.signals.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn kernels_clamp_to_unit_interval() {
        let mut buf = vec![0.5, 2.0, -1.0, 0.9];
        mul_clamp(&mut buf, 3.0);
        assert!(buf.iter().all(|v| (0.0..=1.0).contains(v)), "{buf:?}");

        let mut dst = vec![0.0; 3];
        copy_clamp(&mut dst, &[-0.5, 0.25, 7.0]);
        assert_eq!(dst, vec![0.0, 0.25, 1.0]);

        let mut n = vec![0.3, 0.8];
        sub_clamp(&mut n, &[0.5, 0.2]);
        assert!((n[0] - 0.0).abs() < 1e-6 && (n[1] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn nutrient_deplete_and_regen_stay_clamped() {
        let mut f = EnvFields::new(2, 2);
        f.deplete_nutrient(0, 5.0);
        assert_eq!(f.nutrients[0], 0.0);
        f.regen_nutrient(0, 0.4);
        f.regen_nutrient(0, 0.9);
        assert_eq!(f.nutrients[0], 1.0);
    }

    #[test]
    fn toxin_deposit_spills_to_four_neighbors() {
        let mut f = EnvFields::new(3, 3);
        f.deposit_toxin(1, 1, 0.5, 0.1);
        assert!((f.toxins[4] - 0.5).abs() < 1e-6);
        for idx in [1, 3, 5, 7] {
            assert!((f.toxins[idx] - 0.1).abs() < 1e-6, "neighbor {idx}");
        }
        assert_eq!(f.toxins[0], 0.0, "diagonals untouched");
    }

    #[test]
    fn toxin_deposit_at_edge_is_bounds_checked() {
        let mut f = EnvFields::new(3, 3);
        f.deposit_toxin(0, 0, 0.4, 0.1);
        f.deposit_toxin(-1, 5, 0.4, 0.1);
        assert!((f.toxins[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn scent_diffusion_spreads_and_decays() {
        let mut f = EnvFields::new(5, 5);
        f.stage_emission(12, 0.8, 3);
        f.diffuse_signals();
        assert!((f.signals[12] - 0.8).abs() < 1e-6);
        assert_eq!(f.signal_source[12], 3);

        // Next step: the center keeps 60%, each cardinal neighbor gets 7.5%.
        f.diffuse_signals();
        assert!((f.signals[12] - 0.48).abs() < 1e-5);
        for idx in [7, 11, 13, 17] {
            assert!((f.signals[idx] - 0.06).abs() < 1e-5);
            assert_eq!(f.signal_source[idx], 3, "source follows the scent");
        }
    }

    #[test]
    fn strongest_emitter_wins_the_source_cell() {
        let mut f = EnvFields::new(3, 1);
        f.stage_emission(1, 0.2, 7);
        f.stage_emission(1, 0.5, 9);
        f.diffuse_signals();
        assert_eq!(f.signal_source[1], 9);
    }

    #[test]
    fn diffusion_clamps_garbage_input() {
        let mut f = EnvFields::new(4, 4);
        for (i, v) in f.signals.iter_mut().enumerate() {
            *v = -1.0 + (i as f32) * 0.25; // spans [-1, 2.75]
        }
        f.clamp_all();
        f.stage_emission(5, 0.9, 2);
        f.diffuse_signals();
        assert!(
            f.signals.iter().all(|v| (0.0..=1.0).contains(v)),
            "diffusion left the unit interval"
        );
    }

    #[test]
    fn alarms_fade_faster_than_scent() {
        let mut scent = EnvFields::new(3, 3);
        scent.stage_emission(4, 0.6, 1);
        scent.diffuse_signals();
        scent.diffuse_signals();

        let mut alarm = EnvFields::new(3, 3);
        alarm.raise_alarm(4, 0.6, 1);
        alarm.diffuse_alarms();
        assert!(alarm.alarms[4] < scent.signals[4]);
    }
}
