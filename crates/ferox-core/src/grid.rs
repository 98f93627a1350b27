use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicUsize, Ordering};

/// 8-neighborhood offsets, clockwise from north. Spread weights and
/// per-direction success history use this order.
pub const NEIGHBORS_8: [(i32, i32); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

/// 4-neighborhood offsets (N, E, S, W).
pub const NEIGHBORS_4: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

/// Per-direction distance normalization: 1.0 for cardinals, 1/√2 for
/// diagonals, indexed like `NEIGHBORS_8`.
pub const DIR_WEIGHT: [f32; 8] = [
    1.0,
    std::f32::consts::FRAC_1_SQRT_2,
    1.0,
    std::f32::consts::FRAC_1_SQRT_2,
    1.0,
    std::f32::consts::FRAC_1_SQRT_2,
    1.0,
    std::f32::consts::FRAC_1_SQRT_2,
];

/// One grid site. `colony_id == 0` means empty. Only `colony_id` and `age`
/// are touched by the parallel phases; `is_border` is refreshed serially and
/// may be stale in between.
#[derive(Debug, Default)]
pub struct Cell {
    pub colony_id: AtomicU32,
    pub age: AtomicU8,
    pub is_border: AtomicBool,
}

impl Cell {
    pub fn colony_id(&self) -> u32 {
        self.colony_id.load(Ordering::Acquire)
    }

    pub fn age(&self) -> u8 {
        self.age.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.colony_id() == 0
    }

    /// Saturating age increment.
    pub fn bump_age(&self) {
        let _ = self
            .age
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |a| {
                (a < u8::MAX).then(|| a + 1)
            });
    }
}

/// Flat row-major grid of atomic cells, double-buffered.
///
/// The CAS spread design resolves claims directly on the current buffer; the
/// second buffer exists for a future ping-pong execution strategy and is
/// flipped to only at explicit `swap()` points, after a pool barrier.
pub struct CellGrid {
    width: usize,
    height: usize,
    buffers: [Vec<Cell>; 2],
    current: AtomicUsize,
}

impl CellGrid {
    pub fn new(width: usize, height: usize) -> Self {
        let len = width * height;
        let alloc = |n: usize| (0..n).map(|_| Cell::default()).collect::<Vec<_>>();
        Self {
            width,
            height,
            buffers: [alloc(len), alloc(len)],
            current: AtomicUsize::new(0),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y * self.width + x
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Read buffer for this tick.
    pub fn current(&self) -> &[Cell] {
        &self.buffers[self.current.load(Ordering::Acquire) & 1]
    }

    /// Write buffer for a ping-pong pass. Unused by the CAS pipeline, which
    /// mutates `current()` in place.
    pub fn next(&self) -> &[Cell] {
        &self.buffers[(self.current.load(Ordering::Acquire) + 1) & 1]
    }

    /// Flip the buffer index. Only sound after a pool barrier.
    pub fn swap(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
    }

    /// Bounds-checked cell access in the current buffer.
    pub fn get(&self, x: i32, y: i32) -> Option<&Cell> {
        if !self.in_bounds(x, y) {
            return None;
        }
        Some(&self.current()[y as usize * self.width + x as usize])
    }

    #[inline]
    pub fn cell(&self, idx: usize) -> &Cell {
        &self.current()[idx]
    }

    /// Atomically claim `cell` for `desired` if it still holds `expected`.
    /// This is the only way ownership changes during the parallel phases.
    pub fn try_claim(cell: &Cell, expected: u32, desired: u32) -> bool {
        cell.colony_id
            .compare_exchange(expected, desired, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Serial helper: overwrite ownership unconditionally (combat, spawns,
    /// cell death). Resets age on owner change.
    pub fn set_owner(&self, idx: usize, id: u32) {
        let cell = self.cell(idx);
        let prev = cell.colony_id.swap(id, Ordering::AcqRel);
        if prev != id {
            cell.age.store(0, Ordering::Relaxed);
        }
    }

    /// Serial relabel that keeps the cell's age: divisions, speciation
    /// carve-offs and merges move whole populations, not fresh claims.
    pub fn relabel(&self, idx: usize, id: u32) {
        self.cell(idx).colony_id.store(id, Ordering::Release);
    }

    /// Recompute `is_border` for every occupied cell from the 4-neighborhood.
    /// Grid-edge cells count as border.
    pub fn refresh_borders(&self) {
        let cells = self.current();
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                let idx = y as usize * self.width + x as usize;
                let id = cells[idx].colony_id();
                if id == 0 {
                    cells[idx].is_border.store(false, Ordering::Relaxed);
                    continue;
                }
                let mut border = false;
                for (dx, dy) in NEIGHBORS_4 {
                    let (nx, ny) = (x + dx, y + dy);
                    if !self.in_bounds(nx, ny) {
                        border = true;
                        break;
                    }
                    if cells[ny as usize * self.width + nx as usize].colony_id() != id {
                        border = true;
                        break;
                    }
                }
                cells[idx].is_border.store(border, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_succeeds_only_from_expected_owner() {
        let grid = CellGrid::new(4, 4);
        let cell = grid.get(1, 1).unwrap();
        assert!(CellGrid::try_claim(cell, 0, 7));
        assert_eq!(cell.colony_id(), 7);
        assert!(!CellGrid::try_claim(cell, 0, 9), "cell already owned");
        assert_eq!(cell.colony_id(), 7);
    }

    #[test]
    fn age_saturates_at_255() {
        let grid = CellGrid::new(2, 2);
        let cell = grid.get(0, 0).unwrap();
        for _ in 0..300 {
            cell.bump_age();
        }
        assert_eq!(cell.age(), u8::MAX);
    }

    #[test]
    fn get_rejects_out_of_bounds() {
        let grid = CellGrid::new(3, 5);
        assert!(grid.get(-1, 0).is_none());
        assert!(grid.get(0, -1).is_none());
        assert!(grid.get(3, 0).is_none());
        assert!(grid.get(0, 5).is_none());
        assert!(grid.get(2, 4).is_some());
    }

    #[test]
    fn swap_flips_read_buffer() {
        let grid = CellGrid::new(2, 2);
        grid.current()[0].colony_id.store(5, Ordering::Release);
        grid.swap();
        assert_eq!(grid.current()[0].colony_id(), 0, "next buffer is untouched");
        grid.swap();
        assert_eq!(grid.current()[0].colony_id(), 5);
    }

    #[test]
    fn border_flags_follow_four_neighborhood() {
        let grid = CellGrid::new(5, 5);
        // 3×3 block of colony 1 centered at (2,2).
        for y in 1..=3 {
            for x in 1..=3 {
                grid.set_owner(grid.index(x, y), 1);
            }
        }
        grid.refresh_borders();
        let center = grid.get(2, 2).unwrap();
        assert!(!center.is_border.load(Ordering::Relaxed));
        for (x, y) in [(1, 1), (2, 1), (3, 2), (2, 3)] {
            let cell = grid.get(x, y).unwrap();
            assert!(
                cell.is_border.load(Ordering::Relaxed),
                "({x},{y}) should be border"
            );
        }
    }

    #[test]
    fn edge_cells_are_border() {
        let grid = CellGrid::new(3, 3);
        grid.set_owner(grid.index(0, 0), 2);
        grid.refresh_borders();
        assert!(grid.get(0, 0).unwrap().is_border.load(Ordering::Relaxed));
    }
}
