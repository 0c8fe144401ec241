// Rhythm synthesis: one bar of sixteenth-note onsets built from named cells.
//
// A bar is four groups of four sixteenth slots. Each group independently
// draws one of six fixed cells using the style's weight vector, and the four
// cells concatenate into a 16-slot hit grid. A song draws its grid once and
// replays it in every bar, so the motif length is fixed by `hit_count()`.

use autocomposer_prng::SongRng;
use serde::{Deserialize, Serialize};

/// Sixteenth-note slots per bar.
pub const SLOTS_PER_BAR: usize = 16;

/// Slots per rhythm cell (one beat).
pub const SLOTS_PER_CELL: usize = 4;

/// Duration of one slot in beats.
pub const SLOT_BEATS: f64 = 0.25;

/// The six building-block onset patterns, in weight-vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RhythmCell {
    Quarter,
    Eighths,
    Gallop,
    Offbeat,
    Machine,
    Empty,
}

impl RhythmCell {
    /// Cells in the order the style weight vector addresses them.
    pub const ALL: [RhythmCell; 6] = [
        RhythmCell::Quarter,
        RhythmCell::Eighths,
        RhythmCell::Gallop,
        RhythmCell::Offbeat,
        RhythmCell::Machine,
        RhythmCell::Empty,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RhythmCell::Quarter => "quarter",
            RhythmCell::Eighths => "eighths",
            RhythmCell::Gallop => "gallop",
            RhythmCell::Offbeat => "offbeat",
            RhythmCell::Machine => "machine",
            RhythmCell::Empty => "empty",
        }
    }

    pub fn pattern(self) -> [bool; SLOTS_PER_CELL] {
        match self {
            RhythmCell::Quarter => [true, false, false, false],
            RhythmCell::Eighths => [true, false, true, false],
            RhythmCell::Gallop => [true, false, false, true],
            RhythmCell::Offbeat => [false, false, true, false],
            RhythmCell::Machine => [true, true, true, true],
            RhythmCell::Empty => [false, false, false, false],
        }
    }
}

/// A one-bar onset grid at sixteenth-note resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RhythmGrid {
    pub slots: [bool; SLOTS_PER_BAR],
}

impl RhythmGrid {
    pub fn from_cells(cells: [RhythmCell; SLOTS_PER_BAR / SLOTS_PER_CELL]) -> Self {
        let mut slots = [false; SLOTS_PER_BAR];
        for (group, cell) in cells.iter().enumerate() {
            let start = group * SLOTS_PER_CELL;
            slots[start..start + SLOTS_PER_CELL].copy_from_slice(&cell.pattern());
        }
        RhythmGrid { slots }
    }

    /// Number of onsets in the bar.
    pub fn hit_count(&self) -> usize {
        self.slots.iter().filter(|&&hit| hit).count()
    }

    /// Iterate over the indices of active slots, in order.
    pub fn hits(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|&(_, &hit)| hit)
            .map(|(i, _)| i)
    }

    /// Slots from `slot` up to the next onset, or to the end of the bar.
    ///
    /// Always at least 1.
    pub fn slots_until_next_hit(&self, slot: usize) -> usize {
        let next = self.slots[slot + 1..]
            .iter()
            .position(|&hit| hit)
            .map_or(SLOTS_PER_BAR, |offset| slot + 1 + offset);
        next - slot
    }

    /// Render as a compact `x.x.` string for logs.
    pub fn to_pattern_string(&self) -> String {
        self.slots.iter().map(|&hit| if hit { 'x' } else { '.' }).collect()
    }
}

/// Draw one bar's grid, four cells chosen by `weights`.
///
/// `weights` must contain at least one positive finite entry; style
/// validation guarantees that before generation starts. A group whose draw
/// fails (all weights unusable) is left empty.
pub fn generate_pattern(weights: &[f64; 6], rng: &mut SongRng) -> RhythmGrid {
    let mut cells = [RhythmCell::Empty; SLOTS_PER_BAR / SLOTS_PER_CELL];
    for cell in &mut cells {
        if let Some(idx) = rng.weighted_index(weights) {
            *cell = RhythmCell::ALL[idx];
        }
    }
    RhythmGrid::from_cells(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_nonzero_weight() {
        let mut rng = SongRng::new(1);
        let grid = generate_pattern(&[0.0, 0.0, 0.0, 0.0, 1.0, 0.0], &mut rng);
        assert_eq!(grid.slots.len(), 16);
        assert_eq!(grid.hit_count(), 16);

        let grid = generate_pattern(&[0.0, 0.0, 0.0, 0.0, 0.0, 5.0], &mut rng);
        assert_eq!(grid.hit_count(), 0);
    }

    #[test]
    fn test_equal_weights_stay_on_cell_boundaries() {
        let mut rng = SongRng::new(2);
        for _ in 0..500 {
            let grid = generate_pattern(&[1.0; 6], &mut rng);
            for group in grid.slots.chunks(SLOTS_PER_CELL) {
                let group: [bool; 4] = group.try_into().unwrap();
                assert!(RhythmCell::ALL.iter().any(|c| c.pattern() == group));
            }
        }
    }

    #[test]
    fn test_quarter_cells() {
        let grid = RhythmGrid::from_cells([RhythmCell::Quarter; 4]);
        assert_eq!(grid.to_pattern_string(), "x...x...x...x...");
        assert_eq!(grid.hit_count(), 4);
        assert_eq!(grid.hits().collect::<Vec<_>>(), vec![0, 4, 8, 12]);
    }

    #[test]
    fn test_slots_until_next_hit() {
        let grid = RhythmGrid::from_cells([
            RhythmCell::Gallop,
            RhythmCell::Empty,
            RhythmCell::Offbeat,
            RhythmCell::Empty,
        ]);
        assert_eq!(grid.to_pattern_string(), "x..x......x.....");
        assert_eq!(grid.slots_until_next_hit(0), 3);
        assert_eq!(grid.slots_until_next_hit(3), 7);
        // Last hit runs to the end of the bar.
        assert_eq!(grid.slots_until_next_hit(10), 6);
    }

    #[test]
    fn test_last_slot_hit_has_one_slot() {
        let grid = RhythmGrid::from_cells([RhythmCell::Machine; 4]);
        assert_eq!(grid.slots_until_next_hit(15), 1);
    }
}
