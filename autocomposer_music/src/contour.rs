// Melodic contour: a random walk over scale degrees.
//
// A motif is a sequence of signed degree offsets, independent of any chord.
// The walk starts at degree 0 and after each emitted value moves either by a
// step (±1) or, with probability `chaos_bias`, by a leap (±2 or ±3). The walk
// is unbounded; arrangement.rs folds degrees into the current chord's scale.

use autocomposer_prng::SongRng;
use serde::{Deserialize, Serialize};

const STEPS: [i32; 2] = [-1, 1];
const LEAPS: [i32; 4] = [-3, -2, 2, 3];

/// A reusable melodic shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Motif {
    pub degrees: Vec<i32>,
}

impl Motif {
    pub fn len(&self) -> usize {
        self.degrees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.degrees.is_empty()
    }
}

/// Generate a motif of exactly `length` degrees. The first is always 0.
pub fn generate_motif(length: usize, chaos_bias: f64, rng: &mut SongRng) -> Motif {
    let mut degrees = Vec::with_capacity(length);
    let mut current = 0i32;
    for _ in 0..length {
        degrees.push(current);
        let moves: &[i32] = if rng.random_bool(chaos_bias) { &LEAPS } else { &STEPS };
        current += rng.choose(moves).copied().unwrap_or(0);
    }
    Motif { degrees }
}
