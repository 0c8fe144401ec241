// Harmonic model: a fixed chord vocabulary with weighted transitions.
//
// Each chord carries the scale its melody is drawn from, a root pitch for the
// bass/pad/counter voices, and a table of neighbour chords with relative
// weights. A song walks this graph one step per bar. Weights are proportional
// sampling weights, not probabilities: {"Dm": 0.5, "G7": 0.5, "C": 0.5} means
// each neighbour is equally likely even though the weights sum to 1.5.
//
// The vocabulary is built once (built-in table or JSON file), validated, and
// shared read-only by every song. Unknown symbols passed to `next_chord` fall
// back to `FALLBACK_CHORD`; that is the only silent recovery in generation.
//
// Consumed by arrangement.rs, which maps motif degrees to pitches with
// `ChordDefinition::degree_to_pitch`.

use crate::error::ConfigError;
use autocomposer_prng::SongRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Chord returned by `next_chord` when the current symbol is not in the
/// vocabulary.
pub const FALLBACK_CHORD: &str = "C";

/// Neighbour symbol -> relative transition weight.
pub type TransitionTable = BTreeMap<String, f64>;

/// One chord of the vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordDefinition {
    pub symbol: String,
    /// Absolute MIDI pitches available to the melody over this chord, ascending.
    pub scale: Vec<u8>,
    /// Root pitch; bass plays an octave below, pad an octave above.
    pub root: u8,
    pub neighbors: TransitionTable,
}

impl ChordDefinition {
    fn new(symbol: &str, scale: &[u8], root: u8, neighbors: &[(&str, f64)]) -> Self {
        ChordDefinition {
            symbol: symbol.to_string(),
            scale: scale.to_vec(),
            root,
            neighbors: neighbors
                .iter()
                .map(|&(s, w)| (s.to_string(), w))
                .collect(),
        }
    }

    /// Map a signed scale degree to an absolute pitch.
    ///
    /// `scale[degree mod L] + 12 * (degree div L)` with floor division, so
    /// degree -1 on a five-note scale is the top scale note an octave down.
    /// The result is unclamped and may leave the MIDI range. The scale must
    /// be non-empty, which `ChordVocabulary::validate` guarantees.
    pub fn degree_to_pitch(&self, degree: i32) -> i32 {
        let len = self.scale.len() as i32;
        let idx = degree.rem_euclid(len) as usize;
        let octave = degree.div_euclid(len);
        self.scale[idx] as i32 + 12 * octave
    }
}

/// The full chord table, in a fixed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordVocabulary {
    pub chords: Vec<ChordDefinition>,
}

impl ChordVocabulary {
    /// The built-in thirteen-chord vocabulary.
    pub fn standard() -> Self {
        ChordVocabulary {
            chords: vec![
                ChordDefinition::new(
                    "C",
                    &[60, 62, 64, 65, 67],
                    48,
                    &[("Em", 0.3), ("F", 0.3), ("G7", 0.3), ("C+", 0.1)],
                ),
                ChordDefinition::new(
                    "Am",
                    &[69, 71, 72, 74, 76],
                    45,
                    &[("Dm", 0.5), ("E7", 0.5)],
                ),
                ChordDefinition::new(
                    "Em",
                    &[64, 66, 67, 69, 71],
                    40,
                    &[("Am", 0.5), ("B7", 0.5)],
                ),
                ChordDefinition::new(
                    "F",
                    &[65, 67, 69, 70, 72],
                    41,
                    &[("G7", 0.5), ("C", 0.5), ("Dm", 0.5)],
                ),
                ChordDefinition::new(
                    "Dm",
                    &[62, 64, 65, 67, 69],
                    50,
                    &[("G7", 0.8), ("C", 0.2)],
                ),
                ChordDefinition::new(
                    "G7",
                    &[67, 69, 71, 74, 77],
                    43,
                    &[("C", 0.9), ("Am", 0.1)],
                ),
                ChordDefinition::new(
                    "E7",
                    &[64, 68, 71, 74, 76],
                    52,
                    &[("Am", 0.9), ("A", 0.1)],
                ),
                ChordDefinition::new(
                    "B7",
                    &[59, 63, 66, 69, 71],
                    47,
                    &[("Em", 0.8), ("E", 0.2)],
                ),
                ChordDefinition::new(
                    "E",
                    &[64, 66, 68, 69, 71],
                    52,
                    &[("A", 0.5), ("C#m", 0.5)],
                ),
                ChordDefinition::new(
                    "C#m",
                    &[61, 64, 66, 68, 71],
                    49,
                    &[("A", 0.5), ("E", 0.5)],
                ),
                ChordDefinition::new(
                    "A",
                    &[69, 71, 73, 74, 76],
                    45,
                    &[("D", 0.5), ("E", 0.5)],
                ),
                ChordDefinition::new(
                    "D",
                    &[62, 64, 66, 67, 69],
                    50,
                    &[("G7", 0.5), ("A", 0.5)],
                ),
                // Augmented: four-note scale.
                ChordDefinition::new(
                    "C+",
                    &[60, 64, 68, 72],
                    48,
                    &[("F", 0.5), ("Am", 0.5)],
                ),
            ],
        }
    }

    /// Load and validate a vocabulary from JSON.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let load_err = |reason: String| ConfigError::Load {
            path: path.to_path_buf(),
            reason,
        };
        let data = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let vocab: ChordVocabulary =
            serde_json::from_str(&data).map_err(|e| load_err(e.to_string()))?;
        vocab.validate()?;
        Ok(vocab)
    }

    /// Check that the table is closed under transitions and sampleable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidVocabulary(msg));
        if self.chords.is_empty() {
            return invalid("vocabulary is empty".into());
        }
        if self.get(FALLBACK_CHORD).is_none() {
            return invalid(format!("fallback chord '{FALLBACK_CHORD}' is missing"));
        }
        for (i, chord) in self.chords.iter().enumerate() {
            if self.chords[..i].iter().any(|c| c.symbol == chord.symbol) {
                return invalid(format!("duplicate chord '{}'", chord.symbol));
            }
            if chord.scale.is_empty() {
                return invalid(format!("chord '{}' has an empty scale", chord.symbol));
            }
            if chord.neighbors.is_empty() {
                return invalid(format!("chord '{}' has no neighbors", chord.symbol));
            }
            for (next, &weight) in &chord.neighbors {
                if !(weight.is_finite() && weight > 0.0) {
                    return invalid(format!(
                        "chord '{}' -> '{next}' has non-positive weight {weight}",
                        chord.symbol
                    ));
                }
                if self.get(next).is_none() {
                    return invalid(format!(
                        "chord '{}' references unknown neighbor '{next}'",
                        chord.symbol
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, symbol: &str) -> Option<&ChordDefinition> {
        self.chords.iter().find(|c| c.symbol == symbol)
    }

    /// Look up a starting chord, rejecting unknown symbols.
    pub fn require(&self, symbol: &str) -> Result<&ChordDefinition, ConfigError> {
        self.get(symbol)
            .ok_or_else(|| ConfigError::UnknownChord(symbol.to_string()))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.chords.iter().map(|c| c.symbol.as_str())
    }

    /// Pick a starting chord uniformly over the whole vocabulary.
    pub fn random_chord(&self, rng: &mut SongRng) -> &ChordDefinition {
        let idx = rng.range_usize(0, self.chords.len());
        &self.chords[idx]
    }

    /// One weighted step of the harmonic walk.
    ///
    /// Unknown `current` symbols return `FALLBACK_CHORD` without drawing.
    pub fn next_chord(&self, current: &str, rng: &mut SongRng) -> String {
        let Some(chord) = self.get(current) else {
            return FALLBACK_CHORD.to_string();
        };
        let weights: Vec<f64> = chord.neighbors.values().copied().collect();
        match rng.weighted_index(&weights) {
            Some(idx) => chord.neighbors.keys().nth(idx).cloned().unwrap_or_default(),
            // Unreachable for a validated table.
            None => FALLBACK_CHORD.to_string(),
        }
    }
}
