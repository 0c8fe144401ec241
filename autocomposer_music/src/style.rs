// Style registry: per-genre arrangement parameters.
//
// A style fixes the tempo range, the rhythm-cell weights, the melody and bass
// programs, how the bass articulates the root, how long melody notes ring,
// how chaotic the motif walk is, and any extra kick drum hits. The policy
// branches are closed enums so the engine matches on them exhaustively
// instead of comparing style names.
//
// Like the chord vocabulary, the registry is built once (built-in presets or
// JSON), validated, and shared read-only by every song.

use crate::error::ConfigError;
use crate::midi::MIN_BPM;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// The named styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StyleKind {
    Doom,
    Thrash,
    FunkMetal,
    Chaos,
}

impl StyleKind {
    pub const ALL: [StyleKind; 4] = [
        StyleKind::Doom,
        StyleKind::Thrash,
        StyleKind::FunkMetal,
        StyleKind::Chaos,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StyleKind::Doom => "DOOM",
            StyleKind::Thrash => "THRASH",
            StyleKind::FunkMetal => "FUNK_METAL",
            StyleKind::Chaos => "CHAOS",
        }
    }
}

impl fmt::Display for StyleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StyleKind {
    type Err = ConfigError;

    /// Case-insensitive; `funk-metal` and `funk_metal` both work.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        StyleKind::ALL
            .into_iter()
            .find(|k| k.name() == normalized)
            .ok_or_else(|| ConfigError::UnknownStyle(s.to_string()))
    }
}

/// How the bass voice articulates the chord root across a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BassMode {
    /// One whole-bar note.
    Sustain,
    /// Eight half-beat notes on the low root.
    Pump,
    /// Eight half-beat notes alternating low root and root.
    Octave,
    /// Four one-beat notes, each kept with `RANDOM_BASS_KEEP` probability.
    Random,
}

/// How long each melody note rings, given the room before the next onset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DurationPolicy {
    /// `short` with probability `chance`, otherwise the full gap.
    Staccato { chance: f64, short: f64 },
    /// `long` with probability `chance`, otherwise `short`. Ignores the gap.
    Sustained { chance: f64, long: f64, short: f64 },
    /// Uniform pick from `choices`. Ignores the gap.
    Scattered { choices: Vec<f64> },
    /// `factor` times the gap.
    Proportional { factor: f64 },
}

/// An extra kick drum hit at a beat offset within the bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrumHit {
    pub offset: f64,
    pub velocity: u8,
}

/// All parameters of one style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub kind: StyleKind,
    /// Inclusive BPM range.
    pub tempo: (u16, u16),
    /// Relative weights for quarter, eighths, gallop, offbeat, machine, empty.
    pub rhythm_weights: [f64; 6],
    pub melody_program: u8,
    pub bass_program: u8,
    pub bass_mode: BassMode,
    pub duration: DurationPolicy,
    /// Probability of a leap in the motif walk.
    pub chaos_bias: f64,
    #[serde(default)]
    pub extra_kicks: Vec<DrumHit>,
}

impl Style {
    pub fn doom() -> Self {
        Style {
            kind: StyleKind::Doom,
            tempo: (70, 90),
            rhythm_weights: [50.0, 20.0, 20.0, 0.0, 0.0, 10.0],
            melody_program: 30,
            bass_program: 33,
            bass_mode: BassMode::Sustain,
            duration: DurationPolicy::Sustained { chance: 0.6, long: 1.0, short: 0.25 },
            chaos_bias: 0.3,
            extra_kicks: Vec::new(),
        }
    }

    pub fn thrash() -> Self {
        Style {
            kind: StyleKind::Thrash,
            tempo: (150, 175),
            rhythm_weights: [10.0, 30.0, 30.0, 10.0, 20.0, 0.0],
            melody_program: 29,
            bass_program: 34,
            bass_mode: BassMode::Pump,
            duration: DurationPolicy::Staccato { chance: 0.7, short: 0.15 },
            chaos_bias: 0.3,
            extra_kicks: vec![
                DrumHit { offset: 2.0, velocity: 120 },
                DrumHit { offset: 2.5, velocity: 110 },
            ],
        }
    }

    pub fn funk_metal() -> Self {
        Style {
            kind: StyleKind::FunkMetal,
            tempo: (105, 125),
            rhythm_weights: [20.0, 30.0, 0.0, 40.0, 10.0, 0.0],
            melody_program: 7,
            bass_program: 36,
            bass_mode: BassMode::Octave,
            duration: DurationPolicy::Proportional { factor: 0.8 },
            chaos_bias: 0.3,
            extra_kicks: vec![DrumHit { offset: 2.5, velocity: 110 }],
        }
    }

    pub fn chaos() -> Self {
        Style {
            kind: StyleKind::Chaos,
            tempo: (120, 140),
            rhythm_weights: [15.0, 15.0, 15.0, 15.0, 20.0, 20.0],
            melody_program: 80,
            bass_program: 38,
            bass_mode: BassMode::Random,
            duration: DurationPolicy::Scattered { choices: vec![0.1, 0.25, 0.5] },
            chaos_bias: 0.6,
            extra_kicks: Vec::new(),
        }
    }

    /// Reject parameter sets the engine cannot sample from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| {
            Err(ConfigError::InvalidStyle {
                style: self.kind.to_string(),
                reason,
            })
        };
        let unit = |p: f64| (0.0..=1.0).contains(&p);
        let positive = |d: f64| d.is_finite() && d > 0.0;

        if self.tempo.0 < MIN_BPM || self.tempo.0 > self.tempo.1 {
            return invalid(format!("bad tempo range {:?}", self.tempo));
        }
        if self.rhythm_weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return invalid("rhythm weights must be finite and non-negative".into());
        }
        if self.rhythm_weights.iter().sum::<f64>() <= 0.0 {
            return invalid("rhythm weights sum to zero".into());
        }
        if self.melody_program > 127 || self.bass_program > 127 {
            return invalid("program numbers must be 0-127".into());
        }
        if !unit(self.chaos_bias) {
            return invalid(format!("chaos bias {} outside [0, 1]", self.chaos_bias));
        }
        match &self.duration {
            DurationPolicy::Staccato { chance, short } => {
                if !unit(*chance) || !positive(*short) {
                    return invalid("bad staccato policy".into());
                }
            }
            DurationPolicy::Sustained { chance, long, short } => {
                if !unit(*chance) || !positive(*long) || !positive(*short) {
                    return invalid("bad sustained policy".into());
                }
            }
            DurationPolicy::Scattered { choices } => {
                if choices.is_empty() || !choices.iter().all(|&d| positive(d)) {
                    return invalid("scattered policy needs positive choices".into());
                }
            }
            DurationPolicy::Proportional { factor } => {
                if !positive(*factor) {
                    return invalid("proportional factor must be positive".into());
                }
            }
        }
        for hit in &self.extra_kicks {
            if !(0.0..4.0).contains(&hit.offset) || hit.velocity > 127 {
                return invalid(format!("bad extra kick {hit:?}"));
            }
        }
        Ok(())
    }
}

/// The set of available styles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRegistry {
    pub styles: Vec<Style>,
}

impl StyleRegistry {
    /// The four built-in styles.
    pub fn standard() -> Self {
        StyleRegistry {
            styles: vec![Style::doom(), Style::thrash(), Style::funk_metal(), Style::chaos()],
        }
    }

    /// Load and validate a registry from JSON.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let load_err = |reason: String| ConfigError::Load {
            path: path.to_path_buf(),
            reason,
        };
        let data = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let registry: StyleRegistry =
            serde_json::from_str(&data).map_err(|e| load_err(e.to_string()))?;
        registry.validate()?;
        Ok(registry)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.styles.is_empty() {
            return Err(ConfigError::InvalidStyle {
                style: "<registry>".into(),
                reason: "no styles defined".into(),
            });
        }
        for (i, style) in self.styles.iter().enumerate() {
            if self.styles[..i].iter().any(|s| s.kind == style.kind) {
                return Err(ConfigError::InvalidStyle {
                    style: style.kind.to_string(),
                    reason: "defined twice".into(),
                });
            }
            style.validate()?;
        }
        Ok(())
    }

    pub fn get(&self, kind: StyleKind) -> Result<&Style, ConfigError> {
        self.styles
            .iter()
            .find(|s| s.kind == kind)
            .ok_or_else(|| ConfigError::UnknownStyle(kind.to_string()))
    }

    /// Look up a style by its user-facing name.
    pub fn by_name(&self, name: &str) -> Result<&Style, ConfigError> {
        self.get(name.parse()?)
    }
}
