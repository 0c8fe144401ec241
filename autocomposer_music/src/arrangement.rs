// Arrangement engine: turns a style, a chord walk, a rhythm grid, and two
// motifs into timed note events for five voices over sixteen bars.
//
// Per song, in draw order: tempo, starting chord (if not given), the single
// rhythm grid, the primary motif, the secondary motif. Then per bar: bass
// draws, then for each melody onset a duration draw, an ornament draw and a
// velocity draw, and finally the next chord. Keeping that order fixed is what
// makes a seed reproduce a song exactly.
//
// Bar layout (beats from the bar's start):
// - bass: per `BassMode`, an octave below the root
// - pad: root + 12, whole bar
// - counter: root - 12 and root - 5, one beat each, both at beat 0
// - drums: kick at 0, snare at 1 and 3, style extra kicks, closed hat on
//   every eighth
// - melody: one note per grid onset; the third bar of every four-bar phrase
//   (bar index % 4 == 2) uses the secondary motif
//
// Style and chord lookups and table validation happen before the first
// random draw, so an unknown style, an unknown starting chord, or a malformed
// table never produces a partial song.

use crate::chord::{ChordDefinition, ChordVocabulary};
use crate::contour::{Motif, generate_motif};
use crate::error::{ComposeError, ConfigError, OutputError};
use crate::rhythm::{RhythmGrid, SLOT_BEATS, generate_pattern};
use crate::sink::OutputSink;
use crate::style::{BassMode, DurationPolicy, Style, StyleKind, StyleRegistry};
use autocomposer_prng::SongRng;
use serde::{Deserialize, Serialize};

pub const BARS_PER_SONG: usize = 16;
pub const BEATS_PER_BAR: f64 = 4.0;

/// Probability that each beat of `BassMode::Random` sounds.
pub const RANDOM_BASS_KEEP: f64 = 0.7;

/// Probability of a chromatic grace run before a melody note.
pub const GRACE_CHANCE: f64 = 0.15;

/// (semitones below target, beats before onset, velocity) for the grace run.
const GRACE_RUN: [(i32, f64, u8); 3] = [(3, 0.15, 80), (2, 0.10, 90), (1, 0.05, 100)];
const GRACE_BEATS: f64 = 0.05;

const PAD_PROGRAM: u8 = 48;
const COUNTER_PROGRAM: u8 = 30;

const KICK: u8 = 36;
const SNARE: u8 = 38;
const CLOSED_HAT: u8 = 42;

/// The five parts of an arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Voice {
    Melody = 0,
    Bass = 1,
    Pad = 2,
    Counter = 3,
    Drums = 4,
}

impl Voice {
    pub const ALL: [Voice; 5] = [
        Voice::Melody,
        Voice::Bass,
        Voice::Pad,
        Voice::Counter,
        Voice::Drums,
    ];

    /// Output track, one per voice.
    pub fn track(self) -> usize {
        self as usize
    }

    /// MIDI channel. Drums sit on the General MIDI percussion channel.
    pub fn channel(self) -> u8 {
        match self {
            Voice::Drums => 9,
            other => other as u8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Voice::Melody => "Melody",
            Voice::Bass => "Bass",
            Voice::Pad => "Pad",
            Voice::Counter => "Counter",
            Voice::Drums => "Drums",
        }
    }
}

/// A single timed note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub voice: Voice,
    pub pitch: u8,
    /// Onset in beats from the start of the song. Grace notes ahead of the
    /// very first slot are slightly negative.
    pub start: f64,
    /// Length in beats.
    pub duration: f64,
    pub velocity: u8,
}

/// What to compose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRequest {
    pub style: StyleKind,
    /// Starting chord; drawn uniformly from the vocabulary when `None`.
    pub start_chord: Option<String>,
}

/// A finished arrangement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub style: StyleKind,
    pub tempo: u16,
    pub initial_chord: String,
    /// One chord per bar; `chords[0] == initial_chord`.
    pub chords: Vec<String>,
    pub rhythm: RhythmGrid,
    pub primary: Motif,
    pub secondary: Motif,
    /// Program per pitched voice.
    pub programs: Vec<(Voice, u8)>,
    pub events: Vec<NoteEvent>,
}

impl Song {
    pub fn voice_events(&self, voice: Voice) -> impl Iterator<Item = &NoteEvent> {
        self.events.iter().filter(move |e| e.voice == voice)
    }

    /// Total length in beats.
    pub fn length_beats(&self) -> f64 {
        self.chords.len() as f64 * BEATS_PER_BAR
    }

    /// Replay the song into an output sink: tempo, programs, then notes.
    pub fn render(&self, sink: &mut impl OutputSink) -> Result<(), OutputError> {
        sink.set_tempo(0, 0.0, self.tempo)?;
        for &(voice, program) in &self.programs {
            sink.set_instrument(voice.track(), voice.channel(), 0.0, program)?;
        }
        for e in &self.events {
            sink.emit_note(
                e.voice.track(),
                e.voice.channel(),
                e.pitch,
                e.start,
                e.duration,
                e.velocity,
            )?;
        }
        Ok(())
    }
}

/// Pick a style uniformly from the registry.
pub fn pick_style(styles: &StyleRegistry, rng: &mut SongRng) -> Result<StyleKind, ConfigError> {
    rng.choose(&styles.styles)
        .map(|s| s.kind)
        .ok_or_else(|| ConfigError::InvalidStyle {
            style: "<registry>".into(),
            reason: "no styles defined".into(),
        })
}

/// Compose one sixteen-bar song.
///
/// The chosen style and the whole vocabulary are validated first, so tables
/// built in code get the same checks as tables loaded from JSON.
pub fn compose(
    request: &SongRequest,
    styles: &StyleRegistry,
    vocab: &ChordVocabulary,
    rng: &mut SongRng,
) -> Result<Song, ComposeError> {
    let style = styles.get(request.style)?;
    style.validate()?;
    vocab.validate()?;
    let requested_start = match &request.start_chord {
        Some(symbol) => Some(vocab.require(symbol)?),
        None => None,
    };

    let tempo = rng.range_u16_inclusive(style.tempo.0, style.tempo.1);
    let start = match requested_start {
        Some(chord) => chord,
        None => vocab.random_chord(rng),
    };
    let rhythm = generate_pattern(&style.rhythm_weights, rng);
    let hits = rhythm.hit_count();
    let primary = generate_motif(hits, style.chaos_bias, rng);
    let secondary = generate_motif(hits, style.chaos_bias, rng);

    log::debug!(
        "{}: {} bpm, start {}, grid {} ({} hits)",
        style.kind,
        tempo,
        start.symbol,
        rhythm.to_pattern_string(),
        hits
    );

    let mut arranger = Arranger {
        style,
        rhythm: &rhythm,
        events: Vec::new(),
    };
    let mut chords = Vec::with_capacity(BARS_PER_SONG);
    let mut current = start.symbol.clone();

    for bar in 0..BARS_PER_SONG {
        let chord = vocab.require(&current)?;
        let cursor = bar as f64 * BEATS_PER_BAR;
        let motif = if bar % 4 == 2 { &secondary } else { &primary };
        log::debug!("bar {bar}: {current}");

        arranger.bass(chord, cursor, rng);
        arranger.pad_and_counter(chord, cursor);
        arranger.drums(cursor);
        arranger.melody(chord, motif, bar, cursor, rng)?;

        chords.push(current.clone());
        current = vocab.next_chord(&current, rng);
    }

    Ok(Song {
        style: style.kind,
        tempo,
        initial_chord: start.symbol.clone(),
        chords,
        rhythm,
        primary,
        secondary,
        programs: vec![
            (Voice::Melody, style.melody_program),
            (Voice::Bass, style.bass_program),
            (Voice::Pad, PAD_PROGRAM),
            (Voice::Counter, COUNTER_PROGRAM),
        ],
        events: arranger.events,
    })
}

/// Fold a pitch into the MIDI range by whole octaves.
fn fold_pitch(pitch: i32) -> u8 {
    let mut p = pitch;
    while p > 127 {
        p -= 12;
    }
    while p < 0 {
        p += 12;
    }
    p as u8
}

/// Per-song arrangement state: the style, the song's grid, and the events
/// accumulated so far.
struct Arranger<'a> {
    style: &'a Style,
    rhythm: &'a RhythmGrid,
    events: Vec<NoteEvent>,
}

impl Arranger<'_> {
    fn push(&mut self, voice: Voice, pitch: i32, start: f64, duration: f64, velocity: u8) {
        self.events.push(NoteEvent {
            voice,
            pitch: fold_pitch(pitch),
            start,
            duration,
            velocity,
        });
    }

    fn bass(&mut self, chord: &ChordDefinition, cursor: f64, rng: &mut SongRng) {
        let low = chord.root as i32 - 12;
        match self.style.bass_mode {
            BassMode::Sustain => self.push(Voice::Bass, low, cursor, BEATS_PER_BAR, 100),
            BassMode::Pump => {
                for i in 0..8 {
                    self.push(Voice::Bass, low, cursor + i as f64 * 0.5, 0.5, 110);
                }
            }
            BassMode::Octave => {
                for i in 0..8 {
                    let pitch = if i % 2 == 0 { low } else { chord.root as i32 };
                    self.push(Voice::Bass, pitch, cursor + i as f64 * 0.5, 0.5, 110);
                }
            }
            BassMode::Random => {
                for beat in 0..4 {
                    if rng.random_bool(RANDOM_BASS_KEEP) {
                        self.push(Voice::Bass, low, cursor + beat as f64, 1.0, 100);
                    }
                }
            }
        }
    }

    fn pad_and_counter(&mut self, chord: &ChordDefinition, cursor: f64) {
        let root = chord.root as i32;
        self.push(Voice::Pad, root + 12, cursor, BEATS_PER_BAR, 60);
        self.push(Voice::Counter, root - 12, cursor, 1.0, 85);
        self.push(Voice::Counter, root - 5, cursor, 1.0, 85);
    }

    fn drums(&mut self, cursor: f64) {
        self.push(Voice::Drums, KICK as i32, cursor, 1.0, 120);
        self.push(Voice::Drums, SNARE as i32, cursor + 1.0, 1.0, 120);
        self.push(Voice::Drums, SNARE as i32, cursor + 3.0, 1.0, 120);
        let style = self.style;
        for hit in &style.extra_kicks {
            self.push(Voice::Drums, KICK as i32, cursor + hit.offset, 1.0, hit.velocity);
        }
        for eighth in 0..8 {
            self.push(Voice::Drums, CLOSED_HAT as i32, cursor + eighth as f64 * 0.5, 0.5, 90);
        }
    }

    /// One melody note per grid onset, consuming the motif in order.
    fn melody(
        &mut self,
        chord: &ChordDefinition,
        motif: &Motif,
        bar: usize,
        cursor: f64,
        rng: &mut SongRng,
    ) -> Result<(), ComposeError> {
        let rhythm = self.rhythm;
        for (note_index, slot) in rhythm.hits().enumerate() {
            let degree = *motif
                .degrees
                .get(note_index)
                .ok_or(ComposeError::MotifExhausted {
                    bar,
                    slot,
                    motif_len: motif.len(),
                })?;
            let target = chord.degree_to_pitch(degree);
            let onset = cursor + slot as f64 * SLOT_BEATS;
            let max_duration = rhythm.slots_until_next_hit(slot) as f64 * SLOT_BEATS;

            let duration = self.note_duration(max_duration, rng);

            if rng.random_bool(GRACE_CHANCE) {
                for (below, lead, velocity) in GRACE_RUN {
                    self.push(Voice::Melody, target - below, onset - lead, GRACE_BEATS, velocity);
                }
            }

            let velocity = rng.range_u8_inclusive(90, 127);
            self.push(Voice::Melody, target, onset, duration, velocity);
        }
        Ok(())
    }

    fn note_duration(&self, max_duration: f64, rng: &mut SongRng) -> f64 {
        match &self.style.duration {
            DurationPolicy::Staccato { chance, short } => {
                if rng.random_bool(*chance) { *short } else { max_duration }
            }
            DurationPolicy::Sustained { chance, long, short } => {
                if rng.random_bool(*chance) { *long } else { *short }
            }
            DurationPolicy::Scattered { choices } => {
                rng.choose(choices).copied().unwrap_or(max_duration)
            }
            DurationPolicy::Proportional { factor } => max_duration * factor,
        }
    }
}
