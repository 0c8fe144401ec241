// Autocomposer: style-driven procedural band arranger.
//
// Produces sixteen-bar songs for five voices (melody, bass, pad,
// counter-melody, drums) from a named style and a starting chord. Four small
// stochastic generators feed one arrangement engine:
//
// - chord.rs: Chord vocabulary with weighted neighbour transitions and
//   floor-modulo scale-degree -> pitch mapping
// - rhythm.rs: Six named one-beat cells combined into a 16-slot bar grid
// - contour.rs: Step/leap random walk producing scale-degree motifs
// - style.rs: Per-style tempo, rhythm weights, programs, bass mode, and
//   melody duration policy
// - arrangement.rs: The bar-by-bar engine that turns all of the above into
//   timed note events
// - sink.rs: `OutputSink` trait the engine renders into
// - midi.rs: Standard MIDI File implementation of `OutputSink`
// - lilypond.rs: Sixteenth-quantized LilyPond transcription of a MIDI file
// - batch.rs: Parallel generation of numbered songs with per-song seeds
// - error.rs: Error types for each stage
//
// Generation is deterministic given a seed: every random draw goes through
// an explicit `autocomposer_prng::SongRng`.

pub mod arrangement;
pub mod batch;
pub mod chord;
pub mod contour;
pub mod error;
pub mod lilypond;
pub mod midi;
pub mod rhythm;
pub mod sink;
pub mod style;
