// Batch driver: compose, write, and transcribe a numbered series of songs.
//
// Every song gets its own `SongRng` seeded from (base seed, song id), so the
// songs are independent and are generated in parallel on the rayon pool.
// Results come back in id order regardless of scheduling. A song whose MIDI
// cannot be composed or written fails on its own; a failed transcription is
// logged and recorded in the summary but never fails the song or the batch.

use crate::arrangement::{SongRequest, Voice, compose, pick_style};
use crate::chord::ChordVocabulary;
use crate::error::{BatchError, ComposeError};
use crate::lilypond::transcribe;
use crate::midi::MidiSink;
use crate::sink::OutputSink;
use crate::style::{StyleKind, StyleRegistry};
use autocomposer_prng::{SongRng, song_seed};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What to generate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub count: usize,
    pub output_dir: PathBuf,
    pub base_seed: u64,
    /// Fixed style for every song; drawn per song when `None`.
    pub style: Option<StyleKind>,
    /// Fixed starting chord; drawn per song when `None`.
    pub start_chord: Option<String>,
    /// Also write a LilyPond score next to each MIDI file.
    pub transcribe: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            count: 20,
            output_dir: PathBuf::from("."),
            base_seed: 0,
            style: None,
            start_chord: None,
            transcribe: true,
        }
    }
}

/// Outcome of one successfully written song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongSummary {
    pub id: usize,
    pub seed: u64,
    pub style: StyleKind,
    pub tempo: u16,
    pub start_chord: String,
    pub chords: Vec<String>,
    pub midi_path: PathBuf,
    pub score_path: Option<PathBuf>,
    /// Set when transcription was requested and failed.
    pub transcription_error: Option<String>,
}

impl fmt::Display for SongSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:02}] Style: {:<10} | BPM: {} | Key: {}",
            self.id,
            self.style.name(),
            self.tempo,
            self.start_chord
        )
    }
}

/// Base name for song `id` (1-based), without extension.
pub fn song_basename(id: usize) -> String {
    format!("song_{id:03}")
}

/// Compose and write one song.
pub fn generate_song(
    id: usize,
    config: &BatchConfig,
    styles: &StyleRegistry,
    vocab: &ChordVocabulary,
) -> Result<SongSummary, BatchError> {
    let seed = song_seed(config.base_seed, id as u64);
    let mut rng = SongRng::new(seed);

    let style = match config.style {
        Some(kind) => kind,
        None => pick_style(styles, &mut rng).map_err(ComposeError::from)?,
    };
    let request = SongRequest {
        style,
        start_chord: config.start_chord.clone(),
    };
    let song = compose(&request, styles, vocab, &mut rng)?;

    let base = song_basename(id);
    let midi_path = config.output_dir.join(format!("{base}.mid"));
    let mut sink = MidiSink::with_track_names(&Voice::ALL.map(Voice::name));
    song.render(&mut sink)?;
    sink.finalize(&midi_path)?;
    log::info!("wrote {} ({} events)", midi_path.display(), song.events.len());

    let mut score_path = None;
    let mut transcription_error = None;
    if config.transcribe {
        let ly_path = config.output_dir.join(format!("{base}.ly"));
        match transcribe(&midi_path, &ly_path) {
            Ok(_) => {
                log::info!("sheet music saved: {}", ly_path.display());
                score_path = Some(ly_path);
            }
            Err(e) => {
                log::warn!("could not generate sheet music for {base}: {e}");
                transcription_error = Some(e.to_string());
            }
        }
    }

    Ok(SongSummary {
        id,
        seed,
        style: song.style,
        tempo: song.tempo,
        start_chord: song.initial_chord,
        chords: song.chords,
        midi_path,
        score_path,
        transcription_error,
    })
}

/// Generate songs `1..=count` in parallel. One result per song, in id order.
pub fn run_batch(
    config: &BatchConfig,
    styles: &StyleRegistry,
    vocab: &ChordVocabulary,
) -> Result<Vec<Result<SongSummary, BatchError>>, BatchError> {
    std::fs::create_dir_all(&config.output_dir).map_err(|source| BatchError::OutputDir {
        path: config.output_dir.clone(),
        source,
    })?;

    Ok((1..=config.count)
        .into_par_iter()
        .map(|id| generate_song(id, config, styles, vocab))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path) -> BatchConfig {
        BatchConfig {
            count: 4,
            output_dir: dir.to_path_buf(),
            base_seed: 7,
            ..Default::default()
        }
    }

    #[test]
    fn test_song_basename() {
        assert_eq!(song_basename(1), "song_001");
        assert_eq!(song_basename(20), "song_020");
    }

    #[test]
    fn test_summary_line() {
        let summary = SongSummary {
            id: 3,
            seed: 0,
            style: StyleKind::Doom,
            tempo: 80,
            start_chord: "C#m".into(),
            chords: vec![],
            midi_path: PathBuf::from("song_003.mid"),
            score_path: None,
            transcription_error: None,
        };
        assert_eq!(summary.to_string(), "[03] Style: DOOM       | BPM: 80 | Key: C#m");
    }

    #[test]
    fn test_batch_writes_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let styles = StyleRegistry::standard();
        let results = run_batch(&config, &styles, &ChordVocabulary::standard()).unwrap();
        assert_eq!(results.len(), 4);
        for (i, result) in results.iter().enumerate() {
            let summary = result.as_ref().unwrap();
            assert_eq!(summary.id, i + 1);
            assert!(summary.midi_path.exists());
            let score = summary.score_path.as_ref().unwrap();
            assert!(score.exists());
            assert!(summary.transcription_error.is_none());
        }
    }

    #[test]
    fn test_batch_is_reproducible() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let styles = StyleRegistry::standard();
        let vocab = ChordVocabulary::standard();
        let a = run_batch(&config_in(dir_a.path()), &styles, &vocab).unwrap();
        let b = run_batch(&config_in(dir_b.path()), &styles, &vocab).unwrap();
        for (x, y) in a.iter().zip(&b) {
            let (x, y) = (x.as_ref().unwrap(), y.as_ref().unwrap());
            assert_eq!((x.style, x.tempo, &x.chords), (y.style, y.tempo, &y.chords));
            let bytes_x = std::fs::read(&x.midi_path).unwrap();
            let bytes_y = std::fs::read(&y.midi_path).unwrap();
            assert_eq!(bytes_x, bytes_y);
        }
    }

    #[test]
    fn test_unknown_start_chord_fails_every_song() {
        let dir = tempfile::tempdir().unwrap();
        let config = BatchConfig {
            start_chord: Some("Zz".into()),
            transcribe: false,
            ..config_in(dir.path())
        };
        let styles = StyleRegistry::standard();
        let results = run_batch(&config, &styles, &ChordVocabulary::standard()).unwrap();
        assert!(results.iter().all(|r| matches!(r, Err(BatchError::Compose(_)))));
        assert!(!dir.path().join("song_001.mid").exists());
    }

    #[test]
    fn test_empty_registry_fails_every_song() {
        let dir = tempfile::tempdir().unwrap();
        let config = BatchConfig { transcribe: false, ..config_in(dir.path()) };
        let styles = StyleRegistry { styles: Vec::new() };
        let results = run_batch(&config, &styles, &ChordVocabulary::standard()).unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| matches!(r, Err(BatchError::Compose(_)))));
    }

    #[test]
    fn test_fixed_style_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let config = BatchConfig {
            style: Some(StyleKind::Thrash),
            transcribe: false,
            ..config_in(dir.path())
        };
        let styles = StyleRegistry::standard();
        let results = run_batch(&config, &styles, &ChordVocabulary::standard()).unwrap();
        for r in results {
            let summary = r.unwrap();
            assert_eq!(summary.style, StyleKind::Thrash);
            assert!((150..=175).contains(&summary.tempo));
            assert!(summary.score_path.is_none());
        }
    }
}
