// Output sink: the seam between arrangement and serialization.
//
// `Song::render` drives any implementation with tempo, program, and note
// calls in beat time; `finalize` writes the artifact. midi.rs provides the
// Standard MIDI File implementation.

use crate::error::OutputError;
use std::path::Path;

/// Receives a song's events and serializes them.
///
/// Times and durations are in beats. Tracks are zero-based; channel 9 is
/// percussion.
pub trait OutputSink {
    fn set_tempo(&mut self, track: usize, time: f64, bpm: u16) -> Result<(), OutputError>;

    fn set_instrument(
        &mut self,
        track: usize,
        channel: u8,
        time: f64,
        program: u8,
    ) -> Result<(), OutputError>;

    fn emit_note(
        &mut self,
        track: usize,
        channel: u8,
        pitch: u8,
        start: f64,
        duration: f64,
        velocity: u8,
    ) -> Result<(), OutputError>;

    /// Write everything received so far to `destination`.
    fn finalize(&mut self, destination: &Path) -> Result<(), OutputError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrangement::{SongRequest, Voice, compose};
    use crate::chord::ChordVocabulary;
    use crate::style::{StyleKind, StyleRegistry};
    use autocomposer_prng::SongRng;

    /// Records calls instead of serializing them.
    #[derive(Default)]
    struct CallLog {
        tempos: Vec<(usize, u16)>,
        programs: Vec<(usize, u8, u8)>,
        notes: Vec<(usize, u8, u8)>,
    }

    impl OutputSink for CallLog {
        fn set_tempo(&mut self, track: usize, _time: f64, bpm: u16) -> Result<(), OutputError> {
            self.tempos.push((track, bpm));
            Ok(())
        }

        fn set_instrument(
            &mut self,
            track: usize,
            channel: u8,
            _time: f64,
            program: u8,
        ) -> Result<(), OutputError> {
            self.programs.push((track, channel, program));
            Ok(())
        }

        fn emit_note(
            &mut self,
            track: usize,
            channel: u8,
            pitch: u8,
            _start: f64,
            _duration: f64,
            _velocity: u8,
        ) -> Result<(), OutputError> {
            self.notes.push((track, channel, pitch));
            Ok(())
        }

        fn finalize(&mut self, _destination: &Path) -> Result<(), OutputError> {
            Ok(())
        }
    }

    #[test]
    fn test_render_replays_song() {
        let mut rng = SongRng::new(10);
        let song = compose(
            &SongRequest { style: StyleKind::Doom, start_chord: Some("C".into()) },
            &StyleRegistry::standard(),
            &ChordVocabulary::standard(),
            &mut rng,
        )
        .unwrap();

        let mut log = CallLog::default();
        song.render(&mut log).unwrap();

        assert_eq!(log.tempos, vec![(0, song.tempo)]);
        assert_eq!(log.programs, vec![(0, 0, 30), (1, 1, 33), (2, 2, 48), (3, 3, 30)]);
        assert_eq!(log.notes.len(), song.events.len());
        for (track, channel, _) in &log.notes {
            if *track == Voice::Drums.track() {
                assert_eq!(*channel, 9);
            } else {
                assert_eq!(*channel as usize, *track);
            }
        }
    }
}
