// Standard MIDI File output for rendered songs.
//
// `MidiSink` implements `OutputSink` by collecting absolute-tick events per
// track, then sorting and delta-encoding them on `finalize`. Output is SMF
// Format 1 (multi-track) at 960 ticks per quarter note, one track per voice.
//
// Beat times convert to ticks by rounding. Grace notes that would start
// before the song clamp to tick 0, and every note lasts at least one tick so
// its note-off never precedes its note-on. A MIDI channel cannot sound the
// same key twice, so a note still ringing when the same key is struck again
// on its channel is cut off at the new onset; two attacks on the same tick
// merge into one note. At equal ticks, meta events come first, then program
// changes, then note-offs, then note-ons, so a repeated pitch re-attacks
// cleanly.
//
// Uses the `midly` crate for encoding.

use crate::error::OutputError;
use crate::sink::OutputSink;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;

/// Ticks per quarter note (one beat).
pub const TICKS_PER_BEAT: u16 = 960;

/// Largest value a tempo meta event can carry.
const MAX_MICROS_PER_BEAT: u32 = 0xFF_FFFF;

/// Slowest tempo whose beat length fits a tempo meta event.
pub const MIN_BPM: u16 = 4;

/// Sort rank for events that share a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Meta,
    Program,
    NoteOff,
    NoteOn,
}

#[derive(Debug, Clone)]
struct PendingEvent {
    tick: u32,
    rank: Rank,
    kind: TrackEventKind<'static>,
}

/// A note in absolute ticks, before note-on/note-off expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingNote {
    on: u32,
    off: u32,
    channel: u8,
    key: u8,
    velocity: u8,
}

#[derive(Debug, Clone, Default)]
struct TrackBuffer {
    events: Vec<PendingEvent>,
    notes: Vec<PendingNote>,
}

/// Collects events in beat time and writes an SMF.
#[derive(Debug, Clone)]
pub struct MidiSink {
    tracks: Vec<TrackBuffer>,
}

/// Convert beats to ticks, clamping negative times to zero.
pub fn beats_to_ticks(beats: f64) -> u32 {
    (beats.max(0.0) * TICKS_PER_BEAT as f64).round() as u32
}

/// End each note no later than the next attack of the same key on the same
/// channel. Attacks sharing a tick collapse into the longest of them.
fn deinterleave(notes: &[PendingNote]) -> Vec<PendingNote> {
    let mut sorted = notes.to_vec();
    sorted.sort_by_key(|n| (n.channel, n.key, n.on, n.off));

    let mut out: Vec<PendingNote> = Vec::with_capacity(sorted.len());
    for note in sorted {
        let ringing = out
            .last_mut()
            .filter(|p| p.channel == note.channel && p.key == note.key && p.off > note.on);
        if let Some(prev) = ringing {
            if prev.on == note.on {
                prev.off = prev.off.max(note.off);
                prev.velocity = prev.velocity.max(note.velocity);
                continue;
            }
            prev.off = note.on;
        }
        out.push(note);
    }
    out
}

fn check(what: &'static str, value: usize, max: usize) -> Result<(), OutputError> {
    if value > max {
        return Err(OutputError::OutOfRange { what, value });
    }
    Ok(())
}

impl MidiSink {
    /// One named track per entry of `names`.
    pub fn with_track_names(names: &[&'static str]) -> Self {
        let tracks = names
            .iter()
            .map(|&name| TrackBuffer {
                events: vec![PendingEvent {
                    tick: 0,
                    rank: Rank::Meta,
                    kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
                }],
                notes: Vec::new(),
            })
            .collect();
        MidiSink { tracks }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_mut(&mut self, track: usize) -> Result<&mut TrackBuffer, OutputError> {
        self.tracks
            .get_mut(track)
            .ok_or(OutputError::OutOfRange { what: "track", value: track })
    }

    /// Sort, delta-encode, and terminate every track.
    fn to_smf(&self) -> Smf<'static> {
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(TICKS_PER_BEAT)),
        ));

        for buffer in &self.tracks {
            let mut events = buffer.events.clone();
            for note in deinterleave(&buffer.notes) {
                let channel = u4::new(note.channel);
                let key = u7::new(note.key);
                events.push(PendingEvent {
                    tick: note.on,
                    rank: Rank::NoteOn,
                    kind: TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::NoteOn { key, vel: u7::new(note.velocity) },
                    },
                });
                events.push(PendingEvent {
                    tick: note.off,
                    rank: Rank::NoteOff,
                    kind: TrackEventKind::Midi {
                        channel,
                        message: MidiMessage::NoteOff { key, vel: u7::new(0) },
                    },
                });
            }
            events.sort_by_key(|e| (e.tick, e.rank));

            let mut track: Track<'static> = Vec::with_capacity(events.len() + 1);
            let mut last_tick = 0u32;
            for event in events {
                track.push(TrackEvent {
                    delta: u28::new(event.tick - last_tick),
                    kind: event.kind,
                });
                last_tick = event.tick;
            }
            track.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            });
            smf.tracks.push(track);
        }
        smf
    }

    /// Encode to SMF bytes in memory.
    pub fn to_bytes(&self) -> Result<Vec<u8>, OutputError> {
        let mut buf = Vec::new();
        self.to_smf().write_std(&mut buf).map_err(OutputError::Encode)?;
        Ok(buf)
    }
}

impl OutputSink for MidiSink {
    fn set_tempo(&mut self, track: usize, time: f64, bpm: u16) -> Result<(), OutputError> {
        // The tempo meta event holds microseconds per beat in 24 bits.
        let micros_per_beat = 60_000_000 / u32::from(bpm.max(1));
        if bpm == 0 || micros_per_beat > MAX_MICROS_PER_BEAT {
            return Err(OutputError::OutOfRange { what: "tempo", value: bpm as usize });
        }
        self.track_mut(track)?.events.push(PendingEvent {
            tick: beats_to_ticks(time),
            rank: Rank::Meta,
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros_per_beat))),
        });
        Ok(())
    }

    fn set_instrument(
        &mut self,
        track: usize,
        channel: u8,
        time: f64,
        program: u8,
    ) -> Result<(), OutputError> {
        check("channel", channel as usize, 15)?;
        check("program", program as usize, 127)?;
        self.track_mut(track)?.events.push(PendingEvent {
            tick: beats_to_ticks(time),
            rank: Rank::Program,
            kind: TrackEventKind::Midi {
                channel: u4::new(channel),
                message: MidiMessage::ProgramChange { program: u7::new(program) },
            },
        });
        Ok(())
    }

    fn emit_note(
        &mut self,
        track: usize,
        channel: u8,
        pitch: u8,
        start: f64,
        duration: f64,
        velocity: u8,
    ) -> Result<(), OutputError> {
        check("channel", channel as usize, 15)?;
        check("pitch", pitch as usize, 127)?;
        check("velocity", velocity as usize, 127)?;

        let on = beats_to_ticks(start);
        let off = beats_to_ticks(start + duration).max(on + 1);
        self.track_mut(track)?.notes.push(PendingNote {
            on,
            off,
            channel,
            key: pitch,
            velocity,
        });
        Ok(())
    }

    fn finalize(&mut self, destination: &Path) -> Result<(), OutputError> {
        let bytes = self.to_bytes()?;
        std::fs::write(destination, bytes).map_err(|source| OutputError::Io {
            path: destination.to_path_buf(),
            source,
        })
    }
}
