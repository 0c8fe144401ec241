// Sheet music transcription: Standard MIDI File -> LilyPond score.
//
// Reads back the artifact written by midi.rs (or any metrical SMF), snaps
// every note's onset and duration to the nearest sixteenth, and engraves one
// staff per non-empty track. Channel 9 tracks become a DrumStaff. Notes whose
// quantized length is zero (the 0.05-beat grace runs, for instance) vanish,
// the same as they would in any fixed-grid quantizer.
//
// Staves are homophonic: all notes starting on the same sixteenth form one
// chord whose length is the shortest of them, clipped to the next onset in
// that staff. Gaps become rests. LilyPond needs power-of-two durations
// (optionally dotted), so lengths are decomposed largest-first and split at
// barlines with ties.
//
// Uses absolute pitches (not \relative) for simplicity and correctness.

use crate::error::TranscriptionError;
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Write;
use std::path::Path;

/// Sixteenths per 4/4 bar.
const BAR_SIXTEENTHS: u32 = 16;

const PERCUSSION_CHANNEL: u8 = 9;

/// Pitch class names in LilyPond notation (indexed by pitch class 0-11).
const LY_PITCH_NAMES: [&str; 12] = [
    "c", "cis", "d", "ees", "e", "f", "fis", "g", "aes", "a", "bes", "b",
];

/// A note on the sixteenth grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizedNote {
    pub pitch: u8,
    /// Onset in sixteenths from the start.
    pub start: u32,
    /// Length in sixteenths, at least 1.
    pub length: u32,
}

/// One staff's worth of notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub channel: u8,
    pub notes: Vec<QuantizedNote>,
}

impl Part {
    pub fn is_percussion(&self) -> bool {
        self.channel == PERCUSSION_CHANNEL
    }

    fn end(&self) -> u32 {
        self.notes.iter().map(|n| n.start + n.length).max().unwrap_or(0)
    }
}

/// A quantized, engravable score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Score {
    pub tempo_bpm: u16,
    pub parts: Vec<Part>,
}

impl Score {
    /// Length rounded up to whole bars.
    pub fn total_sixteenths(&self) -> u32 {
        let end = self.parts.iter().map(Part::end).max().unwrap_or(0);
        end.div_ceil(BAR_SIXTEENTHS) * BAR_SIXTEENTHS
    }
}

/// Convert a MIDI pitch number to a LilyPond absolute pitch string.
///
/// LilyPond's `c` with no octave marks = MIDI 48 (C3).
/// Each `'` raises one octave, each `,` lowers one octave.
pub fn midi_to_ly_note(midi_pitch: u8) -> String {
    let pc = (midi_pitch % 12) as usize;
    let octave = (midi_pitch / 12) as i8 - 4;
    let mut result = LY_PITCH_NAMES[pc].to_string();
    let mark = if octave > 0 { '\'' } else { ',' };
    for _ in 0..octave.unsigned_abs() {
        result.push(mark);
    }
    result
}

/// LilyPond drum-mode name for a General MIDI percussion key.
pub fn drum_name(pitch: u8) -> Option<&'static str> {
    Some(match pitch {
        35 | 36 => "bd",
        37 => "ss",
        38 | 40 => "sn",
        42 => "hh",
        44 => "hhp",
        46 => "hho",
        49 | 57 => "cymc",
        51 | 59 => "cymr",
        _ => return None,
    })
}

/// Valid LilyPond durations in sixteenths, largest first.
const DURATION_TABLE: [(u32, &str); 8] = [
    (16, "1"),
    (12, "2."),
    (8, "2"),
    (6, "4."),
    (4, "4"),
    (3, "8."),
    (2, "8"),
    (1, "16"),
];

/// Decompose a length in sixteenths into LilyPond durations, largest first.
///
/// For example: 5 sixteenths = "4" + "16".
pub fn decompose_duration(mut sixteenths: u32) -> Vec<&'static str> {
    let mut parts = Vec::new();
    for &(value, name) in &DURATION_TABLE {
        while sixteenths >= value {
            parts.push(name);
            sixteenths -= value;
        }
    }
    parts
}

/// Split a span at barlines. Returns the fragment lengths in order.
pub fn split_at_barlines(start: u32, length: u32) -> Vec<u32> {
    let mut fragments = Vec::new();
    let mut remaining = length;
    let mut pos = start;
    while remaining > 0 {
        let bar_end = (pos / BAR_SIXTEENTHS + 1) * BAR_SIXTEENTHS;
        let frag = remaining.min(bar_end - pos);
        fragments.push(frag);
        remaining -= frag;
        pos += frag;
    }
    fragments
}

/// Round a tick position to the nearest sixteenth.
fn quantize(ticks: u64, ticks_per_beat: u64) -> u32 {
    let ticks_per_sixteenth = ticks_per_beat as f64 / 4.0;
    (ticks as f64 / ticks_per_sixteenth).round() as u32
}

/// Parse an SMF and quantize every track to the sixteenth grid.
pub fn parse_score(midi_bytes: &[u8]) -> Result<Score, TranscriptionError> {
    let smf = Smf::parse(midi_bytes).map_err(|e| TranscriptionError::Parse(e.to_string()))?;
    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as u64,
        Timing::Timecode(..) => {
            return Err(TranscriptionError::Unsupported("SMPTE timecode timing".into()));
        }
    };
    if ticks_per_beat == 0 {
        return Err(TranscriptionError::Unsupported("zero ticks per beat".into()));
    }

    let mut tempo_bpm = None;
    let mut parts = Vec::new();

    for (index, track) in smf.tracks.iter().enumerate() {
        let mut tick: u64 = 0;
        let mut name = None;
        let mut channel = None;
        // (channel, key) -> onset ticks of sounding notes, oldest first
        let mut pending: HashMap<(u8, u8), VecDeque<u64>> = HashMap::new();
        let mut notes = Vec::new();

        for event in track {
            tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(t)) if tempo_bpm.is_none() => {
                    let micros = t.as_int().max(1);
                    tempo_bpm = Some((60_000_000.0 / micros as f64).round() as u16);
                }
                TrackEventKind::Meta(MetaMessage::TrackName(bytes)) => {
                    name = Some(String::from_utf8_lossy(bytes).into_owned());
                }
                TrackEventKind::Midi { channel: ch, message } => {
                    let ch = ch.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            channel.get_or_insert(ch);
                            pending.entry((ch, key.as_int())).or_default().push_back(tick);
                        }
                        // NoteOn with velocity 0 is a NoteOff.
                        MidiMessage::NoteOff { key, .. } | MidiMessage::NoteOn { key, .. } => {
                            let onset = pending
                                .get_mut(&(ch, key.as_int()))
                                .and_then(VecDeque::pop_front);
                            if let Some(onset) = onset {
                                let start = quantize(onset, ticks_per_beat);
                                let length = quantize(tick - onset, ticks_per_beat);
                                if length > 0 {
                                    let pitch = key.as_int();
                                    notes.push(QuantizedNote { pitch, start, length });
                                }
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        if notes.is_empty() {
            continue;
        }
        notes.sort_by_key(|n| (n.start, n.pitch));
        parts.push(Part {
            name: name.unwrap_or_else(|| format!("Track {index}")),
            channel: channel.unwrap_or(0),
            notes,
        });
    }

    if parts.is_empty() {
        return Err(TranscriptionError::Unsupported("no notes survive quantization".into()));
    }
    Ok(Score {
        tempo_bpm: tempo_bpm.unwrap_or(120),
        parts,
    })
}

/// Render one chord or note symbol (without duration).
fn chord_symbol(pitches: &[u8], percussion: bool) -> Option<String> {
    let names: Vec<String> = pitches
        .iter()
        .filter_map(|&p| {
            if percussion {
                drum_name(p).map(str::to_string)
            } else {
                Some(midi_to_ly_note(p))
            }
        })
        .collect();
    match names.len() {
        0 => None,
        1 => Some(names[0].clone()),
        _ => Some(format!("<{}>", names.join(" "))),
    }
}

/// Append `symbol` (or a rest if `None`) spanning `length` sixteenths from
/// `start`, tied across barlines and compound durations.
fn push_span(out: &mut String, symbol: Option<&str>, start: u32, length: u32) {
    let fragments = split_at_barlines(start, length);
    for (i, frag) in fragments.iter().enumerate() {
        let parts = decompose_duration(*frag);
        for (j, dur) in parts.iter().enumerate() {
            if !out.is_empty() {
                out.push(' ');
            }
            match symbol {
                Some(sym) => {
                    let _ = write!(out, "{sym}{dur}");
                    if j + 1 < parts.len() || i + 1 < fragments.len() {
                        out.push('~');
                    }
                }
                None => {
                    let _ = write!(out, "r{dur}");
                }
            }
        }
    }
}

/// Render a part's music as a sequence of chords and rests.
fn render_part_music(part: &Part, total: u32) -> String {
    let mut onsets: BTreeMap<u32, Vec<&QuantizedNote>> = BTreeMap::new();
    for note in &part.notes {
        onsets.entry(note.start).or_default().push(note);
    }
    let starts: Vec<u32> = onsets.keys().copied().collect();

    let mut out = String::new();
    let mut pos = 0;
    for (i, (&start, notes)) in onsets.iter().enumerate() {
        if start > pos {
            push_span(&mut out, None, pos, start - pos);
        }
        let shortest = notes.iter().map(|n| n.length).min().unwrap_or(1);
        let next = starts.get(i + 1).copied().unwrap_or(u32::MAX);
        let length = shortest.min(next - start);
        let mut pitches: Vec<u8> = notes.iter().map(|n| n.pitch).collect();
        pitches.dedup();
        let symbol = chord_symbol(&pitches, part.is_percussion());
        push_span(&mut out, symbol.as_deref(), start, length);
        pos = start + length;
    }
    if total > pos {
        push_span(&mut out, None, pos, total - pos);
    }
    out
}

/// LilyPond identifiers are letters only.
fn part_variable(index: usize) -> String {
    let mut name = String::from("part");
    let mut n = index;
    loop {
        name.push((b'A' + (n % 26) as u8) as char);
        n /= 26;
        if n == 0 {
            break;
        }
    }
    name
}

fn clef_for(part: &Part) -> &'static str {
    let total: u32 = part.notes.iter().map(|n| n.pitch as u32).sum();
    let mean = total / part.notes.len().max(1) as u32;
    if mean < 55 { "bass" } else { "treble" }
}

/// Generate a complete LilyPond file from a quantized score.
pub fn score_to_lilypond(score: &Score, title: &str) -> String {
    let total = score.total_sixteenths();
    let mut ly = String::new();

    ly.push_str("\\version \"2.24.0\"\n\n");
    let _ = write!(
        ly,
        "\\header {{\n  title = \"{}\"\n  tagline = ##f\n}}\n\n",
        title.replace('"', "'")
    );
    let _ = write!(ly, "global = {{\n  \\time 4/4 \\tempo 4 = {}\n}}\n\n", score.tempo_bpm);

    for (i, part) in score.parts.iter().enumerate() {
        let mode = if part.is_percussion() { "\\drummode" } else { "\\absolute" };
        let _ = write!(
            ly,
            "{} = {} {{\n  \\global\n  {}\n}}\n\n",
            part_variable(i),
            mode,
            render_part_music(part, total)
        );
    }

    ly.push_str("\\score {\n  <<\n");
    for (i, part) in score.parts.iter().enumerate() {
        let name = part.name.replace('"', "'");
        if part.is_percussion() {
            let _ = writeln!(
                ly,
                "    \\new DrumStaff \\with {{ instrumentName = \"{name}\" }} {{ \\{} }}",
                part_variable(i)
            );
        } else {
            let _ = writeln!(
                ly,
                "    \\new Staff \\with {{ instrumentName = \"{name}\" }} {{ \\clef {} \\{} }}",
                clef_for(part),
                part_variable(i)
            );
        }
    }
    ly.push_str("  >>\n");
    ly.push_str("  \\layout { }\n");
    ly.push_str("}\n");
    ly
}

/// Transcribe a MIDI file on disk into a LilyPond file.
pub fn transcribe(midi_path: &Path, ly_path: &Path) -> Result<Score, TranscriptionError> {
    let bytes = std::fs::read(midi_path).map_err(|source| TranscriptionError::Read {
        path: midi_path.to_path_buf(),
        source,
    })?;
    let score = parse_score(&bytes)?;
    let title = midi_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ly = score_to_lilypond(&score, &title);
    std::fs::write(ly_path, ly).map_err(|source| TranscriptionError::Write {
        path: ly_path.to_path_buf(),
        source,
    })?;
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiSink;
    use crate::sink::OutputSink;

    fn score_from(build: impl FnOnce(&mut MidiSink)) -> Score {
        let mut sink = MidiSink::with_track_names(&["Lead", "Kit"]);
        sink.set_tempo(0, 0.0, 96).unwrap();
        build(&mut sink);
        parse_score(&sink.to_bytes().unwrap()).unwrap()
    }

    #[test]
    fn test_midi_to_ly_note_octaves() {
        assert_eq!(midi_to_ly_note(60), "c'");
        assert_eq!(midi_to_ly_note(48), "c");
        assert_eq!(midi_to_ly_note(36), "c,");
        assert_eq!(midi_to_ly_note(84), "c'''");
        assert_eq!(midi_to_ly_note(61), "cis'");
        assert_eq!(midi_to_ly_note(70), "bes'");
    }

    #[test]
    fn test_decompose_duration() {
        assert_eq!(decompose_duration(16), vec!["1"]);
        assert_eq!(decompose_duration(3), vec!["8."]);
        assert_eq!(decompose_duration(5), vec!["4", "16"]);
        assert_eq!(decompose_duration(15), vec!["2.", "8."]);
        assert_eq!(decompose_duration(0), Vec::<&str>::new());
    }

    #[test]
    fn test_split_at_barlines() {
        assert_eq!(split_at_barlines(0, 16), vec![16]);
        assert_eq!(split_at_barlines(12, 8), vec![4, 4]);
        assert_eq!(split_at_barlines(4, 40), vec![12, 16, 12]);
    }

    #[test]
    fn test_part_variable_letters_only() {
        assert_eq!(part_variable(0), "partA");
        assert_eq!(part_variable(4), "partE");
        assert!(part_variable(30).chars().all(|c| c.is_ascii_alphabetic()));
    }

    #[test]
    fn test_quantize_onsets_and_durations() {
        let score = score_from(|sink| {
            // 0.15 beats = 0.6 sixteenths -> 1 sixteenth
            sink.emit_note(0, 0, 64, 1.0, 0.15, 100).unwrap();
            // 0.8 * 0.75 = 0.6 beats = 2.4 sixteenths -> 2 sixteenths
            sink.emit_note(0, 0, 65, 2.0, 0.6, 100).unwrap();
        });
        assert_eq!(score.tempo_bpm, 96);
        assert_eq!(score.parts.len(), 1);
        assert_eq!(
            score.parts[0].notes,
            vec![
                QuantizedNote { pitch: 64, start: 4, length: 1 },
                QuantizedNote { pitch: 65, start: 8, length: 2 },
            ]
        );
    }

    #[test]
    fn test_repeated_key_keeps_both_notes() {
        let score = score_from(|sink| {
            sink.emit_note(0, 0, 72, 0.0, 1.0, 100).unwrap();
            sink.emit_note(0, 0, 72, 0.75, 1.0, 100).unwrap();
        });
        assert_eq!(
            score.parts[0].notes,
            vec![
                QuantizedNote { pitch: 72, start: 0, length: 3 },
                QuantizedNote { pitch: 72, start: 3, length: 4 },
            ]
        );
    }

    #[test]
    fn test_overlapping_offs_pair_oldest_first() {
        use midly::num::{u4, u7, u15, u28};
        use midly::{Format, Header, TrackEvent};

        let note = |delta: u32, on: bool| TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: if on {
                    MidiMessage::NoteOn { key: u7::new(72), vel: u7::new(100) }
                } else {
                    MidiMessage::NoteOff { key: u7::new(72), vel: u7::new(0) }
                },
            },
        };
        let mut smf = Smf::new(Header::new(Format::SingleTrack, Timing::Metrical(u15::new(960))));
        // Two overlapping 72s: on 0, on 720, off 960, off 1680.
        smf.tracks.push(vec![
            note(0, true),
            note(720, true),
            note(240, false),
            note(720, false),
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            },
        ]);
        let mut bytes = Vec::new();
        smf.write_std(&mut bytes).unwrap();

        let score = parse_score(&bytes).unwrap();
        assert_eq!(
            score.parts[0].notes,
            vec![
                QuantizedNote { pitch: 72, start: 0, length: 4 },
                QuantizedNote { pitch: 72, start: 3, length: 4 },
            ]
        );
    }

    #[test]
    fn test_grace_notes_vanish() {
        let score = score_from(|sink| {
            sink.emit_note(0, 0, 57, 0.85, 0.05, 80).unwrap();
            sink.emit_note(0, 0, 60, 1.0, 1.0, 100).unwrap();
        });
        assert_eq!(score.parts[0].notes.len(), 1);
        assert_eq!(score.parts[0].notes[0].pitch, 60);
    }

    #[test]
    fn test_render_chords_and_rests() {
        let score = score_from(|sink| {
            sink.emit_note(0, 3, 36, 0.0, 1.0, 85).unwrap();
            sink.emit_note(0, 3, 43, 0.0, 1.0, 85).unwrap();
        });
        let music = render_part_music(&score.parts[0], score.total_sixteenths());
        assert_eq!(music, "<c, g,>4 r2.");
    }

    #[test]
    fn test_render_ties_across_barline() {
        let score = score_from(|sink| {
            sink.emit_note(0, 0, 60, 3.0, 2.0, 100).unwrap();
        });
        let music = render_part_music(&score.parts[0], score.total_sixteenths());
        assert_eq!(music, "r2. c'4~ c'4 r2.");
    }

    #[test]
    fn test_overlap_clipped_to_next_onset() {
        let score = score_from(|sink| {
            sink.emit_note(0, 0, 60, 0.0, 1.0, 100).unwrap();
            sink.emit_note(0, 0, 62, 0.25, 0.25, 100).unwrap();
        });
        let music = render_part_music(&score.parts[0], score.total_sixteenths());
        assert!(music.starts_with("c'16 d'16 "), "{music}");
    }

    #[test]
    fn test_drum_staff() {
        let score = score_from(|sink| {
            sink.emit_note(1, 9, 36, 0.0, 1.0, 120).unwrap();
            sink.emit_note(1, 9, 42, 0.0, 0.5, 90).unwrap();
            sink.emit_note(1, 9, 38, 1.0, 1.0, 120).unwrap();
        });
        let part = &score.parts[0];
        assert!(part.is_percussion());
        assert_eq!(part.name, "Kit");
        let music = render_part_music(part, score.total_sixteenths());
        assert!(music.starts_with("<bd hh>8 r8 sn4"), "{music}");

        let ly = score_to_lilypond(&score, "drums");
        assert!(ly.contains("\\drummode"));
        assert!(ly.contains("DrumStaff"));
    }

    #[test]
    fn test_score_document_structure() {
        let score = score_from(|sink| {
            sink.emit_note(0, 0, 67, 0.0, 4.0, 100).unwrap();
        });
        let ly = score_to_lilypond(&score, "song_001");
        assert!(ly.contains("\\version"));
        assert!(ly.contains("title = \"song_001\""));
        assert!(ly.contains("\\time 4/4"));
        assert!(ly.contains("\\tempo 4 = 96"));
        assert!(ly.contains("\\clef treble"));
        assert!(ly.contains("instrumentName = \"Lead\""));
        assert!(ly.contains("g'1"));
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(parse_score(b"not a midi file"), Err(TranscriptionError::Parse(_))));
    }

    #[test]
    fn test_empty_song_unsupported() {
        let sink = MidiSink::with_track_names(&["Lead"]);
        let err = parse_score(&sink.to_bytes().unwrap()).unwrap_err();
        assert!(matches!(err, TranscriptionError::Unsupported(_)));
    }

    #[test]
    fn test_transcribe_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.mid");
        let err = transcribe(&missing, &dir.path().join("x.ly")).unwrap_err();
        assert!(matches!(err, TranscriptionError::Read { .. }));
    }
}
