// Error types for configuration, generation, output, and transcription.
//
// Configuration problems (unknown style, unknown starting chord, a malformed
// table loaded from JSON) are rejected before a song draws a single random
// value. Generation itself only fails on an internal inconsistency: a motif
// shorter than the rhythm grid's hit count. Transcription errors are kept in
// their own type because the batch driver logs and survives them.

use std::path::PathBuf;

/// A style or chord table entry point that cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown style '{0}'")]
    UnknownStyle(String),
    #[error("unknown chord '{0}'")]
    UnknownChord(String),
    #[error("invalid chord vocabulary: {0}")]
    InvalidVocabulary(String),
    #[error("invalid style {style}: {reason}")]
    InvalidStyle { style: String, reason: String },
    #[error("failed to load {path}: {reason}")]
    Load { path: PathBuf, reason: String },
}

/// Failure while arranging a song.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("motif exhausted in bar {bar} at slot {slot}: motif has {motif_len} entries")]
    MotifExhausted {
        bar: usize,
        slot: usize,
        motif_len: usize,
    },
}

/// Failure while serializing events into a note-event container.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("MIDI encoding failed: {0}")]
    Encode(std::io::Error),
    #[error("{what} {value} out of range")]
    OutOfRange { what: &'static str, value: usize },
}

/// Failure while turning a MIDI artifact into a notated score.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed MIDI: {0}")]
    Parse(String),
    #[error("unsupported input: {0}")]
    Unsupported(String),
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a single song inside a batch run.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
