// Autocomposer CLI entry point.
//
// Generates a batch of sixteen-bar band arrangements, writing
// `song_NNN.mid` and (unless --no-sheet) `song_NNN.ly` into the output
// directory and printing one summary line per song.
//
// Usage:
//   cargo run -p autocomposer_music -- [--count N] [--out-dir DIR] [--seed N]
//     [--style NAME] [--key CHORD] [--styles FILE] [--chords FILE] [--no-sheet]
//
// Styles: doom, thrash, funk_metal, chaos

use autocomposer_music::batch::{BatchConfig, run_batch};
use autocomposer_music::chord::ChordVocabulary;
use autocomposer_music::style::{StyleKind, StyleRegistry};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "autocompose")]
#[command(about = "Procedural multi-voice song generator (MIDI + LilyPond)")]
struct Cli {
    /// Number of songs to generate
    #[arg(long, default_value_t = 20)]
    count: usize,

    /// Directory for .mid and .ly output
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Batch seed (defaults to the current time)
    #[arg(long)]
    seed: Option<u64>,

    /// Use this style for every song instead of picking one per song
    #[arg(long)]
    style: Option<StyleKind>,

    /// Starting chord for every song (e.g. "C", "C#m")
    #[arg(long)]
    key: Option<String>,

    /// JSON style table replacing the built-in styles
    #[arg(long)]
    styles: Option<PathBuf>,

    /// JSON chord vocabulary replacing the built-in chords
    #[arg(long)]
    chords: Option<PathBuf>,

    /// Skip LilyPond transcription
    #[arg(long)]
    no_sheet: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let styles = match &cli.styles {
        Some(path) => StyleRegistry::load(path),
        None => Ok(StyleRegistry::standard()),
    };
    let vocab = match &cli.chords {
        Some(path) => ChordVocabulary::load(path),
        None => Ok(ChordVocabulary::standard()),
    };
    let (styles, vocab) = match (styles, vocab) {
        (Ok(s), Ok(v)) => (s, v),
        (Err(e), _) | (_, Err(e)) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    // Reject bad entry points before any song starts.
    let style_check = cli.style.map(|kind| styles.get(kind).map(|_| ()));
    let key_check = cli.key.as_deref().map(|key| vocab.require(key).map(|_| ()));
    for check in [style_check, key_check].into_iter().flatten() {
        if let Err(e) = check {
            error!("{e}");
            std::process::exit(1);
        }
    }

    let base_seed = cli.seed.unwrap_or_else(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    });

    let config = BatchConfig {
        count: cli.count,
        output_dir: cli.out_dir,
        base_seed,
        style: cli.style,
        start_chord: cli.key,
        transcribe: !cli.no_sheet,
    };

    info!(
        "generating {} songs into {} (seed {})",
        config.count,
        config.output_dir.display(),
        base_seed
    );

    let results = match run_batch(&config, &styles, &vocab) {
        Ok(results) => results,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let mut failures = 0;
    for (i, result) in results.iter().enumerate() {
        match result {
            Ok(summary) => println!("{summary}"),
            Err(e) => {
                failures += 1;
                error!("[{:02}] {e}", i + 1);
            }
        }
    }

    println!();
    println!(
        "Done: {} of {} songs written to {}",
        results.len() - failures,
        results.len(),
        config.output_dir.display()
    );
    if failures > 0 {
        std::process::exit(1);
    }
}
