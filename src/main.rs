//! Talki - hold-to-talk dictation that types as you speak
//!
//! Run with `talki` or `talki daemon` to start the daemon.
//! Use `talki transcribe <file>` to transcribe an audio file.
//! Use `talki config` to print the effective configuration.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use talki::config::{self, InjectMode};
use talki::{Daemon, TalkiError};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "talki")]
#[command(author, version, about = "Hold-to-talk dictation that types as you speak")]
#[command(long_about = "
Talki is a hold-to-talk dictation tool for Linux. Hold a hotkey and speak;
the growing transcript is typed live into whatever application has focus,
self-correcting as recognition improves. The hotkeys are suppressed
system-wide so they never reach other applications.

SETUP:
  1. Add yourself to the input group: sudo usermod -aG input $USER
  2. Log out and back in
  3. Download a whisper model (ggml format) into ~/.local/share/talki/models/
  4. Run: talki

USAGE:
  Hold F9 (default) while speaking; text appears as you talk and settles
  when you release. Or press F10 to toggle a longer recording.
")]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,

    /// Use clipboard paste injection instead of per-character keystrokes
    #[arg(long)]
    clipboard: bool,

    /// Override whisper model (tiny, base, small, medium, large-v3)
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,

    /// Override push-to-talk key (e.g., F9, SCROLLLOCK, F13)
    #[arg(long, value_name = "KEY")]
    push_to_talk: Option<String>,

    /// Override toggle-recording key (e.g., F10, PAUSE)
    #[arg(long, value_name = "KEY")]
    toggle: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as daemon (default if no command specified)
    Daemon,

    /// Transcribe an audio file (WAV) and print the result
    Transcribe {
        /// Path to audio file
        file: PathBuf,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("talki={}", log_level))),
        )
        .init();

    // Load config, then apply CLI overrides (highest priority)
    let mut config = config::load_config(cli.config.as_deref())?;

    if let Some(model) = cli.model {
        config.whisper.model = model;
    }
    if let Some(key) = cli.push_to_talk {
        config.hotkey.push_to_talk = key;
    }
    if let Some(key) = cli.toggle {
        config.hotkey.toggle = key;
    }
    if cli.clipboard {
        config.inject.mode = InjectMode::Clipboard;
    }

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            let mut daemon = Daemon::new(config);
            daemon.run().await?;
        }
        Commands::Transcribe { file } => {
            transcribe_file(&config, &file)?;
        }
        Commands::Config => {
            println!(
                "{}",
                toml::to_string_pretty(&config)
                    .map_err(|e| TalkiError::Config(e.to_string()))?
            );
        }
    }

    Ok(())
}

/// Transcribe a WAV file and print the final hypothesis
fn transcribe_file(config: &talki::Config, path: &Path) -> anyhow::Result<()> {
    let samples = load_wav_mono_16k(path)?;
    tracing::info!(
        "Loaded {:.2}s of audio from {:?}",
        samples.len() as f32 / 16000.0,
        path
    );

    let transcriber = talki::transcribe::create_transcriber(&config.whisper)?;
    let hypothesis = transcriber.transcribe(&samples, true)?;
    println!("{}", hypothesis.text);

    Ok(())
}

/// Load a WAV file as f32 mono samples at 16kHz
fn load_wav_mono_16k(path: &Path) -> anyhow::Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    Ok(talki::audio::resample(&mono, spec.sample_rate, 16000))
}
