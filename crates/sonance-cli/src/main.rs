//! Sonance CLI - synthesize speech with ONNX text-to-speech backends.
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`commands`] | Synthesis and listing handlers |
//! | [`settings`] | Flag / env / YAML layering |
//! | [`logging`] | Subscriber setup |
//!
//! ## Examples
//!
//! ```text
//! sonance --backend kokoro-v1.0 -v af_bella -o hello.wav "Hello there."
//! echo "Read from stdin" | sonance -t - --backend pocket
//! sonance --backend pocket --reference-audio me.wav -t "Cloned."
//! sonance --backend kokoro-v1.1 --list-voices
//! ```

mod commands;
mod logging;
mod settings;

use anyhow::Result;
use clap::Parser;
use colored::*;
use settings::{FileConfig, Settings};
use sonance_core::BackendRegistry;
use std::path::PathBuf;

/// Sonance - text-to-speech with Kokoro and Pocket ONNX models
#[derive(Parser, Debug)]
#[command(name = "sonance", version)]
#[command(about = "Sonance - synthesize speech to a WAV file", long_about = None)]
pub struct Cli {
    /// Text to synthesize ("-" reads standard input)
    #[arg(short, long, value_name = "TEXT", conflicts_with = "file")]
    text: Option<String>,

    /// Read the text to synthesize from a file
    #[arg(short, long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Text to synthesize, given as trailing words
    #[arg(value_name = "WORDS", trailing_var_arg = true)]
    words: Vec<String>,

    /// Output WAV file [default: output.wav]
    #[arg(short, long, value_name = "FILE", env = "SONANCE_OUTPUT")]
    output: Option<PathBuf>,

    /// Voice name (defaults to the first available voice)
    #[arg(short, long, value_name = "VOICE", env = "SONANCE_VOICE")]
    voice: Option<String>,

    /// Speaking rate between 0.5 and 2.0 [default: 1.0]
    #[arg(short, long, value_name = "RATE", env = "SONANCE_SPEED")]
    speed: Option<f32>,

    /// Model directory or .onnx file [default: models/model.onnx, or
    /// models/<backend> for kokoro-v1.0, kokoro-v1.1 and pocket]
    #[arg(short, long, value_name = "PATH", env = "SONANCE_MODEL")]
    model: Option<PathBuf>,

    /// Voice bank (npz archive, .npy directory or flat .bin)
    #[arg(long, value_name = "PATH", env = "SONANCE_VOICES")]
    voices: Option<PathBuf>,

    /// Vocabulary file (tokens.txt or vocab.json)
    #[arg(long, value_name = "PATH", env = "SONANCE_TOKENS")]
    tokens: Option<PathBuf>,

    /// CMU pronouncing dictionary for the legacy kokoro backend [default:
    /// cmudict.dict next to the model, then ~/.config/sonance/]
    #[arg(long, value_name = "FILE", env = "SONANCE_DICTIONARY")]
    dictionary: Option<PathBuf>,

    /// Backend name (see --list-backends) [default: kokoro]
    #[arg(long, value_name = "NAME", env = "SONANCE_BACKEND")]
    backend: Option<String>,

    /// Weight variant: full or int8
    #[arg(long, value_name = "VARIANT", env = "SONANCE_MODEL_VARIANT")]
    model_variant: Option<String>,

    /// Clone the voice in this WAV file (backends with voice cloning only)
    #[arg(long, value_name = "FILE", env = "SONANCE_REFERENCE_AUDIO")]
    reference_audio: Option<PathBuf>,

    /// List the voices of the selected backend and exit
    #[arg(long)]
    list_voices: bool,

    /// List registered backends and exit
    #[arg(long)]
    list_backends: bool,

    /// YAML config file [default: first sonance.yaml in ., configs/,
    /// ~/.config/sonance/]
    #[arg(short, long, value_name = "FILE", env = "SONANCE_CONFIG")]
    config: Option<PathBuf>,

    /// trace, debug, info, warn or error [default: info]
    #[arg(long, value_name = "LEVEL", env = "SONANCE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "FILE", env = "SONANCE_LOG_FILE")]
    log_file: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = settings::locate_config(cli.config.as_deref())?;
    let file = match &config_path {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(&cli, file)?;

    logging::init(&settings.log_level, settings.log_file.as_deref())?;
    if let Some(path) = &config_path {
        log::info!("Loaded config from {}", path.display());
    }

    let registry = BackendRegistry::with_builtin_backends();
    if settings.list_backends {
        commands::synthesize::list_backends(&registry);
        return Ok(());
    }

    let text = if settings.list_voices {
        None
    } else {
        Some(settings::read_input_text(
            cli.text.as_deref(),
            cli.file.as_deref(),
            &cli.words,
            std::io::stdin().lock(),
        )?)
    };

    commands::synthesize::run(&registry, &settings, text)
}
