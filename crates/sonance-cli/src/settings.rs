//! Layered CLI settings.
//!
//! Precedence, highest first:
//!
//! 1. command-line flags
//! 2. `SONANCE_*` environment variables (clap `env`)
//! 3. the YAML config file
//! 4. built-in defaults
//!
//! Layers 1 and 2 arrive already merged in [`Cli`]; this module folds in
//! the file and the defaults.
//!
//! ```yaml
//! # sonance.yaml
//! backend: kokoro-v1.0
//! model: models/kokoro-v1.0
//! voice: af_bella
//! speed: 1.1
//! log_level: debug
//! pipeline:
//!   seed: 7
//! ```

use crate::Cli;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use sonance_core::backend::pocket::PipelineConfig;
use sonance_core::config::{BackendConfig, ModelVariant};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

pub const DEFAULT_BACKEND: &str = "kokoro";
pub const DEFAULT_MODEL: &str = "models/model.onnx";
pub const DEFAULT_OUTPUT: &str = "output.wav";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const CONFIG_FILE_NAME: &str = "sonance.yaml";

pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

// ============================================================================
// Config file
// ============================================================================

/// Contents of `sonance.yaml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub backend: Option<String>,
    pub model: Option<PathBuf>,
    pub voices: Option<PathBuf>,
    pub tokens: Option<PathBuf>,
    pub dictionary: Option<PathBuf>,
    pub model_variant: Option<ModelVariant>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
    pub output: Option<PathBuf>,
    pub reference_audio: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub pipeline: Option<PipelineConfig>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))
    }
}

/// Places searched for `sonance.yaml` when `--config` is not given.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from(CONFIG_FILE_NAME),
        Path::new("configs").join(CONFIG_FILE_NAME),
    ];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("sonance").join(CONFIG_FILE_NAME));
    }
    paths
}

/// The explicit config file, or the first one found on the search path.
///
/// An explicit path that does not exist is an error; a missing discovered
/// file is not.
pub fn locate_config(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("Config file not found: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }
    Ok(config_search_paths().into_iter().find(|p| p.is_file()))
}

// ============================================================================
// Resolved settings
// ============================================================================

/// Everything a synthesis run needs, after layering.
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: String,
    pub model: PathBuf,
    pub voices: Option<PathBuf>,
    pub tokens: Option<PathBuf>,
    pub dictionary: Option<PathBuf>,
    pub model_variant: ModelVariant,
    pub voice: Option<String>,
    pub speed: f32,
    pub output: PathBuf,
    pub reference_audio: Option<PathBuf>,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub pipeline: PipelineConfig,
    pub list_voices: bool,
    pub list_backends: bool,
}

/// Model location used when no layer names one.
pub fn default_model_for(backend: &str) -> PathBuf {
    match backend {
        "kokoro-v1.0" => PathBuf::from("models/kokoro-v1.0"),
        "kokoro-v1.1" => PathBuf::from("models/kokoro-v1.1"),
        "pocket" => PathBuf::from("models/pocket"),
        _ => PathBuf::from(DEFAULT_MODEL),
    }
}

impl Settings {
    /// Merge parsed flags (with env) over the file over the defaults.
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self> {
        let backend = cli
            .backend
            .clone()
            .or(file.backend)
            .unwrap_or_else(|| DEFAULT_BACKEND.to_string());

        let model = match cli.model.clone().or(file.model) {
            Some(path) if path != Path::new(DEFAULT_MODEL) => path,
            _ => default_model_for(&backend),
        };

        let model_variant = match cli.model_variant.as_deref() {
            Some(value) => value.parse::<ModelVariant>()?,
            None => file.model_variant.unwrap_or_default(),
        };

        let speed = cli.speed.or(file.speed).unwrap_or(1.0);
        validate_speed(speed)?;

        Ok(Self {
            model,
            voices: cli.voices.clone().or(file.voices),
            tokens: cli.tokens.clone().or(file.tokens),
            dictionary: cli.dictionary.clone().or(file.dictionary),
            model_variant,
            voice: cli.voice.clone().or(file.voice).filter(|v| !v.is_empty()),
            speed,
            output: cli
                .output
                .clone()
                .or(file.output)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            reference_audio: cli.reference_audio.clone().or(file.reference_audio),
            log_level: cli
                .log_level
                .clone()
                .or(file.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_file: cli.log_file.clone().or(file.log_file),
            pipeline: file.pipeline.unwrap_or_default(),
            list_voices: cli.list_voices,
            list_backends: cli.list_backends,
            backend,
        })
    }

    /// Construction parameters for the selected backend.
    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            backend: self.backend.clone(),
            model_path: self.model.clone(),
            voices_path: self.voices.clone(),
            tokens_path: self.tokens.clone(),
            dictionary_path: self.dictionary.clone(),
            model_variant: self.model_variant,
            pipeline: self.pipeline.clone(),
        }
    }
}

pub fn validate_speed(speed: f32) -> Result<()> {
    if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
        bail!(
            "Speed must be between {} and {}, got {}",
            MIN_SPEED,
            MAX_SPEED,
            speed
        );
    }
    Ok(())
}

// ============================================================================
// Input text
// ============================================================================

/// Text to synthesize: `--text` (`-` reads stdin), then `--file`, then the
/// positional words joined by spaces.
pub fn read_input_text(
    text: Option<&str>,
    file: Option<&Path>,
    words: &[String],
    stdin: impl Read,
) -> Result<String> {
    let raw = if let Some(text) = text {
        if text == "-" {
            let mut buf = String::new();
            let mut stdin = stdin;
            stdin
                .read_to_string(&mut buf)
                .context("Failed to read text from stdin")?;
            buf
        } else {
            text.to_string()
        }
    } else if let Some(path) = file {
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read text file: {}", path.display()))?
    } else {
        words.join(" ")
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("No input text. Use --text, --file or pass the text as arguments");
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["sonance"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(&cli(&[]), FileConfig::default()).unwrap();
        assert_eq!(settings.backend, "kokoro");
        assert_eq!(settings.model, PathBuf::from("models/model.onnx"));
        assert_eq!(settings.output, PathBuf::from("output.wav"));
        assert_eq!(settings.speed, 1.0);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.model_variant, ModelVariant::Full);
    }

    #[test]
    fn test_per_backend_model_default() {
        let settings = Settings::resolve(&cli(&["--backend", "pocket"]), FileConfig::default()).unwrap();
        assert_eq!(settings.model, PathBuf::from("models/pocket"));

        let settings = Settings::resolve(
            &cli(&["--backend", "kokoro-v1.1", "--model", "models/model.onnx"]),
            FileConfig::default(),
        )
        .unwrap();
        assert_eq!(settings.model, PathBuf::from("models/kokoro-v1.1"));

        let settings = Settings::resolve(
            &cli(&["--backend", "pocket", "--model", "/opt/pocket"]),
            FileConfig::default(),
        )
        .unwrap();
        assert_eq!(settings.model, PathBuf::from("/opt/pocket"));
    }

    #[test]
    fn test_flags_override_file() {
        let file: FileConfig = serde_yaml::from_str(
            "backend: pocket\nvoice: alba\nspeed: 1.5\nmodel_variant: int8\ndictionary: /data/cmudict.dict\npipeline:\n  seed: 7\n",
        )
        .unwrap();
        let settings = Settings::resolve(&cli(&["--voice", "marius"]), file).unwrap();
        assert_eq!(settings.backend, "pocket");
        assert_eq!(settings.voice.as_deref(), Some("marius"));
        assert_eq!(settings.speed, 1.5);
        assert_eq!(settings.model_variant, ModelVariant::Int8);
        assert_eq!(settings.pipeline.seed, 7);
        assert_eq!(settings.pipeline.max_steps, 500);
        assert_eq!(
            settings.backend_config().dictionary_path,
            Some(PathBuf::from("/data/cmudict.dict"))
        );
    }

    #[test]
    fn test_speed_bounds() {
        assert!(validate_speed(0.5).is_ok());
        assert!(validate_speed(2.0).is_ok());
        assert!(validate_speed(0.49).is_err());
        assert!(validate_speed(2.5).is_err());
        assert!(Settings::resolve(&cli(&["--speed", "3"]), FileConfig::default()).is_err());
    }

    #[test]
    fn test_bad_variant_is_rejected() {
        assert!(Settings::resolve(&cli(&["--model-variant", "fp8"]), FileConfig::default()).is_err());
    }

    #[test]
    fn test_unknown_file_key_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sonance.yaml");
        fs::write(&path, "bakend: pocket\n").unwrap();
        assert!(FileConfig::load(&path).is_err());
    }

    #[test]
    fn test_empty_file_is_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sonance.yaml");
        fs::write(&path, "\n").unwrap();
        assert!(FileConfig::load(&path).unwrap().backend.is_none());
    }

    #[test]
    fn test_locate_explicit_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.yaml");
        assert!(locate_config(Some(&path)).is_err());
        fs::write(&path, "backend: kokoro\n").unwrap();
        assert_eq!(locate_config(Some(&path)).unwrap(), Some(path));
    }

    #[test]
    fn test_input_text_sources() {
        let none = Cursor::new(Vec::new());
        assert_eq!(
            read_input_text(Some("  hello  "), None, &[], none.clone()).unwrap(),
            "hello"
        );
        assert_eq!(
            read_input_text(Some("-"), None, &[], Cursor::new(b"from stdin\n".to_vec())).unwrap(),
            "from stdin"
        );

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("input.txt");
        fs::write(&path, "from a file").unwrap();
        assert_eq!(
            read_input_text(None, Some(&path), &[], none.clone()).unwrap(),
            "from a file"
        );

        let words = vec!["two".to_string(), "words".to_string()];
        assert_eq!(read_input_text(None, None, &words, none.clone()).unwrap(), "two words");
        assert!(read_input_text(None, None, &[], none).is_err());
    }
}
