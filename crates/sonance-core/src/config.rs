//! Backend configuration.
//!
//! A [`BackendConfig`] is everything a registered constructor needs to build
//! a backend. It deserializes from YAML:
//!
//! ```yaml
//! backend: pocket
//! model_path: models/pocket
//! model_variant: int8
//! pipeline:
//!   eos_threshold: 0.5
//!   max_steps: 500
//!   flow_steps: 32
//!   seed: 42
//! ```
//!
//! Every field has a default, so an empty document is a valid config.

use crate::backend::pocket::PipelineConfig;
use crate::error::{SynthesisError, SynthesisResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ============================================================================
// Model Variant
// ============================================================================

/// Which weight files to load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Full precision weights (`<stage>.onnx`)
    #[default]
    Full,
    /// Quantized weights (`<stage>_int8.onnx`), where available
    Int8,
}

impl FromStr for ModelVariant {
    type Err = SynthesisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "full" | "fp32" => Ok(ModelVariant::Full),
            "int8" => Ok(ModelVariant::Int8),
            other => Err(SynthesisError::Config(format!(
                "unknown model variant '{}' (expected 'full' or 'int8')",
                other
            ))),
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelVariant::Full => write!(f, "full"),
            ModelVariant::Int8 => write!(f, "int8"),
        }
    }
}

// ============================================================================
// Backend Configuration
// ============================================================================

/// Construction parameters handed to a backend constructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Registered backend name. Set by the registry on construction.
    pub backend: String,

    /// Model directory, or a `.onnx` file inside it.
    pub model_path: PathBuf,

    /// Voice bank override (archive, directory or flat binary).
    pub voices_path: Option<PathBuf>,

    /// Vocabulary override.
    pub tokens_path: Option<PathBuf>,

    /// CMU pronouncing dictionary for phonemizing backends. Searched for
    /// when unset.
    pub dictionary_path: Option<PathBuf>,

    pub model_variant: ModelVariant,

    /// Tunables for staged pipelines.
    pub pipeline: PipelineConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend: String::new(),
            model_path: PathBuf::from("models/model.onnx"),
            voices_path: None,
            tokens_path: None,
            dictionary_path: None,
            model_variant: ModelVariant::Full,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl BackendConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            ..Self::default()
        }
    }

    /// Directory holding the model files.
    ///
    /// `model_path` itself, or its parent when it names an `.onnx` file.
    pub fn model_dir(&self) -> PathBuf {
        let is_onnx_file = self
            .model_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"));
        if is_onnx_file {
            self.model_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        } else {
            self.model_path.clone()
        }
    }

    /// Path of `<stem>.onnx` in the model directory, honoring the variant.
    ///
    /// With [`ModelVariant::Int8`], `<stem>_int8.onnx` is used when it exists
    /// and the full-precision file otherwise.
    pub fn stage_file(&self, stem: &str) -> PathBuf {
        let dir = self.model_dir();
        if self.model_variant == ModelVariant::Int8 {
            let quantized = dir.join(format!("{}_int8.onnx", stem));
            if quantized.exists() {
                return quantized;
            }
            log::debug!(
                "No quantized {} found in {}, using full precision",
                stem,
                dir.display()
            );
        }
        dir.join(format!("{}.onnx", stem))
    }

    /// Reject values no backend can work with.
    pub fn validate(&self) -> SynthesisResult<()> {
        if self.model_path.as_os_str().is_empty() {
            return Err(SynthesisError::Config("model path is empty".to_string()));
        }
        self.pipeline.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_model_variant_parsing() {
        assert_eq!("int8".parse::<ModelVariant>().unwrap(), ModelVariant::Int8);
        assert_eq!("INT8".parse::<ModelVariant>().unwrap(), ModelVariant::Int8);
        assert_eq!("".parse::<ModelVariant>().unwrap(), ModelVariant::Full);
        assert_eq!("fp32".parse::<ModelVariant>().unwrap(), ModelVariant::Full);
        assert!(matches!(
            "int4".parse::<ModelVariant>(),
            Err(SynthesisError::Config(_))
        ));
    }

    #[test]
    fn test_model_dir_strips_onnx_file() {
        let cfg = BackendConfig::new("models/kokoro-v1.0/model.onnx");
        assert_eq!(cfg.model_dir(), PathBuf::from("models/kokoro-v1.0"));

        let cfg = BackendConfig::new("models/pocket");
        assert_eq!(cfg.model_dir(), PathBuf::from("models/pocket"));
    }

    #[test]
    fn test_stage_file_int8_fallback() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("lm_main_int8.onnx"), b"").unwrap();

        let mut cfg = BackendConfig::new(dir.path());
        cfg.model_variant = ModelVariant::Int8;
        assert_eq!(cfg.stage_file("lm_main"), dir.path().join("lm_main_int8.onnx"));
        assert_eq!(cfg.stage_file("decoder"), dir.path().join("decoder.onnx"));

        cfg.model_variant = ModelVariant::Full;
        assert_eq!(cfg.stage_file("lm_main"), dir.path().join("lm_main.onnx"));
    }

    #[test]
    fn test_deserialize_partial_yaml() {
        let cfg: BackendConfig = serde_yaml::from_str(
            "model_path: models/pocket\nmodel_variant: int8\npipeline:\n  max_steps: 100\n",
        )
        .unwrap();
        assert_eq!(cfg.model_variant, ModelVariant::Int8);
        assert_eq!(cfg.pipeline.max_steps, 100);
        assert_eq!(cfg.pipeline.flow_steps, 32);
        assert!(cfg.validate().is_ok());
    }
}
