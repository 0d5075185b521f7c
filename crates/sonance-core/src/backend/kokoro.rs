//! Kokoro: single-graph synthesis conditioned on a per-voice style vector.
//!
//! Three generations share this implementation and differ only in their
//! language list and text preparation:
//!
//! | Backend       | Languages | Text preparation                   |
//! |---------------|-----------|------------------------------------|
//! | `kokoro`      | en        | normalized, phonemized, tokenized  |
//! | `kokoro-v1.0` | en, zh    | language tag, then tokenized       |
//! | `kokoro-v1.1` | zh, en    | language tag, then tokenized       |
//!
//! The graph takes `input_ids [1, N] i64`, `style [1, dim] f32` and
//! `speed [1] f32` and returns `waveform`.

use super::{BackendInfo, SynthesisBackend};
use crate::audio::{SampleBuffer, SAMPLE_RATE};
use crate::config::BackendConfig;
use crate::error::{SynthesisError, SynthesisResult};
use crate::phonemizer::Phonemizer;
use crate::runtime::onnx::OnnxModel;
use crate::runtime::{take_output, Model, Tensor, TensorMap};
use crate::text::TextNormalizer;
use crate::tokenizer::Tokenizer;
use crate::voice::{VoiceEmbeddingStore, DEFAULT_EMBEDDING_DIM};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Kokoro model generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KokoroVariant {
    Legacy,
    V1_0,
    V1_1,
}

impl KokoroVariant {
    /// Registry name of this generation.
    pub fn backend_name(self) -> &'static str {
        match self {
            KokoroVariant::Legacy => "kokoro",
            KokoroVariant::V1_0 => "kokoro-v1.0",
            KokoroVariant::V1_1 => "kokoro-v1.1",
        }
    }

    /// Supported languages, preferred first.
    pub fn languages(self) -> &'static [&'static str] {
        match self {
            KokoroVariant::Legacy => &["en"],
            KokoroVariant::V1_0 => &["en", "zh"],
            KokoroVariant::V1_1 => &["zh", "en"],
        }
    }
}

/// Language of `text`: `zh` if it contains any CJK ideograph, else `en`.
pub fn detect_language(text: &str) -> &'static str {
    let is_cjk = |c: char| matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}');
    if text.chars().any(is_cjk) {
        "zh"
    } else {
        "en"
    }
}

/// Kokoro backend over one ONNX graph.
pub struct KokoroBackend {
    model: Option<Box<dyn Model>>,
    voices: VoiceEmbeddingStore,
    tokenizer: Tokenizer,
    normalizer: TextNormalizer,
    /// IPA conversion for the legacy generation.
    phonemizer: Option<Phonemizer>,
    variant: KokoroVariant,
}

impl KokoroBackend {
    /// Load model, vocabulary and voice bank for `variant`.
    ///
    /// Paths resolve against the model directory (`model_path`, or its
    /// parent when it names an `.onnx` file):
    /// - model: `<dir>/model.onnx`, else `model_path` itself
    /// - tokens: `tokens_path`, else `<dir>/tokens.txt`
    /// - voices: `voices_path`, else `<dir>/voices`
    /// - dictionary (legacy only): `dictionary_path`, else see
    ///   [`Phonemizer::locate`]
    pub fn load(config: &BackendConfig, variant: KokoroVariant) -> SynthesisResult<Self> {
        config.validate()?;
        let dir = config.model_dir();

        let model_file = {
            let candidate = dir.join("model.onnx");
            if candidate.exists() {
                candidate
            } else {
                config.model_path.clone()
            }
        };
        let tokens_file = config
            .tokens_path
            .clone()
            .unwrap_or_else(|| dir.join("tokens.txt"));
        let voices_file = config
            .voices_path
            .clone()
            .unwrap_or_else(|| dir.join("voices"));

        let tokenizer = Tokenizer::from_tokens_file(&tokens_file)?;
        let voices = load_voices(&voices_file, &fallback_voices_dir(&voices_file, &dir, variant))?;
        let phonemizer = match variant {
            KokoroVariant::Legacy => Some(Phonemizer::new(Phonemizer::locate(
                config.dictionary_path.as_deref(),
                &dir,
            )?)?),
            KokoroVariant::V1_0 | KokoroVariant::V1_1 => None,
        };
        let model = OnnxModel::load(variant.backend_name(), &model_file, &["waveform"])?;

        log::info!(
            "{} ready with {} voices and {} tokens",
            variant.backend_name(),
            voices.len(),
            tokenizer.vocab_size()
        );
        let backend = Self::from_parts(Box::new(model), voices, tokenizer, variant);
        Ok(match phonemizer {
            Some(phonemizer) => backend.with_phonemizer(phonemizer),
            None => backend,
        })
    }

    /// Assemble a backend from already-constructed parts.
    pub fn from_parts(
        model: Box<dyn Model>,
        voices: VoiceEmbeddingStore,
        tokenizer: Tokenizer,
        variant: KokoroVariant,
    ) -> Self {
        Self {
            model: Some(model),
            voices,
            tokenizer,
            normalizer: TextNormalizer::new(),
            phonemizer: None,
            variant,
        }
    }

    /// Phonemize legacy input before tokenizing.
    pub fn with_phonemizer(mut self, phonemizer: Phonemizer) -> Self {
        self.phonemizer = Some(phonemizer);
        self
    }

    pub fn variant(&self) -> KokoroVariant {
        self.variant
    }

    /// Token ids for `text`.
    ///
    /// The legacy generation normalizes and then phonemizes; a backend
    /// assembled without a phonemizer tokenizes the normalized text. Later
    /// generations prepend the `[EN]`/`[ZH]` tag when the vocabulary has one.
    pub fn encode(&self, text: &str) -> Vec<i64> {
        match self.variant {
            KokoroVariant::Legacy => {
                let normalized = self.normalizer.normalize(text);
                match &self.phonemizer {
                    Some(phonemizer) => {
                        let phonemes = phonemizer.phonemize(&normalized);
                        log::debug!("Phonemes: {}", phonemes);
                        self.tokenizer.encode(&phonemes)
                    }
                    None => self.tokenizer.encode(&normalized),
                }
            }
            KokoroVariant::V1_0 | KokoroVariant::V1_1 => {
                let tag = match detect_language(text) {
                    "zh" => "[ZH]",
                    _ => "[EN]",
                };
                let body = self.tokenizer.encode(text);
                if body.is_empty() {
                    return body;
                }
                let mut ids = Vec::with_capacity(body.len() + 1);
                ids.extend(self.tokenizer.token_id(tag));
                ids.extend(body);
                ids
            }
        }
    }
}

/// Directory tried when the configured voice bank cannot be loaded.
fn fallback_voices_dir(voices: &Path, model_dir: &Path, variant: KokoroVariant) -> PathBuf {
    match variant {
        KokoroVariant::Legacy => voices
            .parent()
            .map(|parent| parent.join("voices"))
            .unwrap_or_else(|| PathBuf::from("voices")),
        KokoroVariant::V1_0 | KokoroVariant::V1_1 => model_dir.join("voices"),
    }
}

fn load_voices(primary: &Path, fallback: &Path) -> SynthesisResult<VoiceEmbeddingStore> {
    match VoiceEmbeddingStore::open(primary, DEFAULT_EMBEDDING_DIM) {
        Ok(store) => Ok(store),
        Err(err) if fallback != primary => {
            log::warn!(
                "Failed to load voices from {} ({}), trying {}",
                primary.display(),
                err,
                fallback.display()
            );
            VoiceEmbeddingStore::from_dir(fallback, DEFAULT_EMBEDDING_DIM)
        }
        Err(err) => Err(err),
    }
}

impl SynthesisBackend for KokoroBackend {
    fn generate(&mut self, text: &str, voice: &str, speed: f32) -> SynthesisResult<SampleBuffer> {
        let model = self.model.as_ref().ok_or_else(|| {
            SynthesisError::Config(format!("{} backend is closed", self.variant.backend_name()))
        })?;

        let tokens = self.encode(text);
        if tokens.is_empty() {
            return Err(SynthesisError::EmptyInput);
        }
        let style = self.voices.get(voice)?;
        log::debug!(
            "Synthesizing {} tokens with voice '{}' at speed {}",
            tokens.len(),
            voice,
            speed
        );

        let mut inputs = TensorMap::new();
        inputs.insert(
            "input_ids".to_string(),
            Tensor::from_i64(vec![1, tokens.len()], tokens)?,
        );
        inputs.insert(
            "style".to_string(),
            Tensor::from_f32(vec![1, style.dim()], style.vector)?,
        );
        inputs.insert("speed".to_string(), Tensor::from_f32(vec![1], vec![speed])?);

        let run = || -> SynthesisResult<Vec<f32>> {
            let mut outputs = model.run(inputs)?;
            take_output(&mut outputs, "waveform")?.into_f32()
        };
        let samples = run().map_err(|e| e.in_stage(self.variant.backend_name()))?;
        Ok(SampleBuffer::new(samples, SAMPLE_RATE))
    }

    fn list_voices(&self) -> BTreeSet<String> {
        self.voices.list()
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: self.variant.backend_name().to_string(),
            languages: self
                .variant
                .languages()
                .iter()
                .map(|lang| lang.to_string())
                .collect(),
            sample_rate: SAMPLE_RATE,
        }
    }

    fn close(&mut self) -> SynthesisResult<()> {
        if self.model.take().is_some() {
            log::debug!("{} session released", self.variant.backend_name());
        }
        Ok(())
    }
}
