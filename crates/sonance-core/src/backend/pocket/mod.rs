//! Pocket: a voice-cloning backend built on a five-graph staged pipeline.
//!
//! Model directory layout:
//!
//! ```text
//! models/pocket/
//! ├── text_conditioner.onnx
//! ├── lm_main.onnx          (lm_main_int8.onnx)
//! ├── lm_flow.onnx          (lm_flow_int8.onnx)
//! ├── encoder.onnx
//! ├── decoder.onnx          (decoder_int8.onnx)
//! ├── vocab.json
//! └── token_scores.json
//! ```
//!
//! Pocket ships no voice bank. Voices are registered at runtime from
//! reference audio through [`VoiceCloning`].

pub mod pipeline;
pub mod rng;

pub use pipeline::{
    default_decoder_states, ConditioningSequence, ConditioningState, LatentSequence, ModelLayout,
    PipelineConfig, PocketModels, SpeakerEmbedding, StagedSynthesisPipeline, StateSpec,
    TextEmbeddings, DECODER, ENCODER, LM_FLOW, LM_MAIN, TEXT_CONDITIONER,
};
pub use rng::NormalSampler;

use super::{BackendInfo, SynthesisBackend, VoiceCloning};
use crate::audio::{SampleBuffer, SAMPLE_RATE};
use crate::config::BackendConfig;
use crate::error::{SynthesisError, SynthesisResult};
use crate::runtime::onnx::OnnxModel;
use crate::tokenizer::Tokenizer;
use std::collections::{BTreeSet, HashMap};

const BACKEND_NAME: &str = "pocket";

fn closed() -> SynthesisError {
    SynthesisError::Config(format!("{} backend is closed", BACKEND_NAME))
}

/// Voice-cloning backend over [`StagedSynthesisPipeline`].
pub struct PocketBackend {
    /// `None` once the backend is closed.
    pipeline: Option<StagedSynthesisPipeline>,
    tokenizer: Tokenizer,
    voices: HashMap<String, SpeakerEmbedding>,
    default_reference: Option<SpeakerEmbedding>,
    rng: NormalSampler,
}

impl PocketBackend {
    /// Load graphs and vocabulary from the configured model directory.
    pub fn load(config: &BackendConfig) -> SynthesisResult<Self> {
        config.validate()?;
        let dir = config.model_dir();
        if !dir.is_dir() {
            return Err(SynthesisError::Config(format!(
                "pocket model directory not found: {}",
                dir.display()
            )));
        }

        let vocab_path = config
            .tokens_path
            .clone()
            .unwrap_or_else(|| dir.join("vocab.json"));
        let scores_path = dir.join("token_scores.json");
        let tokenizer = Tokenizer::from_vocab_json(&vocab_path, Some(&scores_path))?;

        let layout = &config.pipeline.layout;
        let mut lm_main_outputs = vec!["conditioning".to_string(), "eos_logit".to_string()];
        lm_main_outputs.extend((0..layout.cache_streams).map(|i| format!("out_state_{}", i * 3)));

        let models = PocketModels {
            text_conditioner: Box::new(OnnxModel::load(
                TEXT_CONDITIONER,
                dir.join("text_conditioner.onnx"),
                &["embeddings"],
            )?),
            lm_main: Box::new(OnnxModel::load(
                LM_MAIN,
                config.stage_file(LM_MAIN),
                &lm_main_outputs,
            )?),
            lm_flow: Box::new(OnnxModel::load(
                LM_FLOW,
                config.stage_file(LM_FLOW),
                &["flow_dir"],
            )?),
            encoder: Box::new(OnnxModel::load(
                ENCODER,
                dir.join("encoder.onnx"),
                &["latents"],
            )?),
            decoder: Box::new(OnnxModel::load(
                DECODER,
                config.stage_file(DECODER),
                &["audio_frame"],
            )?),
        };

        log::info!(
            "Pocket backend ready ({} variant, vocabulary {})",
            config.model_variant,
            tokenizer.vocab_size()
        );
        Self::from_parts(models, tokenizer, config.pipeline.clone())
    }

    /// Assemble a backend from already-constructed parts.
    pub fn from_parts(
        models: PocketModels,
        tokenizer: Tokenizer,
        config: PipelineConfig,
    ) -> SynthesisResult<Self> {
        let rng = NormalSampler::new(config.seed);
        Ok(Self {
            pipeline: Some(StagedSynthesisPipeline::new(models, config)?),
            tokenizer,
            voices: HashMap::new(),
            default_reference: None,
            rng,
        })
    }

    fn pipeline(&self) -> SynthesisResult<&StagedSynthesisPipeline> {
        self.pipeline.as_ref().ok_or_else(closed)
    }

    /// Speaker for a request: the named voice, then the default reference,
    /// then a low-magnitude random embedding.
    fn resolve_speaker(&mut self, voice: &str) -> SynthesisResult<SpeakerEmbedding> {
        if !voice.is_empty() {
            if let Some(embedding) = self.voices.get(voice) {
                return Ok(embedding.clone());
            }
        }
        if let Some(embedding) = &self.default_reference {
            return Ok(embedding.clone());
        }

        let config = self.pipeline()?.config();
        let (dim, scale) = (config.layout.speaker_dim, config.fallback_scale);
        log::warn!(
            "No reference voice for '{}', using a random speaker embedding",
            voice
        );
        Ok(SpeakerEmbedding::new(self.rng.sample_vec(dim, scale), dim))
    }

    fn encode(&self, text: &str) -> SynthesisResult<Vec<i64>> {
        let tokens = self.tokenizer.encode(text);
        if tokens.is_empty() {
            return Err(SynthesisError::EmptyInput);
        }
        log::debug!("Tokenized {} chars into {} tokens", text.len(), tokens.len());
        Ok(tokens)
    }

    fn run(&mut self, tokens: &[i64], speaker: &SpeakerEmbedding) -> SynthesisResult<SampleBuffer> {
        let pipeline = self.pipeline.as_ref().ok_or_else(closed)?;
        let samples = pipeline.synthesize(tokens, Some(speaker), &mut self.rng)?;
        Ok(SampleBuffer::new(samples, SAMPLE_RATE))
    }
}

impl SynthesisBackend for PocketBackend {
    /// `speed` is accepted for interface compatibility; this model family
    /// has no rate control.
    fn generate(&mut self, text: &str, voice: &str, _speed: f32) -> SynthesisResult<SampleBuffer> {
        self.pipeline()?;
        // The random speaker fallback draws from the sampler; tokenize first.
        let tokens = self.encode(text)?;
        let speaker = self.resolve_speaker(voice)?;
        self.run(&tokens, &speaker)
    }

    fn list_voices(&self) -> BTreeSet<String> {
        self.voices.keys().cloned().collect()
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: BACKEND_NAME.to_string(),
            languages: vec!["en".to_string(), "zh".to_string(), "multilingual".to_string()],
            sample_rate: SAMPLE_RATE,
        }
    }

    fn close(&mut self) -> SynthesisResult<()> {
        self.pipeline = None;
        self.voices.clear();
        self.default_reference = None;
        log::debug!("Pocket backend closed");
        Ok(())
    }

    fn as_cloning(&mut self) -> Option<&mut dyn VoiceCloning> {
        Some(self)
    }
}

impl VoiceCloning for PocketBackend {
    fn generate_with_reference(
        &mut self,
        text: &str,
        reference: &SampleBuffer,
        _speed: f32,
    ) -> SynthesisResult<SampleBuffer> {
        let speaker = self.pipeline()?.encode_reference(&reference.samples)?;
        let tokens = self.encode(text)?;
        self.run(&tokens, &speaker)
    }

    fn register_voice(&mut self, name: &str, reference: &SampleBuffer) -> SynthesisResult<()> {
        let speaker = self.pipeline()?.encode_reference(&reference.samples)?;
        if self.voices.insert(name.to_string(), speaker).is_some() {
            log::debug!("Replaced voice '{}'", name);
        } else {
            log::info!("Registered voice '{}'", name);
        }
        Ok(())
    }

    fn set_default_reference(&mut self, reference: Option<&SampleBuffer>) -> SynthesisResult<()> {
        self.pipeline()?;
        self.default_reference = match reference {
            Some(audio) => Some(self.pipeline()?.encode_reference(&audio.samples)?),
            None => None,
        };
        Ok(())
    }
}
