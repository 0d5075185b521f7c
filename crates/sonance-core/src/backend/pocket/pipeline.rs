//! Staged text → waveform pipeline for the Pocket model family.
//!
//! ```text
//! token ids ─→ text_conditioner ─→ text embeddings [T × H]
//!                                        │
//!                 ┌──────────────────────┘
//!                 ↓
//!   lm_main (autoregressive, N cache streams) ─→ conditioning [steps × H]
//!                                        │
//!   lm_flow (K Euler steps from noise) ─→ latent [steps × L]
//!                                        │
//!   decoder (latent + zeroed state bank) ─→ audio samples
//! ```
//!
//! Reference audio takes a separate path through `encoder`, producing a
//! [`SpeakerEmbedding`].
//!
//! Every stage talks to its graph only through [`Model::run`]. Stage errors
//! are tagged with the graph name, and a failing call aborts the whole
//! request; no partial audio is returned.

use super::rng::NormalSampler;
use crate::error::{SynthesisError, SynthesisResult};
use crate::runtime::{take_output, DType, Model, Tensor, TensorMap};
use serde::{Deserialize, Serialize};

/// Graph names, also used as stage names in errors.
pub const TEXT_CONDITIONER: &str = "text_conditioner";
pub const LM_MAIN: &str = "lm_main";
pub const LM_FLOW: &str = "lm_flow";
pub const ENCODER: &str = "encoder";
pub const DECODER: &str = "decoder";

// ============================================================================
// Configuration
// ============================================================================

/// Shape and dtype of one zero-initialized state input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSpec {
    pub shape: Vec<usize>,
    pub dtype: DType,
}

impl StateSpec {
    pub fn new(shape: &[usize], dtype: DType) -> Self {
        Self {
            shape: shape.to_vec(),
            dtype,
        }
    }

    fn zeros(&self) -> Tensor {
        Tensor::zeros(&self.shape, self.dtype)
    }
}

/// Tensor dimensions the exported graphs were traced with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelLayout {
    /// Width of text embedding and conditioning rows.
    pub hidden_dim: usize,
    /// Width of flow latent rows.
    pub latent_dim: usize,
    /// Width of one speaker embedding frame.
    pub speaker_dim: usize,
    /// Number of independent lm_main cache streams.
    pub cache_streams: usize,
    /// Shape of each stream's cache tensor.
    pub cache_shape: Vec<usize>,
    /// lm_main input that receives the speaker embedding. The stock export
    /// has no such input, so the embedding is not fed unless this is set.
    pub speaker_input: Option<String>,
    /// Decoder state slots `state_0..state_{n-1}`, in order.
    pub decoder_states: Vec<StateSpec>,
}

impl Default for ModelLayout {
    fn default() -> Self {
        Self {
            hidden_dim: 1024,
            latent_dim: 32,
            speaker_dim: 512,
            cache_streams: 6,
            cache_shape: vec![2, 1, 1000, 16, 64],
            speaker_input: None,
            decoder_states: default_decoder_states(),
        }
    }
}

/// The 56 decoder state slots of the stock Pocket export.
pub fn default_decoder_states() -> Vec<StateSpec> {
    fn flag() -> StateSpec {
        StateSpec::new(&[1], DType::Bool)
    }
    fn pos() -> StateSpec {
        StateSpec::new(&[1], DType::I64)
    }
    fn f(shape: &[usize]) -> StateSpec {
        StateSpec::new(shape, DType::F32)
    }
    let kv: &[usize] = &[2, 1, 8, 1000, 64];

    vec![
        flag(),
        f(&[1, 512, 6]),
        flag(),
        f(&[1, 64, 2]),
        f(&[1, 256, 6]),
        flag(),
        f(&[1, 256, 2]),
        flag(),
        f(&[1, 128, 0]),
        f(&[1, 128, 5]),
        flag(),
        f(&[1, 128, 2]),
        flag(),
        f(&[1, 64, 0]),
        f(&[1, 64, 4]),
        flag(),
        f(&[1, 64, 2]),
        flag(),
        f(&[1, 32, 0]),
        f(kv),
        pos(),
        pos(),
        f(kv),
        pos(),
        pos(),
        flag(),
        f(&[1, 512, 16]),
        flag(),
        f(&[1, 1, 6]),
        flag(),
        f(&[1, 64, 2]),
        flag(),
        f(&[1, 32, 0]),
        flag(),
        f(&[1, 512, 2]),
        flag(),
        f(&[1, 64, 4]),
        flag(),
        f(&[1, 128, 2]),
        flag(),
        f(&[1, 64, 0]),
        flag(),
        f(&[1, 128, 5]),
        flag(),
        f(&[1, 256, 2]),
        flag(),
        f(&[1, 128, 0]),
        flag(),
        f(&[1, 256, 6]),
        f(kv),
        pos(),
        pos(),
        f(kv),
        pos(),
        pos(),
        f(&[1, 512, 16]),
    ]
}

/// Pipeline tunables. Defaults reproduce the stock Pocket behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Generation stops once the end-of-sequence logit exceeds this.
    pub eos_threshold: f32,
    /// Step cap per input token.
    pub steps_per_token: usize,
    /// Absolute step cap.
    pub max_steps: usize,
    /// Euler steps in flow matching.
    pub flow_steps: usize,
    /// Seed for latent noise and fallback speaker embeddings.
    pub seed: u64,
    /// Magnitude of the random speaker embedding used when no voice exists.
    pub fallback_scale: f32,
    pub layout: ModelLayout,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            eos_threshold: 0.5,
            steps_per_token: 2,
            max_steps: 500,
            flow_steps: 32,
            seed: 42,
            fallback_scale: 0.1,
            layout: ModelLayout::default(),
        }
    }
}

impl PipelineConfig {
    /// Maximum autoregressive steps for `tokens` input tokens.
    pub fn step_cap(&self, tokens: usize) -> usize {
        tokens.saturating_mul(self.steps_per_token).min(self.max_steps)
    }

    pub fn validate(&self) -> SynthesisResult<()> {
        let layout = &self.layout;
        let checks = [
            (self.eos_threshold.is_finite(), "eos_threshold must be finite"),
            (self.steps_per_token > 0, "steps_per_token must be positive"),
            (self.max_steps > 0, "max_steps must be positive"),
            (self.flow_steps > 0, "flow_steps must be positive"),
            (layout.hidden_dim > 0, "layout.hidden_dim must be positive"),
            (layout.latent_dim > 0, "layout.latent_dim must be positive"),
            (layout.speaker_dim > 0, "layout.speaker_dim must be positive"),
            (layout.cache_streams > 0, "layout.cache_streams must be positive"),
        ];
        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, message)) => Err(SynthesisError::Config(message.to_string())),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Stage values
// ============================================================================

/// Output of the text conditioner: one `hidden_dim` row per token.
#[derive(Debug, Clone, PartialEq)]
pub struct TextEmbeddings {
    pub data: Vec<f32>,
    pub tokens: usize,
}

/// Speaker identity, as produced by the reference encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerEmbedding {
    pub data: Vec<f32>,
    /// Number of `speaker_dim` frames in `data`.
    pub frames: usize,
}

impl SpeakerEmbedding {
    pub fn new(data: Vec<f32>, speaker_dim: usize) -> Self {
        let frames = data.len() / speaker_dim.max(1);
        Self { data, frames }
    }

    fn to_tensor(&self, speaker_dim: usize) -> SynthesisResult<Tensor> {
        if speaker_dim == 0 || self.frames * speaker_dim != self.data.len() {
            return Err(SynthesisError::Tensor(format!(
                "speaker embedding of {} values is not a whole number of {}-wide frames",
                self.data.len(),
                speaker_dim
            )));
        }
        Tensor::from_f32(
            vec![1, self.frames, speaker_dim],
            self.data.clone(),
        )
    }
}

/// Per-stream lm_main state carried from one step to the next.
#[derive(Debug, Clone)]
pub struct ConditioningState {
    pub cache: Tensor,
    pub auxiliary: Tensor,
    pub position: i64,
}

impl ConditioningState {
    fn fresh(layout: &ModelLayout) -> Self {
        Self {
            cache: Tensor::zeros(&layout.cache_shape, DType::F32),
            auxiliary: Tensor::zeros(&[0], DType::F32),
            position: 0,
        }
    }

    /// Move this stream into the `state_{3i}..state_{3i+2}` inputs.
    fn into_inputs(self, stream: usize, inputs: &mut TensorMap) -> SynthesisResult<()> {
        let base = stream * 3;
        inputs.insert(format!("state_{}", base), self.cache);
        inputs.insert(format!("state_{}", base + 1), self.auxiliary);
        inputs.insert(
            format!("state_{}", base + 2),
            Tensor::from_i64(vec![1], vec![self.position])?,
        );
        Ok(())
    }

    /// Build the next state from step outputs. The cache is replaced by
    /// `out_state_{3i}`; the auxiliary buffer starts empty again.
    fn next(outputs: &mut TensorMap, stream: usize, step: usize) -> SynthesisResult<Self> {
        let cache = take_output(outputs, &format!("out_state_{}", stream * 3))?;
        Ok(Self {
            cache,
            auxiliary: Tensor::zeros(&[0], DType::F32),
            position: step as i64 + 1,
        })
    }
}

/// Conditioning rows accumulated by the autoregressive stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditioningSequence {
    pub data: Vec<f32>,
    pub hidden_dim: usize,
    /// Number of lm_main calls made.
    pub steps: usize,
    /// True when generation stopped on the end-of-sequence logit rather
    /// than the step cap.
    pub end_of_sequence: bool,
}

impl ConditioningSequence {
    fn new(hidden_dim: usize) -> Self {
        Self {
            data: Vec::new(),
            hidden_dim,
            steps: 0,
            end_of_sequence: false,
        }
    }

    fn push_chunk(&mut self, chunk: &[f32]) -> SynthesisResult<()> {
        if chunk.is_empty() || chunk.len() % self.hidden_dim != 0 {
            return Err(SynthesisError::Tensor(format!(
                "conditioning chunk of {} values is not a whole number of {}-wide rows",
                chunk.len(),
                self.hidden_dim
            )));
        }
        self.data.extend_from_slice(chunk);
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.data.len() / self.hidden_dim
    }
}

/// Flow-matching state, `rows × latent_dim`.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentSequence {
    pub data: Vec<f32>,
    pub rows: usize,
    pub latent_dim: usize,
}

// ============================================================================
// Pipeline
// ============================================================================

/// The five graphs of a Pocket model.
pub struct PocketModels {
    pub text_conditioner: Box<dyn Model>,
    pub lm_main: Box<dyn Model>,
    pub lm_flow: Box<dyn Model>,
    pub encoder: Box<dyn Model>,
    pub decoder: Box<dyn Model>,
}

/// Runs the conditioning, generation, refinement and vocoding stages.
pub struct StagedSynthesisPipeline {
    models: PocketModels,
    config: PipelineConfig,
}

impl StagedSynthesisPipeline {
    pub fn new(models: PocketModels, config: PipelineConfig) -> SynthesisResult<Self> {
        config.validate()?;
        Ok(Self { models, config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stage 1: token ids → one hidden row per token.
    pub fn condition_text(&self, tokens: &[i64]) -> SynthesisResult<TextEmbeddings> {
        if tokens.is_empty() {
            return Err(SynthesisError::EmptyInput);
        }
        let hidden = self.config.layout.hidden_dim;

        let mut inputs = TensorMap::new();
        inputs.insert(
            "token_ids".to_string(),
            Tensor::from_i64(vec![1, tokens.len()], tokens.to_vec())?,
        );

        let run = || -> SynthesisResult<TextEmbeddings> {
            let mut outputs = self.models.text_conditioner.run(inputs)?;
            let data = take_output(&mut outputs, "embeddings")?.into_f32()?;
            if data.is_empty() || data.len() % hidden != 0 {
                return Err(SynthesisError::Tensor(format!(
                    "embeddings of {} values are not a whole number of {}-wide rows",
                    data.len(),
                    hidden
                )));
            }
            let tokens = data.len() / hidden;
            Ok(TextEmbeddings { data, tokens })
        };
        run().map_err(|e| e.in_stage(TEXT_CONDITIONER))
    }

    /// Stage 2: autoregressive conditioning generation.
    ///
    /// Runs lm_main until the end-of-sequence logit exceeds
    /// `eos_threshold` or [`PipelineConfig::step_cap`] steps have run,
    /// whichever comes first. Each step's chunk is kept, including the
    /// chunk of the stopping step.
    pub fn generate_conditioning(
        &self,
        text: &TextEmbeddings,
        speaker: Option<&SpeakerEmbedding>,
    ) -> SynthesisResult<ConditioningSequence> {
        let layout = &self.config.layout;
        let cap = self.config.step_cap(text.tokens);
        if cap == 0 {
            return Err(SynthesisError::EmptyInput);
        }

        let speaker_input = match (&layout.speaker_input, speaker) {
            (Some(name), Some(speaker)) => Some((
                name.clone(),
                speaker
                    .to_tensor(layout.speaker_dim)
                    .map_err(|e| e.in_stage(LM_MAIN))?,
            )),
            _ => None,
        };

        let mut states: Vec<ConditioningState> = (0..layout.cache_streams)
            .map(|_| ConditioningState::fresh(layout))
            .collect();
        let mut sequence = ConditioningSequence::new(layout.hidden_dim);
        log::debug!("lm_main: {} text rows, step cap {}", text.tokens, cap);

        for step in 0..cap {
            let mut run_step = || -> SynthesisResult<bool> {
                let mut inputs = TensorMap::new();
                inputs.insert(
                    "sequence".to_string(),
                    Tensor::zeros(&[1, 1, layout.latent_dim], DType::F32),
                );
                inputs.insert(
                    "text_embeddings".to_string(),
                    Tensor::from_f32(
                        vec![1, text.tokens, layout.hidden_dim],
                        text.data.clone(),
                    )?,
                );
                if let Some((name, tensor)) = &speaker_input {
                    inputs.insert(name.clone(), tensor.clone());
                }
                for (stream, state) in states.drain(..).enumerate() {
                    state.into_inputs(stream, &mut inputs)?;
                }

                let mut outputs = self.models.lm_main.run(inputs)?;

                let chunk = take_output(&mut outputs, "conditioning")?.into_f32()?;
                sequence.push_chunk(&chunk)?;
                sequence.steps += 1;

                let eos = take_output(&mut outputs, "eos_logit")?;
                let eos_logit = eos.as_f32().and_then(|v| v.first().copied()).ok_or_else(|| {
                    SynthesisError::Tensor("eos_logit must be a non-empty float32 tensor".to_string())
                })?;
                log::trace!("lm_main step {}: eos_logit {:.4}", step, eos_logit);

                if eos_logit > self.config.eos_threshold {
                    return Ok(true);
                }

                states = (0..layout.cache_streams)
                    .map(|stream| ConditioningState::next(&mut outputs, stream, step))
                    .collect::<SynthesisResult<_>>()?;
                Ok(false)
            };

            if run_step().map_err(|e| e.in_stage(LM_MAIN))? {
                sequence.end_of_sequence = true;
                break;
            }
        }

        log::debug!(
            "lm_main: {} steps, {} ({} conditioning rows)",
            sequence.steps,
            if sequence.end_of_sequence {
                "end of sequence"
            } else {
                "step cap reached"
            },
            sequence.rows()
        );
        Ok(sequence)
    }

    /// Stage 3: flow matching.
    ///
    /// Starts from standard-normal noise and takes exactly `flow_steps`
    /// forward Euler steps of size `1 / flow_steps` along lm_flow's
    /// direction, with `t = k / flow_steps` at step `k`.
    pub fn refine_latents(
        &self,
        conditioning: &ConditioningSequence,
        rng: &mut NormalSampler,
    ) -> SynthesisResult<LatentSequence> {
        let layout = &self.config.layout;
        let rows = conditioning.rows();
        if rows == 0 {
            return Err(SynthesisError::model(LM_FLOW, "no conditioning rows to refine"));
        }
        let steps = self.config.flow_steps;
        let dt = 1.0 / steps as f32;

        let mut latent = LatentSequence {
            data: rng.sample_vec(rows * layout.latent_dim, 1.0),
            rows,
            latent_dim: layout.latent_dim,
        };

        for k in 0..steps {
            let t = k as f32 / steps as f32;
            let run_step = || -> SynthesisResult<Vec<f32>> {
                let mut inputs = TensorMap::new();
                inputs.insert(
                    "c".to_string(),
                    Tensor::from_f32(vec![rows, layout.hidden_dim], conditioning.data.clone())?,
                );
                inputs.insert("s".to_string(), Tensor::from_f32(vec![rows, 1], vec![1.0; rows])?);
                inputs.insert("t".to_string(), Tensor::from_f32(vec![rows, 1], vec![t; rows])?);
                inputs.insert(
                    "x".to_string(),
                    Tensor::from_f32(vec![rows, layout.latent_dim], latent.data.clone())?,
                );

                let mut outputs = self.models.lm_flow.run(inputs)?;
                let direction = take_output(&mut outputs, "flow_dir")?.into_f32()?;
                if direction.len() != latent.data.len() {
                    return Err(SynthesisError::Tensor(format!(
                        "flow_dir has {} values, latent has {}",
                        direction.len(),
                        latent.data.len()
                    )));
                }
                Ok(direction)
            };

            let direction = run_step().map_err(|e| e.in_stage(LM_FLOW))?;
            for (x, d) in latent.data.iter_mut().zip(&direction) {
                *x += d * dt;
            }
            log::trace!("lm_flow step {}/{} (t = {:.4})", k + 1, steps, t);
        }

        Ok(latent)
    }

    /// Stage 4: latent → audio samples.
    ///
    /// The decoder's recurrent state slots are all zero-filled for a single
    /// whole-utterance call. Samples are returned as the graph emits them.
    pub fn vocode(&self, latent: &LatentSequence) -> SynthesisResult<Vec<f32>> {
        let run = || -> SynthesisResult<Vec<f32>> {
            let mut inputs = TensorMap::new();
            inputs.insert(
                "latent".to_string(),
                Tensor::from_f32(
                    vec![1, latent.rows, latent.latent_dim],
                    latent.data.clone(),
                )?,
            );
            for (i, spec) in self.config.layout.decoder_states.iter().enumerate() {
                inputs.insert(format!("state_{}", i), spec.zeros());
            }

            let mut outputs = self.models.decoder.run(inputs)?;
            take_output(&mut outputs, "audio_frame")?.into_f32()
        };
        run().map_err(|e| e.in_stage(DECODER))
    }

    /// Encode reference audio into a speaker embedding.
    pub fn encode_reference(&self, audio: &[f32]) -> SynthesisResult<SpeakerEmbedding> {
        if audio.is_empty() {
            return Err(SynthesisError::EmptyInput);
        }
        let run = || -> SynthesisResult<SpeakerEmbedding> {
            let mut inputs = TensorMap::new();
            inputs.insert(
                "audio".to_string(),
                Tensor::from_f32(vec![1, 1, audio.len()], audio.to_vec())?,
            );
            let mut outputs = self.models.encoder.run(inputs)?;
            let data = take_output(&mut outputs, "latents")?.into_f32()?;
            if data.is_empty() {
                return Err(SynthesisError::Tensor("encoder returned no latents".to_string()));
            }
            Ok(SpeakerEmbedding::new(data, self.config.layout.speaker_dim))
        };
        run().map_err(|e| e.in_stage(ENCODER))
    }

    /// Run all stages for one request.
    pub fn synthesize(
        &self,
        tokens: &[i64],
        speaker: Option<&SpeakerEmbedding>,
        rng: &mut NormalSampler,
    ) -> SynthesisResult<Vec<f32>> {
        let text = self.condition_text(tokens)?;
        let conditioning = self.generate_conditioning(&text, speaker)?;
        let latent = self.refine_latents(&conditioning, rng)?;
        let audio = self.vocode(&latent)?;
        log::debug!(
            "Synthesized {} samples from {} tokens",
            audio.len(),
            tokens.len()
        );
        Ok(audio)
    }
}
