//! Test fixtures for common inputs and model stacks.
//!
//! The Pocket fixtures use [`small_layout`] so that cache and state tensors
//! stay tiny; the mocks check the shapes they are fed against that layout.

use super::mocks::MockModel;
use crate::backend::pocket::{
    ModelLayout, PocketModels, StateSpec, DECODER, ENCODER, LM_FLOW, LM_MAIN, TEXT_CONDITIONER,
};
use crate::error::{SynthesisError, SynthesisResult};
use crate::runtime::{DType, Tensor, TensorMap};
use crate::tokenizer::{Segmentation, SpecialTokens, Tokenizer};
use std::collections::HashMap;

/// Generate a simple sine wave for audio testing.
///
/// # Arguments
/// * `sample_rate` - Sample rate in Hz
/// * `frequency` - Frequency of sine wave in Hz
/// * `duration_secs` - Duration in seconds
pub fn sine_wave(sample_rate: u32, frequency: f32, duration_secs: f32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Deterministic decoder output. Some values lie outside [-1, 1] so tests
/// can tell whether anything clamped them.
pub fn fixture_audio(len: usize) -> Vec<f32> {
    (0..len).map(|i| (i as f32 * 0.37).sin() * 1.5).collect()
}

/// A layout small enough to keep every tensor in a test to a few values.
pub fn small_layout() -> ModelLayout {
    ModelLayout {
        hidden_dim: 4,
        latent_dim: 2,
        speaker_dim: 3,
        cache_streams: 2,
        cache_shape: vec![2, 1, 2, 1, 2],
        speaker_input: None,
        decoder_states: vec![
            StateSpec::new(&[1], DType::Bool),
            StateSpec::new(&[1, 2, 0], DType::F32),
            StateSpec::new(&[1], DType::I64),
            StateSpec::new(&[1, 2, 3], DType::F32),
        ],
    }
}

/// Text conditioner returning one `hidden_dim` row per token id, each row
/// filled with the token id.
pub fn text_conditioner_mock(layout: &ModelLayout) -> MockModel {
    let hidden = layout.hidden_dim;
    MockModel::from_fn(TEXT_CONDITIONER, move |inputs, _| {
        let ids = require(inputs, "token_ids")?
            .as_i64()
            .ok_or_else(|| SynthesisError::Tensor("token_ids must be int64".to_string()))?
            .to_vec();
        let data = ids
            .iter()
            .flat_map(|&id| std::iter::repeat(id as f32).take(hidden))
            .collect();
        single("embeddings", Tensor::from_f32(vec![1, ids.len(), hidden], data)?)
    })
}

/// lm_main behavior that checks state threading and reports `eos(step)`.
///
/// At step `s` every stream must arrive with position `s` and a cache
/// whose values all equal `s`; the returned cache holds `s + 1`. The
/// conditioning chunk is one row filled with `s`.
pub fn lm_main_echo<E>(
    layout: &ModelLayout,
    eos: E,
) -> impl Fn(&TensorMap, usize) -> SynthesisResult<TensorMap> + Send + Sync + 'static
where
    E: Fn(usize) -> f32 + Send + Sync + 'static,
{
    let layout = layout.clone();
    move |inputs, step| {
        require(inputs, "sequence")?;
        require(inputs, "text_embeddings")?;

        let mut outputs = TensorMap::new();
        for stream in 0..layout.cache_streams {
            let base = stream * 3;
            let cache = require(inputs, &format!("state_{}", base))?;
            let auxiliary = require(inputs, &format!("state_{}", base + 1))?;
            let position = require(inputs, &format!("state_{}", base + 2))?;

            if cache.shape() != layout.cache_shape.as_slice() || !auxiliary.is_empty() {
                return Err(SynthesisError::Tensor(format!(
                    "stream {} state has wrong shape at step {}",
                    stream, step
                )));
            }
            if position.as_i64() != Some(&[step as i64][..]) {
                return Err(SynthesisError::Tensor(format!(
                    "stream {} position {:?} at step {}",
                    stream,
                    position.as_i64(),
                    step
                )));
            }
            let values = cache
                .as_f32()
                .ok_or_else(|| SynthesisError::Tensor("cache must be float32".to_string()))?;
            if values.iter().any(|&v| v != step as f32) {
                return Err(SynthesisError::Tensor(format!(
                    "stream {} cache was not carried over from step {}",
                    stream, step
                )));
            }

            let next: Vec<f32> = values.iter().map(|v| v + 1.0).collect();
            outputs.insert(
                format!("out_state_{}", base),
                Tensor::from_f32(layout.cache_shape.clone(), next)?,
            );
        }

        outputs.insert(
            "conditioning".to_string(),
            Tensor::from_f32(
                vec![1, 1, layout.hidden_dim],
                vec![step as f32; layout.hidden_dim],
            )?,
        );
        outputs.insert(
            "eos_logit".to_string(),
            Tensor::from_f32(vec![1], vec![eos(step)])?,
        );
        Ok(outputs)
    }
}

/// lm_flow returning a constant direction shaped like `x`.
pub fn constant_flow_mock(direction: f32) -> MockModel {
    MockModel::from_fn(LM_FLOW, move |inputs, _| {
        let x = require(inputs, "x")?;
        for name in ["c", "s", "t"] {
            require(inputs, name)?;
        }
        single(
            "flow_dir",
            Tensor::from_f32(x.shape().to_vec(), vec![direction; x.len()])?,
        )
    })
}

/// Encoder returning `frames` speaker frames filled with 0.25.
pub fn encoder_mock(layout: &ModelLayout, frames: usize) -> MockModel {
    let dim = layout.speaker_dim;
    MockModel::from_fn(ENCODER, move |inputs, _| {
        let audio = require(inputs, "audio")?;
        if audio.shape().len() != 3 || audio.shape()[..2] != [1, 1] {
            return Err(SynthesisError::Tensor(format!(
                "audio must be [1, 1, S], got {:?}",
                audio.shape()
            )));
        }
        single(
            "latents",
            Tensor::from_f32(vec![1, frames, dim], vec![0.25; frames * dim])?,
        )
    })
}

/// Decoder that checks its state bank against the layout and returns
/// `audio` unchanged.
pub fn decoder_mock(layout: &ModelLayout, audio: Vec<f32>) -> MockModel {
    let layout = layout.clone();
    MockModel::from_fn(DECODER, move |inputs, _| {
        let latent = require(inputs, "latent")?;
        if latent.shape().len() != 3 || latent.shape()[2] != layout.latent_dim {
            return Err(SynthesisError::Tensor(format!(
                "latent must be [1, rows, {}], got {:?}",
                layout.latent_dim,
                latent.shape()
            )));
        }
        for (i, spec) in layout.decoder_states.iter().enumerate() {
            let state = require(inputs, &format!("state_{}", i))?;
            if state.shape() != spec.shape.as_slice() || state.dtype() != spec.dtype {
                return Err(SynthesisError::Tensor(format!("state_{} does not match", i)));
            }
        }
        single(
            "audio_frame",
            Tensor::from_f32(vec![1, audio.len()], audio.clone())?,
        )
    })
}

/// A complete Pocket model stack: lm_main never signals end of sequence,
/// lm_flow returns zero direction and the decoder emits
/// [`fixture_audio`]`(audio_len)`.
pub fn pocket_models(layout: &ModelLayout, audio_len: usize) -> PocketModels {
    PocketModels {
        text_conditioner: Box::new(text_conditioner_mock(layout)),
        lm_main: Box::new(MockModel::from_fn(LM_MAIN, lm_main_echo(layout, |_| 0.0))),
        lm_flow: Box::new(constant_flow_mock(0.0)),
        encoder: Box::new(encoder_mock(layout, 2)),
        decoder: Box::new(decoder_mock(layout, fixture_audio(audio_len))),
    }
}

/// Subword tokenizer over lowercase ASCII letters and space (ids 10..).
pub fn ascii_tokenizer() -> Tokenizer {
    let vocab: HashMap<String, i64> = ('a'..='z')
        .chain(std::iter::once(' '))
        .enumerate()
        .map(|(i, c)| (c.to_string(), 10 + i as i64))
        .collect();
    Tokenizer::new(
        vocab,
        Segmentation::LongestMatch,
        SpecialTokens {
            bos: 1,
            eos: Some(2),
            unk: Some(3),
            pad: 0,
        },
    )
}

/// A few `cmudict.dict` entries.
pub const CMUDICT_FIXTURE: &str = "cats K AE1 T S\nhello HH AH0 L OW1\ntwo T UW1\n";

/// Character tokenizer in the `tokens.txt` style, with `[EN]`/`[ZH]` tags.
pub fn kokoro_tokenizer() -> Tokenizer {
    let mut vocab: HashMap<String, i64> = ('a'..='z')
        .chain(" 你好".chars())
        .enumerate()
        .map(|(i, c)| (c.to_string(), 10 + i as i64))
        .collect();
    vocab.insert("[EN]".to_string(), 178);
    vocab.insert("[ZH]".to_string(), 179);
    Tokenizer::new(
        vocab,
        Segmentation::Character,
        SpecialTokens {
            bos: 0,
            eos: None,
            unk: None,
            pad: 0,
        },
    )
}

fn require<'a>(inputs: &'a TensorMap, name: &str) -> SynthesisResult<&'a Tensor> {
    inputs
        .get(name)
        .ok_or_else(|| SynthesisError::Tensor(format!("missing input '{}'", name)))
}

fn single(name: &str, tensor: Tensor) -> SynthesisResult<TensorMap> {
    let mut outputs = TensorMap::new();
    outputs.insert(name.to_string(), tensor);
    Ok(outputs)
}
