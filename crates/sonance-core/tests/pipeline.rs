//! Integration tests for the staged Pocket pipeline and the backend
//! registry, run entirely on mock graphs.
//!
//! This tests:
//! - Voice registration and synthesis through the backend contract
//! - End-of-sequence and step-cap termination of the autoregressive stage
//! - Flow-matching integration against a reference computation
//! - Stage-tagged error propagation
//! - Registry isolation

use sonance_core::backend::pocket::{
    ConditioningSequence, NormalSampler, PipelineConfig, PocketBackend, StagedSynthesisPipeline,
    TextEmbeddings, DECODER, LM_FLOW, LM_MAIN,
};
use sonance_core::backend::{BackendConstructor, BackendInfo, BackendRegistry, SynthesisBackend};
use sonance_core::runtime::{Tensor, TensorMap};
use sonance_core::testing::{
    ascii_tokenizer, constant_flow_mock, fixture_audio, lm_main_echo, pocket_models, sine_wave,
    small_layout, MockModel,
};
use sonance_core::{BackendConfig, SampleBuffer, SynthesisError, SynthesisResult};
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

fn small_config() -> PipelineConfig {
    PipelineConfig {
        layout: small_layout(),
        ..PipelineConfig::default()
    }
}

fn text_rows(tokens: usize) -> TextEmbeddings {
    TextEmbeddings {
        data: vec![1.0; tokens * small_layout().hidden_dim],
        tokens,
    }
}

fn reference_audio() -> SampleBuffer {
    SampleBuffer::new(sine_wave(24_000, 440.0, 0.05), 24_000)
}

// ============================================================================
// Backend
// ============================================================================

#[test]
fn test_registered_voice_synthesizes_decoder_output() {
    let mut backend =
        PocketBackend::from_parts(pocket_models(&small_layout(), 240), ascii_tokenizer(), small_config())
            .expect("backend");

    backend
        .as_cloning()
        .expect("pocket supports cloning")
        .register_voice("voiceA", &reference_audio())
        .expect("register voiceA");
    assert!(backend.list_voices().contains("voiceA"));

    let audio = backend.generate("hello", "voiceA", 1.0).expect("generate");

    // Samples come back exactly as the decoder emitted them, unclamped.
    assert_eq!(audio.sample_rate, 24_000);
    assert_eq!(audio.samples, fixture_audio(240));
    assert!(audio.samples.iter().any(|s| s.abs() > 1.0));
}

#[test]
fn test_generate_with_reference_does_not_register() {
    let mut backend =
        PocketBackend::from_parts(pocket_models(&small_layout(), 16), ascii_tokenizer(), small_config())
            .expect("backend");

    let audio = backend
        .as_cloning()
        .expect("pocket supports cloning")
        .generate_with_reference("hi there", &reference_audio(), 1.0)
        .expect("generate");
    assert_eq!(audio.len(), 16);
    assert!(backend.list_voices().is_empty());
}

#[test]
fn test_decoder_failure_fails_whole_request() {
    let mut models = pocket_models(&small_layout(), 16);
    models.decoder = Box::new(MockModel::with_outputs(DECODER, TensorMap::new()).with_error("device lost"));
    let mut backend =
        PocketBackend::from_parts(models, ascii_tokenizer(), small_config()).expect("backend");

    match backend.generate("hello", "", 1.0) {
        Err(SynthesisError::ModelExecution { stage, message }) => {
            assert_eq!(stage, "decoder");
            assert_eq!(message, "device lost");
        }
        other => panic!("expected decoder failure, got {:?}", other),
    }
}

#[test]
fn test_malformed_lm_main_output_is_tagged() {
    let mut models = pocket_models(&small_layout(), 16);
    models.lm_main = Box::new(MockModel::with_output(
        LM_MAIN,
        "eos_logit",
        Tensor::from_f32(vec![1], vec![0.0]).unwrap(),
    ));
    let mut backend =
        PocketBackend::from_parts(models, ascii_tokenizer(), small_config()).expect("backend");

    match backend.generate("hello", "", 1.0) {
        Err(SynthesisError::ModelExecution { stage, message }) => {
            assert_eq!(stage, "lm_main");
            assert!(message.contains("conditioning"), "message: {}", message);
        }
        other => panic!("expected lm_main failure, got {:?}", other),
    }
}

// ============================================================================
// Autoregressive stage
// ============================================================================

#[test]
fn test_generation_stops_on_end_of_sequence() {
    let layout = small_layout();
    let mut models = pocket_models(&layout, 8);
    let lm_main = MockModel::from_fn(
        LM_MAIN,
        lm_main_echo(&layout, |step| if step == 3 { 0.9 } else { 0.0 }),
    );
    let calls = lm_main.call_counter();
    models.lm_main = Box::new(lm_main);
    let pipeline = StagedSynthesisPipeline::new(models, small_config()).unwrap();

    let sequence = pipeline.generate_conditioning(&text_rows(20), None).unwrap();

    assert!(sequence.end_of_sequence);
    assert_eq!(sequence.steps, 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    // The chunk of the stopping step is kept.
    assert_eq!(sequence.rows(), 4);
    assert_eq!(&sequence.data[12..], &[3.0; 4]);
}

#[test]
fn test_logit_at_threshold_does_not_stop() {
    let layout = small_layout();
    let mut models = pocket_models(&layout, 8);
    models.lm_main = Box::new(MockModel::from_fn(LM_MAIN, lm_main_echo(&layout, |_| 0.5)));
    let pipeline = StagedSynthesisPipeline::new(models, small_config()).unwrap();

    let sequence = pipeline.generate_conditioning(&text_rows(3), None).unwrap();
    assert!(!sequence.end_of_sequence);
    assert_eq!(sequence.steps, 6);
}

#[test]
fn test_step_cap_is_absolute_for_long_inputs() {
    let layout = small_layout();
    let models = pocket_models(&layout, 8);
    let pipeline = StagedSynthesisPipeline::new(models, small_config()).unwrap();

    let sequence = pipeline.generate_conditioning(&text_rows(300), None).unwrap();
    assert!(!sequence.end_of_sequence);
    assert_eq!(sequence.steps, 500);
    assert_eq!(sequence.rows(), 500);
}

#[test]
fn test_step_cap_follows_config() {
    let config = PipelineConfig {
        steps_per_token: 3,
        max_steps: 10,
        ..small_config()
    };
    let pipeline = StagedSynthesisPipeline::new(pocket_models(&small_layout(), 8), config).unwrap();

    assert_eq!(pipeline.generate_conditioning(&text_rows(2), None).unwrap().steps, 6);
    assert_eq!(pipeline.generate_conditioning(&text_rows(7), None).unwrap().steps, 10);
}

// ============================================================================
// Flow matching
// ============================================================================

#[test]
fn test_flow_matches_sequential_euler_reference() {
    let layout = small_layout();
    let times = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&times);

    let mut models = pocket_models(&layout, 8);
    models.lm_flow = Box::new(MockModel::from_fn(LM_FLOW, move |inputs: &TensorMap, _| {
        let t = inputs["t"].as_f32().unwrap()[0];
        seen.lock().unwrap().push(t);
        let x = &inputs["x"];
        let mut out = TensorMap::new();
        out.insert(
            "flow_dir".to_string(),
            Tensor::from_f32(x.shape().to_vec(), vec![1.0; x.len()])?,
        );
        Ok(out)
    }));
    let config = small_config();
    let seed = config.seed;
    let pipeline = StagedSynthesisPipeline::new(models, config).unwrap();

    let rows = 3;
    let conditioning = ConditioningSequence {
        data: vec![0.0; rows * layout.hidden_dim],
        hidden_dim: layout.hidden_dim,
        steps: rows,
        end_of_sequence: true,
    };
    let latent = pipeline
        .refine_latents(&conditioning, &mut NormalSampler::new(seed))
        .unwrap();

    let mut expected = NormalSampler::new(seed).sample_vec(rows * layout.latent_dim, 1.0);
    for _ in 0..32 {
        for x in expected.iter_mut() {
            *x += 1.0 * (1.0 / 32.0);
        }
    }
    assert_eq!(latent.rows, rows);
    assert_eq!(latent.data, expected);

    let initial = NormalSampler::new(seed).sample_vec(rows * layout.latent_dim, 1.0);
    for (x, x0) in latent.data.iter().zip(&initial) {
        assert!((x - (x0 + 1.0)).abs() < 1e-5);
    }

    let times = times.lock().unwrap();
    assert_eq!(times.len(), 32);
    for (k, t) in times.iter().enumerate() {
        assert_eq!(*t, k as f32 / 32.0);
    }
}

#[test]
fn test_zero_direction_keeps_noise() {
    let layout = small_layout();
    let mut models = pocket_models(&layout, 8);
    models.lm_flow = Box::new(constant_flow_mock(0.0));
    let pipeline = StagedSynthesisPipeline::new(models, small_config()).unwrap();

    let conditioning = ConditioningSequence {
        data: vec![0.0; layout.hidden_dim],
        hidden_dim: layout.hidden_dim,
        steps: 1,
        end_of_sequence: false,
    };
    let latent = pipeline
        .refine_latents(&conditioning, &mut NormalSampler::new(7))
        .unwrap();
    assert_eq!(latent.data, NormalSampler::new(7).sample_vec(layout.latent_dim, 1.0));
}

// ============================================================================
// Registry
// ============================================================================

struct NullBackend;

impl SynthesisBackend for NullBackend {
    fn generate(&mut self, _text: &str, _voice: &str, _speed: f32) -> SynthesisResult<SampleBuffer> {
        Ok(SampleBuffer::new(vec![0.0; 4], 24_000))
    }

    fn list_voices(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: "null".to_string(),
            languages: vec!["en".to_string()],
            sample_rate: 24_000,
        }
    }

    fn close(&mut self) -> SynthesisResult<()> {
        Ok(())
    }
}

fn null_constructor() -> BackendConstructor {
    Box::new(|_config: BackendConfig| Ok(Box::new(NullBackend) as Box<dyn SynthesisBackend>))
}

#[test]
fn test_registries_are_isolated() {
    let mut first = BackendRegistry::new();
    first.register("null", null_constructor());
    let second = BackendRegistry::new();

    assert!(first.is_registered("null"));
    assert!(!second.is_registered("null"));

    let mut backend = first.construct("null", BackendConfig::default()).unwrap();
    assert!(backend.as_cloning().is_none());
    assert_eq!(backend.generate("x", "", 1.0).unwrap().len(), 4);
    backend.close().unwrap();

    assert!(matches!(
        second.construct("null", BackendConfig::default()),
        Err(SynthesisError::UnknownBackend { .. })
    ));
}

#[test]
fn test_builtin_registry_can_be_extended() {
    let mut registry = BackendRegistry::with_builtin_backends();
    registry.register("null", null_constructor());
    let names: Vec<String> = registry.list_registered_backends().into_iter().collect();
    assert_eq!(names, vec!["kokoro", "kokoro-v1.0", "kokoro-v1.1", "null", "pocket"]);
}
