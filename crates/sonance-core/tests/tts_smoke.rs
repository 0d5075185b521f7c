//! Smoke tests against real model files.
//!
//! Set `SONANCE_MODELS_DIR` to a directory containing `kokoro-v1.0/` and/or
//! `pocket/` and run with `cargo test -- --ignored`. Tests whose models
//! are missing return early.

use sonance_core::audio::{read_wav, write_wav};
use sonance_core::{BackendConfig, BackendRegistry};
use std::path::PathBuf;

fn model_dir(name: &str) -> Option<PathBuf> {
    let root = PathBuf::from(std::env::var_os("SONANCE_MODELS_DIR")?);
    let dir = root.join(name);
    if dir.exists() {
        Some(dir)
    } else {
        None
    }
}

#[test]
#[ignore = "requires model files under SONANCE_MODELS_DIR"]
fn test_kokoro_v1_synthesizes_speech() {
    let Some(dir) = model_dir("kokoro-v1.0") else {
        eprintln!("Skipping test: kokoro-v1.0 models not found");
        return;
    };

    let registry = BackendRegistry::with_builtin_backends();
    let mut backend = registry
        .construct("kokoro-v1.0", BackendConfig::new(&dir))
        .expect("Failed to construct kokoro-v1.0");

    let voice = backend
        .list_voices()
        .into_iter()
        .next()
        .expect("voice bank is empty");
    let audio = backend
        .generate("Hello from the smoke test.", &voice, 1.0)
        .expect("Failed to synthesize");
    backend.close().expect("Failed to close");

    println!("{} samples ({:.2}s) with voice {}", audio.len(), audio.duration_secs(), voice);
    assert!(audio.duration_secs() > 0.2);
    assert!(audio.samples.iter().all(|s| s.is_finite()));
}

#[test]
#[ignore = "requires model files under SONANCE_MODELS_DIR"]
fn test_pocket_clones_reference_voice() {
    let Some(dir) = model_dir("pocket") else {
        eprintln!("Skipping test: pocket models not found");
        return;
    };

    let registry = BackendRegistry::with_builtin_backends();
    let mut backend = registry
        .construct("pocket", BackendConfig::new(&dir))
        .expect("Failed to construct pocket");

    let reference = sonance_core::SampleBuffer::new(
        sonance_core::testing::sine_wave(24_000, 220.0, 1.0),
        24_000,
    );
    let cloning = backend.as_cloning().expect("pocket supports cloning");
    cloning
        .register_voice("tone", &reference)
        .expect("Failed to register voice");

    let audio = backend
        .generate("Testing one two three.", "tone", 1.0)
        .expect("Failed to synthesize");
    backend.close().expect("Failed to close");
    assert!(!audio.is_empty());

    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("pocket.wav");
    write_wav(&path, &audio).expect("Failed to write wav");
    let loaded = read_wav(&path).expect("Failed to read wav back");
    assert_eq!(loaded.len(), audio.len());
}
