//! Synthesis command: text in, WAV out.

use super::utils::{format_elapsed, select_voice, truncate};
use crate::settings::Settings;
use anyhow::{anyhow, Context, Result};
use colored::*;
use sonance_core::audio::{read_wav, write_wav};
use sonance_core::{BackendRegistry, SampleBuffer, SynthesisBackend};
use std::time::Instant;

/// Backends that run without a voice bank.
const VOICELESS_BACKENDS: &[&str] = &["pocket"];

/// Print every registered backend name.
pub fn list_backends(registry: &BackendRegistry) {
    println!("{}", "Available backends:".bold());
    for name in registry.list_registered_backends() {
        println!("  {}", name);
    }
}

/// Construct the configured backend, run the request and close the
/// backend, whether or not the request succeeded.
pub fn run(registry: &BackendRegistry, settings: &Settings, text: Option<String>) -> Result<()> {
    let started = Instant::now();
    let mut backend = registry
        .construct(&settings.backend, settings.backend_config())
        .with_context(|| format!("Failed to initialize backend '{}'", settings.backend))?;
    let info = backend.info();
    log::info!(
        "Backend {} ready in {} (languages: {}, {} Hz)",
        info.name,
        format_elapsed(started.elapsed()),
        info.languages.join(", "),
        info.sample_rate
    );

    let result = run_with_backend(backend.as_mut(), settings, text);
    let closed = backend.close().context("Failed to close backend");
    result.and(closed)
}

fn run_with_backend(
    backend: &mut dyn SynthesisBackend,
    settings: &Settings,
    text: Option<String>,
) -> Result<()> {
    if settings.list_voices {
        print_voices(backend, &settings.backend);
        return Ok(());
    }
    let text = text.ok_or_else(|| anyhow!("No input text"))?;

    println!(
        "{} Synthesizing \"{}\" with {}",
        "▶".cyan(),
        truncate(&text, 60).italic(),
        settings.backend.yellow()
    );
    let started = Instant::now();
    let audio = generate(backend, settings, &text)?;
    let elapsed = started.elapsed();
    log::info!(
        "Generated {:.2}s of audio in {}",
        audio.duration_secs(),
        format_elapsed(elapsed)
    );

    write_wav(&settings.output, &audio)
        .with_context(|| format!("Failed to write audio to {}", settings.output.display()))?;
    println!(
        "  {} Saved {:.2}s of audio to {} ({})",
        "✓".green(),
        audio.duration_secs(),
        settings.output.display(),
        format_elapsed(elapsed)
    );
    Ok(())
}

fn generate(backend: &mut dyn SynthesisBackend, settings: &Settings, text: &str) -> Result<SampleBuffer> {
    if let Some(path) = &settings.reference_audio {
        let reference = read_wav(path)
            .with_context(|| format!("Failed to read reference audio: {}", path.display()))?;
        let cloning = backend
            .as_cloning()
            .ok_or_else(|| anyhow!("backend '{}' does not support voice cloning", settings.backend))?;
        log::info!(
            "Cloning voice from {} ({:.2}s)",
            path.display(),
            reference.duration_secs()
        );
        return Ok(cloning.generate_with_reference(text, &reference, settings.speed)?);
    }

    let voice = select_voice(
        settings.voice.as_deref(),
        &backend.list_voices(),
        VOICELESS_BACKENDS.contains(&settings.backend.as_str()),
    )?;
    if settings.voice.is_none() && !voice.is_empty() {
        log::info!("No voice requested, using '{}'", voice);
    }
    Ok(backend.generate(text, &voice, settings.speed)?)
}

fn print_voices(backend: &dyn SynthesisBackend, backend_name: &str) {
    let voices = backend.list_voices();
    if voices.is_empty() {
        println!("{} has no voices", backend_name.yellow());
        return;
    }
    println!("{} ({}):", "Available voices".bold(), voices.len());
    for voice in voices {
        println!("  {}", voice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonance_core::backend::BackendInfo;
    use sonance_core::config::BackendConfig;
    use sonance_core::SynthesisResult;
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct ToneBackend {
        voices: BTreeSet<String>,
        closed: Arc<AtomicBool>,
        fail: bool,
    }

    impl SynthesisBackend for ToneBackend {
        fn generate(&mut self, _text: &str, voice: &str, _speed: f32) -> SynthesisResult<SampleBuffer> {
            if self.fail {
                return Err(sonance_core::SynthesisError::model("tone", "broken"));
            }
            assert_eq!(voice, "af_bella");
            Ok(SampleBuffer::new(vec![0.25; 2400], 24_000))
        }

        fn list_voices(&self) -> BTreeSet<String> {
            self.voices.clone()
        }

        fn info(&self) -> BackendInfo {
            BackendInfo {
                name: "tone".to_string(),
                languages: vec!["en".to_string()],
                sample_rate: 24_000,
            }
        }

        fn close(&mut self) -> SynthesisResult<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn registry(closed: Arc<AtomicBool>, fail: bool) -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        registry.register(
            "tone",
            Box::new(move |_cfg: BackendConfig| {
                Ok(Box::new(ToneBackend {
                    voices: ["af_bella", "bf_emma"].iter().map(|s| s.to_string()).collect(),
                    closed: Arc::clone(&closed),
                    fail,
                }) as Box<dyn SynthesisBackend>)
            }),
        );
        registry
    }

    fn settings(output: PathBuf) -> Settings {
        Settings {
            backend: "tone".to_string(),
            model: PathBuf::from("models/tone"),
            voices: None,
            tokens: None,
            dictionary: None,
            model_variant: Default::default(),
            voice: None,
            speed: 1.0,
            output,
            reference_audio: None,
            log_level: "info".to_string(),
            log_file: None,
            pipeline: Default::default(),
            list_voices: false,
            list_backends: false,
        }
    }

    #[test]
    fn test_writes_wav_and_closes_backend() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out.wav");
        let closed = Arc::new(AtomicBool::new(false));

        run(&registry(Arc::clone(&closed), false), &settings(output.clone()), Some("hi".to_string()))
            .unwrap();

        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(read_wav(&output).unwrap().len(), 2400);
    }

    #[test]
    fn test_failed_request_still_closes_backend() {
        let temp = TempDir::new().unwrap();
        let closed = Arc::new(AtomicBool::new(false));

        let result = run(
            &registry(Arc::clone(&closed), true),
            &settings(temp.path().join("out.wav")),
            Some("hi".to_string()),
        );

        assert!(result.is_err());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_reference_audio_requires_cloning() {
        let temp = TempDir::new().unwrap();
        let reference = temp.path().join("ref.wav");
        write_wav(&reference, &SampleBuffer::new(vec![0.1; 240], 24_000)).unwrap();

        let mut settings = settings(temp.path().join("out.wav"));
        settings.reference_audio = Some(reference);
        let closed = Arc::new(AtomicBool::new(false));

        let err = run(&registry(Arc::clone(&closed), false), &settings, Some("hi".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("does not support voice cloning"));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_unknown_backend_is_reported() {
        let mut settings = settings(PathBuf::from("unused.wav"));
        settings.backend = "piper".to_string();
        let err = run(&BackendRegistry::new(), &settings, Some("hi".to_string())).unwrap_err();
        assert!(format!("{:#}", err).contains("piper"));
    }
}
