//! Sonance Core - backend registry and staged synthesis pipelines for ONNX
//! text-to-speech models.
//!
//! ## Module Organization
//!
//! ### Backends
//! - [`backend`] - Calling contract, registry, Kokoro and Pocket backends
//! - [`config`] - Construction-time backend configuration
//!
//! ### Inference
//! - [`runtime`] - Named-tensor model abstraction and the ONNX session wrapper
//!
//! ### Assets
//! - [`voice`] - Voice embedding banks (npz, npy directories, flat binaries)
//! - [`tokenizer`] - Character and longest-match tokenizers
//! - [`text`] - English text normalization
//! - [`phonemizer`] - CMU dictionary phonemes for the legacy Kokoro model
//! - [`audio`] - Sample buffers and WAV I/O
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use sonance_core::prelude::*;
//!
//! let registry = BackendRegistry::with_builtin_backends();
//! let mut backend = registry.construct("kokoro-v1.0", BackendConfig::new("models/kokoro-v1.0"))?;
//! let audio = backend.generate("Hello there.", "af_bella", 1.0)?;
//! write_wav("hello.wav", &audio)?;
//! backend.close()?;
//! ```

// ============================================================================
// Backends
// ============================================================================

/// Backend contract, registry and model families
pub mod backend;

/// Backend configuration
pub mod config;

// ============================================================================
// Inference
// ============================================================================

/// Model abstraction and ONNX Runtime sessions
pub mod runtime;

// ============================================================================
// Assets & Signal
// ============================================================================

/// Sample buffers and WAV files
pub mod audio;

/// Text normalization
pub mod text;

/// English grapheme-to-phoneme conversion
pub mod phonemizer;

/// Tokenizers
pub mod tokenizer;

/// Voice embedding banks
pub mod voice;

// ============================================================================
// Errors & Utilities
// ============================================================================

/// Error types
pub mod error;

/// Common imports
pub mod prelude;

/// Mocks and fixtures for tests without model files
#[doc(hidden)]
pub mod testing;

pub use audio::SampleBuffer;
pub use backend::{BackendRegistry, SynthesisBackend, VoiceCloning};
pub use config::BackendConfig;
pub use error::{SynthesisError, SynthesisResult};
