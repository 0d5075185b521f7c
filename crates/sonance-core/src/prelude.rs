//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use sonance_core::prelude::*;
//! ```
//!
//! # What's Included
//!
//! - [`BackendRegistry`], [`SynthesisBackend`], [`VoiceCloning`] - Backend construction and use
//! - [`BackendConfig`], [`ModelVariant`] - Construction-time settings
//! - [`SampleBuffer`], [`read_wav`], [`write_wav`] - Audio in and out
//! - [`SynthesisError`], [`SynthesisResult`] - Errors

pub use crate::audio::{read_wav, write_wav, SampleBuffer, SAMPLE_RATE};
pub use crate::backend::{BackendInfo, BackendRegistry, SynthesisBackend, VoiceCloning};
pub use crate::config::{BackendConfig, ModelVariant};
pub use crate::error::{SynthesisError, SynthesisResult};
