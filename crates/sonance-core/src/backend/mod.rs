//! Synthesis backends.
//!
//! Every model family implements [`SynthesisBackend`]. Families that can
//! clone a voice from reference audio also implement [`VoiceCloning`] and
//! expose it through [`SynthesisBackend::as_cloning`]; callers probe for it
//! explicitly instead of assuming it.
//!
//! ```text
//! BackendRegistry::construct(name, config)
//!        ↓
//!   Box<dyn SynthesisBackend> ── as_cloning() ──→ Option<&mut dyn VoiceCloning>
//!        ↓
//!   generate(text, voice, speed) → SampleBuffer
//! ```

pub mod kokoro;
pub mod pocket;
pub mod registry;

pub use kokoro::{KokoroBackend, KokoroVariant};
pub use pocket::PocketBackend;
pub use registry::{BackendConstructor, BackendRegistry};

use crate::audio::SampleBuffer;
use crate::error::SynthesisResult;
use std::collections::BTreeSet;

/// Static description of a constructed backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub name: String,
    /// Language codes, preferred language first.
    pub languages: Vec<String>,
    pub sample_rate: u32,
}

/// The calling contract shared by every backend.
///
/// Requests on one backend run sequentially (`&mut self`). A backend may be
/// moved to another thread between requests.
pub trait SynthesisBackend: Send {
    /// Synthesize `text` with the named voice.
    ///
    /// # Arguments
    ///
    /// * `text` - Input text
    /// * `voice` - Voice name from [`list_voices`](Self::list_voices); may be
    ///   empty for backends with a default voice
    /// * `speed` - Speaking rate multiplier (1.0 = normal)
    fn generate(&mut self, text: &str, voice: &str, speed: f32) -> SynthesisResult<SampleBuffer>;

    /// Names accepted by [`generate`](Self::generate).
    fn list_voices(&self) -> BTreeSet<String>;

    fn info(&self) -> BackendInfo;

    /// Release model sessions. The backend must not be used afterwards.
    fn close(&mut self) -> SynthesisResult<()>;

    /// The voice cloning extension, if this backend supports it.
    fn as_cloning(&mut self) -> Option<&mut dyn VoiceCloning> {
        None
    }
}

/// Optional extension for backends that clone voices from reference audio.
pub trait VoiceCloning {
    /// Synthesize `text` in the voice of `reference`.
    fn generate_with_reference(
        &mut self,
        text: &str,
        reference: &SampleBuffer,
        speed: f32,
    ) -> SynthesisResult<SampleBuffer>;

    /// Encode `reference` and store it under `name`, replacing any voice
    /// already registered under that name.
    fn register_voice(&mut self, name: &str, reference: &SampleBuffer) -> SynthesisResult<()>;

    /// Set the voice used when no named voice is requested, or clear it
    /// with `None`.
    fn set_default_reference(&mut self, reference: Option<&SampleBuffer>) -> SynthesisResult<()>;
}
