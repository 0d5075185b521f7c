//! Error types for synthesis operations.
//!
//! Every failure surfaced by the library is a [`SynthesisError`]. Model
//! failures are tagged with the pipeline stage that issued the call so the
//! caller can tell `lm_main` timing out from the decoder rejecting a shape.

use thiserror::Error;

/// Errors that can occur while loading backends or synthesizing speech.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Bad paths, flags or config values.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File or directory could not be read or written.
    #[error("I/O error: {0}")]
    Io(String),

    /// Voice bank, vocabulary or audio asset is malformed.
    #[error("Format error: {0}")]
    Format(String),

    /// Requested voice is not present in the store.
    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    /// Requested backend has no registered constructor.
    #[error("Unknown backend '{name}' (registered: {})", available.join(", "))]
    UnknownBackend { name: String, available: Vec<String> },

    /// A model call failed or returned something the stage could not use.
    #[error("Model execution failed in {stage}: {message}")]
    ModelExecution { stage: String, message: String },

    /// Tokenization produced no tokens.
    #[error("Tokenization produced no tokens")]
    EmptyInput,

    /// Tensor data does not match its declared shape or dtype.
    #[error("Tensor error: {0}")]
    Tensor(String),
}

/// Result alias used throughout the crate.
pub type SynthesisResult<T> = Result<T, SynthesisError>;

impl SynthesisError {
    /// Build a model execution error for `stage`.
    pub fn model(stage: impl Into<String>, message: impl Into<String>) -> Self {
        SynthesisError::ModelExecution {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Wrap this error with the name of the stage it surfaced from.
    ///
    /// Already-wrapped errors keep their message and get the outer stage
    /// prepended, e.g. `synthesize/lm_main`. Wrapping with the stage the
    /// error already names is a no-op.
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            SynthesisError::ModelExecution { stage: inner, message }
                if inner == stage || inner.starts_with(&format!("{}/", stage)) =>
            {
                SynthesisError::ModelExecution {
                    stage: inner,
                    message,
                }
            }
            SynthesisError::ModelExecution { stage: inner, message } => {
                SynthesisError::ModelExecution {
                    stage: format!("{}/{}", stage, inner),
                    message,
                }
            }
            other => SynthesisError::ModelExecution {
                stage: stage.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Returns true when the error should abort process startup rather than
    /// a single request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SynthesisError::Config(_) | SynthesisError::Io(_) | SynthesisError::Format(_)
        )
    }
}

impl From<std::io::Error> for SynthesisError {
    fn from(err: std::io::Error) -> Self {
        SynthesisError::Io(err.to_string())
    }
}

impl From<hound::Error> for SynthesisError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => SynthesisError::Io(e.to_string()),
            other => SynthesisError::Format(format!("WAV: {}", other)),
        }
    }
}

impl From<zip::result::ZipError> for SynthesisError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => SynthesisError::Io(e.to_string()),
            other => SynthesisError::Format(format!("zip archive: {}", other)),
        }
    }
}

impl From<serde_json::Error> for SynthesisError {
    fn from(err: serde_json::Error) -> Self {
        SynthesisError::Format(format!("JSON: {}", err))
    }
}
