//! Mock implementations for testing.
//!
//! Provides a scripted [`Model`] that can stand in for any graph, so the
//! pipelines can be exercised without real model files.

use crate::error::{SynthesisError, SynthesisResult};
use crate::runtime::{Model, Tensor, TensorMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-call behavior: receives the inputs and the 0-based call index.
pub type MockFn = Box<dyn Fn(&TensorMap, usize) -> SynthesisResult<TensorMap> + Send + Sync>;

/// Types of mock outputs
pub enum MockOutput {
    /// Return the same tensors on every call
    Fixed(TensorMap),
    /// Compute outputs from the inputs and call index
    Scripted(MockFn),
}

/// A mock model that returns configurable outputs.
///
/// This mock can be configured to:
/// - Return fixed output tensors
/// - Compute outputs per call with a closure
/// - Track how many times it was called
/// - Simulate errors
///
/// # Example
///
/// ```rust,ignore
/// use sonance_core::testing::MockModel;
///
/// let decoder = MockModel::with_output("decoder", "audio_frame", tensor);
/// let calls = decoder.call_counter();
/// let outputs = decoder.run(inputs)?;
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
/// ```
pub struct MockModel {
    name: String,
    output: MockOutput,
    /// Number of times run() was called
    call_count: Arc<AtomicUsize>,
    /// Whether to simulate an error
    simulate_error: Option<String>,
}

impl MockModel {
    /// Create a mock returning a single named tensor.
    pub fn with_output(name: impl Into<String>, output_name: &str, tensor: Tensor) -> Self {
        let mut outputs = TensorMap::new();
        outputs.insert(output_name.to_string(), tensor);
        Self::with_outputs(name, outputs)
    }

    /// Create a mock returning a fixed set of tensors.
    pub fn with_outputs(name: impl Into<String>, outputs: TensorMap) -> Self {
        Self {
            name: name.into(),
            output: MockOutput::Fixed(outputs),
            call_count: Arc::new(AtomicUsize::new(0)),
            simulate_error: None,
        }
    }

    /// Create a mock whose outputs are computed per call.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&TensorMap, usize) -> SynthesisResult<TensorMap> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            output: MockOutput::Scripted(Box::new(f)),
            call_count: Arc::new(AtomicUsize::new(0)),
            simulate_error: None,
        }
    }

    /// Configure the mock to simulate an error.
    pub fn with_error(mut self, error_message: impl Into<String>) -> Self {
        self.simulate_error = Some(error_message.into());
        self
    }

    /// Get the number of times run() was called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Shared handle to the call counter, usable after the mock is boxed.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.call_count)
    }
}

impl Model for MockModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, inputs: TensorMap) -> SynthesisResult<TensorMap> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(ref error) = self.simulate_error {
            return Err(SynthesisError::model(&self.name, error.clone()));
        }

        match &self.output {
            MockOutput::Fixed(outputs) => Ok(outputs.clone()),
            MockOutput::Scripted(f) => f(&inputs, call),
        }
    }
}
