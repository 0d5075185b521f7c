//! ONNX Runtime implementation of the [`Model`] capability.
//!
//! Each [`OnnxModel`] owns one `ort` session. Output names are declared by the
//! caller when the model is loaded, the same way backends declare the graph
//! signature they expect.
//!
//! ```rust,no_run
//! use sonance_core::runtime::onnx::OnnxModel;
//!
//! let decoder = OnnxModel::load("decoder", "models/pocket/decoder.onnx", &["audio_frame"])?;
//! # Ok::<(), sonance_core::SynthesisError>(())
//! ```

use super::{Model, Tensor, TensorData, TensorMap};
use crate::error::{SynthesisError, SynthesisResult};
use ndarray::{ArrayD, IxDyn};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputValue, SessionInputs};
use ort::value::{DynValue, Tensor as OrtTensor};
use std::borrow::Cow;
use std::path::Path;
use std::sync::Mutex;

/// A model backed by an ONNX Runtime session.
///
/// The session is wrapped in a `Mutex`, so concurrent `run` calls on the same
/// instance are serialized rather than rejected.
pub struct OnnxModel {
    name: String,
    session: Mutex<Session>,
    output_names: Vec<String>,
}

impl OnnxModel {
    /// Load a model file.
    ///
    /// # Arguments
    ///
    /// * `name` - Graph name used in logs and errors
    /// * `path` - Path to the `.onnx` file
    /// * `output_names` - Outputs to extract after each run
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file is missing and `Config` if ONNX Runtime
    /// rejects it.
    pub fn load<S: AsRef<str>>(
        name: &str,
        path: impl AsRef<Path>,
        output_names: &[S],
    ) -> SynthesisResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SynthesisError::Io(format!(
                "model file not found: {}",
                path.display()
            )));
        }

        // Initialize ONNX Runtime environment (singleton, safe to call multiple times)
        let _ = ort::init().commit();

        let session = Session::builder()
            .map_err(|e| {
                SynthesisError::Config(format!("failed to create session builder: {}", e))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                SynthesisError::Config(format!("failed to set optimization level: {}", e))
            })?
            .commit_from_file(path)
            .map_err(|e| {
                SynthesisError::Config(format!(
                    "failed to load {} from {}: {}",
                    name,
                    path.display(),
                    e
                ))
            })?;

        log::info!("Loaded ONNX model '{}' from {}", name, path.display());

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            output_names: output_names.iter().map(|s| s.as_ref().to_string()).collect(),
        })
    }

    fn to_value(name: &str, tensor: Tensor) -> SynthesisResult<DynValue> {
        let (shape, data) = tensor.into_parts();
        let dims = IxDyn(&shape);
        let convert_err =
            |e: String| SynthesisError::Tensor(format!("input '{}': {}", name, e));

        let value = match data {
            TensorData::F32(v) => {
                let arr = ArrayD::from_shape_vec(dims, v).map_err(|e| convert_err(e.to_string()))?;
                OrtTensor::from_array(arr)
                    .map_err(|e| convert_err(e.to_string()))?
                    .into_dyn()
            }
            TensorData::I64(v) => {
                let arr = ArrayD::from_shape_vec(dims, v).map_err(|e| convert_err(e.to_string()))?;
                OrtTensor::from_array(arr)
                    .map_err(|e| convert_err(e.to_string()))?
                    .into_dyn()
            }
            TensorData::Bool(v) => {
                let arr = ArrayD::from_shape_vec(dims, v).map_err(|e| convert_err(e.to_string()))?;
                OrtTensor::from_array(arr)
                    .map_err(|e| convert_err(e.to_string()))?
                    .into_dyn()
            }
        };
        Ok(value)
    }
}

fn to_dims(shape: &[i64]) -> Vec<usize> {
    shape.iter().map(|&d| d.max(0) as usize).collect()
}

impl Model for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, inputs: TensorMap) -> SynthesisResult<TensorMap> {
        let ort_inputs: Vec<(Cow<'_, str>, SessionInputValue<'_>)> = inputs
            .into_iter()
            .map(|(name, tensor)| {
                let value = Self::to_value(&name, tensor)?;
                Ok((Cow::Owned(name), value.into()))
            })
            .collect::<SynthesisResult<_>>()?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| SynthesisError::model(&self.name, format!("session lock poisoned: {}", e)))?;

        let outputs = session
            .run(SessionInputs::from(ort_inputs))
            .map_err(|e| SynthesisError::model(&self.name, e.to_string()))?;

        let mut result = TensorMap::new();
        for output_name in &self.output_names {
            let value = outputs.get(output_name.as_str()).ok_or_else(|| {
                SynthesisError::model(&self.name, format!("missing output '{}'", output_name))
            })?;

            // Try f32 first, then i64, then bool
            let tensor = if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
                Tensor::from_f32(to_dims(shape), data.to_vec())?
            } else if let Ok((shape, data)) = value.try_extract_tensor::<i64>() {
                Tensor::from_i64(to_dims(shape), data.to_vec())?
            } else if let Ok((shape, data)) = value.try_extract_tensor::<bool>() {
                Tensor::from_bool(to_dims(shape), data.to_vec())?
            } else {
                return Err(SynthesisError::model(
                    &self.name,
                    format!(
                        "output '{}' has an unsupported element type (expected f32, i64 or bool)",
                        output_name
                    ),
                ));
            };

            result.insert(output_name.clone(), tensor);
        }

        Ok(result)
    }
}
