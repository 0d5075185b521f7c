//! The model capability the synthesis layer is written against.
//!
//! A [`Model`] runs one computation graph: named tensors in, named tensors
//! out. Backends never look inside a model beyond the shapes and dtypes they
//! feed it, which keeps the orchestration testable with scripted mocks (see
//! [`crate::testing`]) and lets [`onnx::OnnxModel`] supply the real thing.
//!
//! Tensors are plain owned values. Every tensor a stage builds is dropped
//! when the stage returns, on the error path as well as on success, so no
//! explicit release calls are needed.

pub mod onnx;

use crate::error::{SynthesisError, SynthesisResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Named tensors passed to or returned from a model call.
pub type TensorMap = HashMap<String, Tensor>;

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F32,
    I64,
    Bool,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "float32"),
            DType::I64 => write!(f, "int64"),
            DType::Bool => write!(f, "bool"),
        }
    }
}

/// Owned tensor storage.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    I64(Vec<i64>),
    Bool(Vec<bool>),
}

impl TensorData {
    fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::I64(v) => v.len(),
            TensorData::Bool(v) => v.len(),
        }
    }
}

/// A row-major tensor with a declared shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    /// Create a zero-filled tensor (`false` for bool) of the given shape.
    ///
    /// Shapes with a zero dimension are valid and hold no elements.
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        let len = shape.iter().product();
        let data = match dtype {
            DType::F32 => TensorData::F32(vec![0.0; len]),
            DType::I64 => TensorData::I64(vec![0; len]),
            DType::Bool => TensorData::Bool(vec![false; len]),
        };
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    /// Create an f32 tensor, checking that `data` fills `shape` exactly.
    pub fn from_f32(shape: Vec<usize>, data: Vec<f32>) -> SynthesisResult<Self> {
        Self::new(shape, TensorData::F32(data))
    }

    /// Create an i64 tensor, checking that `data` fills `shape` exactly.
    pub fn from_i64(shape: Vec<usize>, data: Vec<i64>) -> SynthesisResult<Self> {
        Self::new(shape, TensorData::I64(data))
    }

    /// Create a bool tensor, checking that `data` fills `shape` exactly.
    pub fn from_bool(shape: Vec<usize>, data: Vec<bool>) -> SynthesisResult<Self> {
        Self::new(shape, TensorData::Bool(data))
    }

    fn new(shape: Vec<usize>, data: TensorData) -> SynthesisResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(SynthesisError::Tensor(format!(
                "shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        match self.data {
            TensorData::F32(_) => DType::F32,
            TensorData::I64(_) => DType::I64,
            TensorData::Bool(_) => DType::Bool,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            TensorData::I64(v) => Some(v),
            _ => None,
        }
    }

    /// Consume the tensor and return its f32 data.
    pub fn into_f32(self) -> SynthesisResult<Vec<f32>> {
        match self.data {
            TensorData::F32(v) => Ok(v),
            _ => Err(SynthesisError::Tensor(format!(
                "expected float32 tensor, got {}",
                self.dtype()
            ))),
        }
    }

    /// Split into shape and storage.
    pub fn into_parts(self) -> (Vec<usize>, TensorData) {
        (self.shape, self.data)
    }
}

/// One opaque computation graph.
///
/// Implementations must be callable from `&self`. Whether two calls may run
/// at the same time is up to the implementation; [`onnx::OnnxModel`]
/// serializes them behind a mutex, mocks do not care.
pub trait Model: Send + Sync {
    /// Graph name used in logs and error messages.
    fn name(&self) -> &str;

    /// Run the graph.
    ///
    /// # Arguments
    ///
    /// * `inputs` - Map of input names to tensors
    ///
    /// # Returns
    ///
    /// Map of output names to tensors
    fn run(&self, inputs: TensorMap) -> SynthesisResult<TensorMap>;
}

impl<M: Model + ?Sized> Model for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn run(&self, inputs: TensorMap) -> SynthesisResult<TensorMap> {
        (**self).run(inputs)
    }
}

/// Remove a required output from a model result.
pub fn take_output(outputs: &mut TensorMap, name: &str) -> SynthesisResult<Tensor> {
    outputs.remove(name).ok_or_else(|| {
        let mut present: Vec<&String> = outputs.keys().collect();
        present.sort();
        SynthesisError::Tensor(format!("missing output '{}' (got {:?})", name, present))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros_of_every_dtype() {
        let f = Tensor::zeros(&[2, 3], DType::F32);
        assert_eq!(f.len(), 6);
        assert_eq!(f.as_f32().unwrap(), &[0.0; 6]);

        let i = Tensor::zeros(&[1], DType::I64);
        assert_eq!(i.as_i64().unwrap(), &[0]);

        let b = Tensor::zeros(&[1], DType::Bool);
        assert_eq!(b.dtype(), DType::Bool);
        assert_eq!(b.data(), &TensorData::Bool(vec![false]));
    }

    #[test]
    fn test_zero_sized_dimension() {
        let t = Tensor::zeros(&[1, 128, 0], DType::F32);
        assert!(t.is_empty());
        assert_eq!(t.shape(), &[1, 128, 0]);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let result = Tensor::from_f32(vec![2, 2], vec![1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(SynthesisError::Tensor(_))));
    }

    #[test]
    fn test_into_f32_wrong_dtype() {
        let t = Tensor::from_i64(vec![1], vec![7]).unwrap();
        assert!(t.into_f32().is_err());
    }

    #[test]
    fn test_take_output_missing() {
        let mut outputs = TensorMap::new();
        outputs.insert("audio".to_string(), Tensor::zeros(&[1], DType::F32));
        let err = take_output(&mut outputs, "waveform").unwrap_err();
        assert!(err.to_string().contains("waveform"));
        assert!(take_output(&mut outputs, "audio").is_ok());
    }
}
