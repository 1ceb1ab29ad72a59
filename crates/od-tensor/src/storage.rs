use half::f16;

use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// CPU-side tensor storage.
///
/// Only the two element types the decode loop exchanges with the engine are
/// stored: integer inputs and floating-point logits. Half-precision data is
/// widened to F32 on construction.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    /// 64-bit signed integer storage.
    I64(Vec<i64>),
    /// 32-bit floating point storage.
    F32(Vec<f32>),
}

impl CpuStorage {
    /// Number of elements in this storage.
    pub fn len(&self) -> usize {
        match self {
            CpuStorage::I64(v) => v.len(),
            CpuStorage::F32(v) => v.len(),
        }
    }

    /// Returns true if the storage contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the data as an i64 slice.
    ///
    /// # Errors
    /// Returns an error if the storage is not I64.
    pub fn as_i64_slice(&self) -> Result<&[i64]> {
        match self {
            CpuStorage::I64(v) => Ok(v.as_slice()),
            other => Err(mismatch(DType::I64, other.dtype())),
        }
    }

    /// Returns the data as an f32 slice.
    ///
    /// # Errors
    /// Returns an error if the storage is not F32.
    pub fn as_f32_slice(&self) -> Result<&[f32]> {
        match self {
            CpuStorage::F32(v) => Ok(v.as_slice()),
            other => Err(mismatch(DType::F32, other.dtype())),
        }
    }

    /// Create storage from an i64 vector.
    pub fn from_i64_vec(data: Vec<i64>) -> Self {
        CpuStorage::I64(data)
    }

    /// Create storage from an f32 vector.
    pub fn from_f32_vec(data: Vec<f32>) -> Self {
        CpuStorage::F32(data)
    }

    /// Create F32 storage by widening half-precision values.
    pub fn from_f16_slice(data: &[f16]) -> Self {
        CpuStorage::F32(data.iter().map(|v| v.to_f32()).collect())
    }

    /// Returns the dtype of this storage.
    pub fn dtype(&self) -> DType {
        match self {
            CpuStorage::I64(_) => DType::I64,
            CpuStorage::F32(_) => DType::F32,
        }
    }
}

fn mismatch(expected: DType, got: DType) -> TensorError {
    TensorError::DTypeMismatch {
        expected: expected.to_string(),
        got: got.to_string(),
    }
}
