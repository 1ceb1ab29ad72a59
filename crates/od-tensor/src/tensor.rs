use half::f16;

use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::CpuStorage;

/// A tensor backed by CPU storage.
///
/// Holds contiguous, row-major data with an associated shape. The dtype is
/// the dtype of the storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    storage: CpuStorage,
    shape: Shape,
}

impl Tensor {
    /// Create a tensor from storage and a shape.
    ///
    /// # Errors
    /// Returns `LengthMismatch` if `storage.len() != shape.numel()`.
    pub fn new(storage: CpuStorage, shape: Shape) -> Result<Self> {
        if storage.len() != shape.numel() {
            return Err(TensorError::LengthMismatch {
                len: storage.len(),
                shape: shape.dims().to_vec(),
                numel: shape.numel(),
            });
        }
        Ok(Tensor { storage, shape })
    }

    /// Create an i64 tensor.
    pub fn from_i64(data: Vec<i64>, shape: Shape) -> Result<Self> {
        Self::new(CpuStorage::from_i64_vec(data), shape)
    }

    /// Create an f32 tensor.
    pub fn from_f32(data: Vec<f32>, shape: Shape) -> Result<Self> {
        Self::new(CpuStorage::from_f32_vec(data), shape)
    }

    /// Create an f32 tensor by widening half-precision data.
    pub fn from_f16(data: &[f16], shape: Shape) -> Result<Self> {
        Self::new(CpuStorage::from_f16_slice(data), shape)
    }

    /// Create an i64 tensor with every element set to `value`.
    pub fn filled_i64(value: i64, shape: Shape) -> Self {
        let n = shape.numel();
        Tensor {
            storage: CpuStorage::from_i64_vec(vec![value; n]),
            shape,
        }
    }

    /// Returns a reference to the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Returns the underlying data as an i64 slice.
    pub fn data_i64(&self) -> Result<&[i64]> {
        self.storage.as_i64_slice()
    }

    /// Returns the underlying data as an f32 slice.
    pub fn data_f32(&self) -> Result<&[f32]> {
        self.storage.as_f32_slice()
    }

    /// Returns the underlying storage reference.
    pub fn storage(&self) -> &CpuStorage {
        &self.storage
    }

    /// Split the tensor into its shape and storage.
    pub fn into_parts(self) -> (Shape, CpuStorage) {
        (self.shape, self.storage)
    }

    /// Borrow the f32 vector along the last axis at the given leading indices.
    ///
    /// `index` must name one position in every axis except the last. For a
    /// `[batch, seq, vocab]` tensor, `lane_f32(&[0, seq - 1])` is the vocabulary
    /// row of the final position in the first batch entry.
    pub fn lane_f32(&self, index: &[usize]) -> Result<&[f32]> {
        let ndim = self.shape.ndim();
        if ndim == 0 || index.len() != ndim - 1 {
            return Err(TensorError::InvalidAxis {
                axis: index.len(),
                ndim,
            });
        }
        let strides = self.shape.strides();
        let mut offset = 0usize;
        for (axis, (&i, &stride)) in index.iter().zip(strides.iter()).enumerate() {
            if i >= self.shape.dim(axis) {
                return Err(TensorError::Other(format!(
                    "index {} out of range for axis {} of shape {}",
                    i, axis, self.shape
                )));
            }
            offset += i * stride;
        }
        let width = self.shape.dim(ndim - 1);
        let data = self.data_f32()?;
        Ok(&data[offset..offset + width])
    }
}
