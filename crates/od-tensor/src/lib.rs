//! `od-tensor` - Host tensors exchanged with the inference engine for onnx-decode.
//!
//! This crate provides:
//! - A `Tensor` type holding contiguous row-major data with a shape
//! - Element storage for the integer inputs and floating-point logits
//! - Shape utilities (rank, element count, row slicing)
//! - Data type definitions (I64, F32, F16)
//!
//! No arithmetic lives here: every computation is delegated to the engine.

pub mod dtype;
pub mod error;
pub mod shape;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use dtype::DType;
pub use error::{Result, TensorError};
pub use shape::Shape;
pub use storage::CpuStorage;
pub use tensor::Tensor;
