use thiserror::Error;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("data length {len} does not match shape {shape:?} (numel={numel})")]
    LengthMismatch {
        len: usize,
        shape: Vec<usize>,
        numel: usize,
    },
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: String, got: String },
    #[error("invalid axis {axis} for tensor with {ndim} dimensions")]
    InvalidAxis { axis: usize, ndim: usize },
    #[error("negative dimension {0} in concrete shape")]
    NegativeDim(i64),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;
