use od_model::ModelError;
use od_tensor::{Shape, TensorError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("setup failed: {0}")]
    Setup(#[source] ModelError),
    #[error("unexpected logits shape {0}: expected rank 3 or 2 with a non-empty last row")]
    LogitsShape(Shape),
    #[error("inference failed: {0}")]
    Inference(#[source] ModelError),
    #[error("tokenizer failed: {0}")]
    Tokenizer(#[source] ModelError),
    /// Building or slicing a host tensor failed. Shapes are derived from the
    /// data they describe, so this indicates a bug rather than bad input.
    #[error("internal tensor error: {0}")]
    Tensor(#[from] TensorError),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
