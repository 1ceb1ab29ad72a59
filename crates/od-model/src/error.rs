use std::path::PathBuf;

use thiserror::Error;

use crate::setup::SetupError;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed JSON document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{asset} not found: {}", .path.display())]
    MissingAsset { asset: &'static str, path: PathBuf },
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("tokenizer error: {0}")]
    TokenizerError(String),
    #[error("engine error: {0}")]
    EngineError(String),
    #[error("inference engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("tensor error: {0}")]
    TensorError(#[from] od_tensor::TensorError),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
