pub mod assets;
pub mod config;
pub mod engine;
pub mod error;
pub mod setup;
pub mod tokenizer;

pub use assets::{locate_model_file, load_config, ModelAssets};
pub use config::ModelConfig;
pub use engine::{
    default_engine, default_intra_threads, logits_output, GraphOptimizationLevel,
    InferenceEngine, InferenceSession, InputFeed, SessionOptions, TensorInfo, UnavailableEngine,
};
pub use error::{ModelError, Result};
pub use setup::{Attempt, Capabilities, SetupError, Strategy};
pub use tokenizer::{load_tokenizer, TokenStream, Tokenizer};
