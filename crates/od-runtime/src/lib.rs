//! `od-runtime` - Greedy text generation against an exported checkpoint.
//!
//! Loads the model directory through `od-model`, builds the per-step input
//! feed, and runs the arg-max decode loop until the stop token or the token
//! budget is reached.

pub mod chat;
pub mod decode;
pub mod error;
pub mod feed;
pub mod runtime;

pub use chat::{clean_fragment, ChatMessage, ChatRole, Conversation};
pub use decode::{select_logits, StopReason};
pub use error::{Result, RuntimeError};
pub use feed::{build_feed, InputRole};
pub use runtime::{GenerateParams, GenerationResult, Runtime, RuntimeOptions};
