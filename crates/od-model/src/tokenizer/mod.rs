//! Text <-> token id conversion.
//!
//! The runtime talks to a [`Tokenizer`] trait object. Two implementations
//! exist: [`hf::HfTokenizer`] over a HuggingFace `tokenizer.json` (feature
//! `hf-tokenizer`) and [`vocab::VocabTokenizer`], a lossy whitespace and
//! character mapper over a flat `vocab.json`.

#[cfg(feature = "hf-tokenizer")]
pub mod hf;
pub mod vocab;

use std::path::Path;

use tracing::{info, warn};

use crate::error::Result;
use crate::setup::{first_success, Capabilities, Strategy};

pub use vocab::{Vocab, VocabTokenizer, DEFAULT_UNK_TOKEN};

/// File name of a HuggingFace tokenizer definition.
pub const TOKENIZER_JSON: &str = "tokenizer.json";
/// File name of the flat `token -> id` vocabulary used by the fallback.
pub const VOCAB_JSON: &str = "vocab.json";

/// Converts between text and token ids.
pub trait Tokenizer: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Encode text into token ids.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode token ids into text, special tokens included.
    fn decode(&self, ids: &[u32]) -> Result<String>;

    /// Decode while dropping special tokens.
    ///
    /// Returns `None` when the tokenizer has no notion of special tokens; the
    /// caller should use [`Tokenizer::decode`] instead.
    fn decode_skip_special(&self, _ids: &[u32]) -> Option<Result<String>> {
        None
    }

    /// Id of an exact token string, if the vocabulary has it.
    fn token_to_id(&self, token: &str) -> Option<u32>;

    /// Start decoding a sequence one id at a time.
    fn decode_stream(&self, skip_special_tokens: bool) -> Box<dyn TokenStream + '_>;
}

/// Incremental decoder over a growing id sequence.
pub trait TokenStream {
    /// Push the next id and return the text it completes. `None` means the
    /// id only carries part of a character so far.
    fn step(&mut self, id: u32) -> Result<Option<String>>;
}

/// Resolve a tokenizer from the assets in `dir`.
///
/// Strategies, in order:
/// 1. `hf-tokenizer-json`: `tokenizer.json`, only when `caps.hf_tokenizer`.
/// 2. `vocab-json`: the [`VocabTokenizer`] fallback over `vocab.json`.
pub fn load_tokenizer(dir: &Path, caps: &Capabilities) -> Result<Box<dyn Tokenizer>> {
    let mut strategies: Vec<Strategy<'_, Box<dyn Tokenizer>>> = Vec::new();
    if caps.hf_tokenizer {
        strategies.push(Strategy::new("hf-tokenizer-json", || {
            load_hf(&dir.join(TOKENIZER_JSON))
        }));
    }
    strategies.push(Strategy::new("vocab-json", || {
        let tokenizer = VocabTokenizer::from_file(&dir.join(VOCAB_JSON))?;
        Ok(Box::new(tokenizer) as Box<dyn Tokenizer>)
    }));

    let (strategy, tokenizer) = first_success("tokenizer", strategies)?;
    if caps.hf_tokenizer && strategy == "vocab-json" {
        warn!("falling back to the vocabulary tokenizer; decoding is lossy");
    }
    info!(strategy = %strategy, tokenizer = tokenizer.name(), "tokenizer loaded");
    Ok(tokenizer)
}

#[cfg(feature = "hf-tokenizer")]
fn load_hf(path: &Path) -> Result<Box<dyn Tokenizer>> {
    Ok(Box::new(hf::HfTokenizer::from_file(path)?))
}

#[cfg(not(feature = "hf-tokenizer"))]
fn load_hf(_path: &Path) -> Result<Box<dyn Tokenizer>> {
    Err(crate::error::ModelError::TokenizerError(
        "built without the hf-tokenizer feature".to_string(),
    ))
}
