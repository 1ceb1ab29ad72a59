//! HuggingFace tokenizer wrapper (uses the `tokenizers` crate).

use std::path::Path;

use tokenizers::{
    DecoderWrapper, ModelWrapper, NormalizerWrapper, PostProcessorWrapper, PreTokenizerWrapper,
};

use crate::error::{ModelError, Result};
use super::{TokenStream, Tokenizer};

/// Any tokenizer loadable from a HuggingFace `tokenizer.json`: BPE,
/// SentencePiece, WordPiece, etc.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    /// Load from a `tokenizer.json` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ModelError::MissingAsset {
                asset: "tokenizer definition",
                path: path.to_path_buf(),
            });
        }
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            ModelError::TokenizerError(format!(
                "failed to load tokenizer file {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self { inner })
    }
}

impl Tokenizer for HfTokenizer {
    fn name(&self) -> &str {
        "huggingface"
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| ModelError::TokenizerError(format!("encode failed: {}", e)))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, false)
            .map_err(|e| ModelError::TokenizerError(format!("decode failed: {}", e)))
    }

    fn decode_skip_special(&self, ids: &[u32]) -> Option<Result<String>> {
        Some(
            self.inner
                .decode(ids, true)
                .map_err(|e| ModelError::TokenizerError(format!("decode failed: {}", e))),
        )
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.inner.token_to_id(token)
    }

    fn decode_stream(&self, skip_special_tokens: bool) -> Box<dyn TokenStream + '_> {
        Box::new(HfTokenStream {
            inner: self.inner.decode_stream(skip_special_tokens),
        })
    }
}

/// Holds back byte-level pieces until they form whole characters.
struct HfTokenStream<'a> {
    inner: tokenizers::DecodeStream<
        'a,
        ModelWrapper,
        NormalizerWrapper,
        PreTokenizerWrapper,
        PostProcessorWrapper,
        DecoderWrapper,
    >,
}

impl TokenStream for HfTokenStream<'_> {
    fn step(&mut self, id: u32) -> Result<Option<String>> {
        self.inner
            .step(id)
            .map_err(|e| ModelError::TokenizerError(format!("stream decode failed: {}", e)))
    }
}
