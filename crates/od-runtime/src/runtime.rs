use std::path::{Path, PathBuf};
use std::time::Instant;

use od_model::{
    load_tokenizer, logits_output, Capabilities, InferenceEngine, InferenceSession, ModelAssets,
    ModelConfig, ModelError, SessionOptions, Tokenizer,
};
use od_sampler::SamplerChain;
use tracing::{debug, info};

use crate::decode::{Decoder, StopReason};
use crate::error::{Result, RuntimeError};

/// Knobs fixed when the runtime is created.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Model file to use instead of searching the directory. Relative paths
    /// are taken from the model directory. Setup fails if it does not exist.
    pub model_file: Option<PathBuf>,
    pub session: SessionOptions,
    pub capabilities: Capabilities,
}

/// Per-call generation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateParams {
    pub max_new_tokens: usize,
    /// Overrides the configured `eos_token_id`.
    pub stop_token_id: Option<u32>,
    /// Drop special tokens from the decoded text when the tokenizer can.
    pub skip_special_tokens: bool,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 64,
            stop_token_id: None,
            skip_special_tokens: true,
        }
    }
}

/// Outcome of one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    /// Prompt tokens followed by the generated ones.
    pub tokens: Vec<u32>,
    pub prompt_len: usize,
    /// Decoded text of `tokens`.
    pub text: String,
    pub stop_reason: StopReason,
}

impl GenerationResult {
    /// Tokens appended after the prompt.
    pub fn new_tokens(&self) -> &[u32] {
        &self.tokens[self.prompt_len..]
    }
}

/// A loaded checkpoint ready for greedy generation.
///
/// Owns the configuration, the tokenizer and the engine session. `generate`
/// takes `&self`; every call owns its own token sequence.
pub struct Runtime {
    config: ModelConfig,
    tokenizer: Box<dyn Tokenizer>,
    session: Box<dyn InferenceSession>,
    logits_output: String,
    sampler: SamplerChain,
}

impl Runtime {
    /// Load everything needed from `dir`.
    ///
    /// Resolves the model file, reads `config.json`, picks a tokenizer and
    /// opens an engine session, in that order. Any failure is a
    /// [`RuntimeError::Setup`].
    pub fn from_dir(
        dir: &Path,
        engine: &dyn InferenceEngine,
        options: &RuntimeOptions,
    ) -> Result<Self> {
        let start = Instant::now();
        let assets =
            ModelAssets::resolve(dir, options.model_file.as_deref()).map_err(RuntimeError::Setup)?;
        let tokenizer =
            load_tokenizer(dir, &options.capabilities).map_err(RuntimeError::Setup)?;
        let session = engine
            .create_session(&assets.model_file, &options.session)
            .map_err(RuntimeError::Setup)?;

        let runtime = Self::from_parts(assets.config, tokenizer, session)?;
        info!(
            engine = engine.name(),
            tokenizer = runtime.tokenizer.name(),
            logits = %runtime.logits_output,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "runtime ready"
        );
        Ok(runtime)
    }

    /// Assemble a runtime from already loaded parts.
    pub fn from_parts(
        config: ModelConfig,
        tokenizer: Box<dyn Tokenizer>,
        session: Box<dyn InferenceSession>,
    ) -> Result<Self> {
        let logits_output = logits_output(session.outputs())
            .map(|o| o.name.clone())
            .ok_or_else(|| {
                RuntimeError::Setup(ModelError::Other("model declares no outputs".to_string()))
            })?;
        Ok(Self {
            config,
            tokenizer,
            session,
            logits_output,
            sampler: SamplerChain::greedy(),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    pub fn session(&self) -> &dyn InferenceSession {
        self.session.as_ref()
    }

    /// Name of the output the logits are read from.
    pub fn logits_output(&self) -> &str {
        &self.logits_output
    }

    /// Generate a continuation of `prompt` and return the decoded full text
    /// (prompt included), special tokens skipped.
    pub fn generate(
        &self,
        prompt: &str,
        max_new_tokens: usize,
        stop_token_id: Option<u32>,
    ) -> Result<String> {
        let params = GenerateParams {
            max_new_tokens,
            stop_token_id,
            ..GenerateParams::default()
        };
        Ok(self.generate_with(prompt, &params)?.text)
    }

    pub fn generate_with(&self, prompt: &str, params: &GenerateParams) -> Result<GenerationResult> {
        let stop_ids = self.stop_ids(params.stop_token_id);
        self.generate_inner(prompt, params, &stop_ids, &mut |_| Ok(()))
    }

    /// Like [`Runtime::generate_with`], reporting each appended token to
    /// `on_token` as it is produced.
    ///
    /// The text passed along is what the token completes. It is empty while
    /// a token holds only part of a multi-byte character; the rest arrives
    /// with the token that finishes it.
    pub fn generate_streaming<F>(
        &self,
        prompt: &str,
        params: &GenerateParams,
        on_token: F,
    ) -> Result<GenerationResult>
    where
        F: FnMut(u32, &str),
    {
        let stop_ids = self.stop_ids(params.stop_token_id);
        self.stream_until(prompt, params, &stop_ids, on_token)
    }

    pub(crate) fn stream_until<F>(
        &self,
        prompt: &str,
        params: &GenerateParams,
        stop_ids: &[u32],
        mut on_token: F,
    ) -> Result<GenerationResult>
    where
        F: FnMut(u32, &str),
    {
        let mut stream = self.tokenizer.decode_stream(params.skip_special_tokens);
        self.generate_inner(prompt, params, stop_ids, &mut |id| {
            let fragment = stream.step(id).map_err(RuntimeError::Tokenizer)?;
            on_token(id, fragment.as_deref().unwrap_or(""));
            Ok(())
        })
    }

    /// Stop id in effect: the explicit one, else the configured eos.
    pub fn effective_stop_id(&self, explicit: Option<u32>) -> Option<u32> {
        explicit.or(self.config.eos_token_id)
    }

    fn stop_ids(&self, explicit: Option<u32>) -> Vec<u32> {
        self.effective_stop_id(explicit).into_iter().collect()
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        self.tokenizer.encode(text).map_err(RuntimeError::Tokenizer)
    }

    /// Decode `ids`, using the tokenizer's skip-special mode when asked and
    /// available.
    pub fn decode_text(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        let decoded = if skip_special_tokens {
            self.tokenizer
                .decode_skip_special(ids)
                .unwrap_or_else(|| self.tokenizer.decode(ids))
        } else {
            self.tokenizer.decode(ids)
        };
        decoded.map_err(RuntimeError::Tokenizer)
    }

    fn generate_inner(
        &self,
        prompt: &str,
        params: &GenerateParams,
        stop_ids: &[u32],
        on_token: &mut dyn FnMut(u32) -> Result<()>,
    ) -> Result<GenerationResult> {
        let start = Instant::now();
        let mut tokens = self.encode(prompt)?;
        let prompt_len = tokens.len();
        debug!(
            prompt_len,
            max_new_tokens = params.max_new_tokens,
            stop_ids = ?stop_ids,
            "generation started"
        );

        let decoder = Decoder {
            session: self.session.as_ref(),
            logits_output: &self.logits_output,
            sampler: &self.sampler,
        };
        let stop_reason = decoder.run(&mut tokens, params.max_new_tokens, stop_ids, on_token)?;

        let text = self.decode_text(&tokens, params.skip_special_tokens)?;
        info!(
            prompt_len,
            generated = tokens.len() - prompt_len,
            stop = ?stop_reason,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "generation finished"
        );
        Ok(GenerationResult {
            tokens,
            prompt_len,
            text,
            stop_reason,
        })
    }
}
