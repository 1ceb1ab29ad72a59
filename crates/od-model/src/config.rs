//! Model hyperparameters read from the checkpoint's `config.json`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Hyperparameters of an exported decoder-only checkpoint.
///
/// Pure data. Missing keys take the Phi-4-mini values, except the special
/// token ids, which stay unset unless the document names them. Keys this
/// struct does not know are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    // Core architecture
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub num_key_value_heads: Option<usize>,
    pub intermediate_size: usize,
    pub hidden_act: String,
    pub rms_norm_eps: f64,

    // Positional / rotary
    pub max_position_embeddings: usize,
    pub original_max_position_embeddings: usize,
    pub rope_theta: f64,
    pub partial_rotary_factor: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rope_scaling: Option<Value>,

    // Special tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bos_token_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eos_token_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pad_token_id: Option<u32>,

    pub tie_word_embeddings: bool,
    pub use_cache: bool,

    // Dropouts / misc
    pub attention_dropout: f64,
    pub embd_pdrop: f64,
    pub resid_pdrop: f64,
    pub initializer_range: f64,
    pub lm_head_bias: bool,
    pub mlp_bias: bool,
    pub attention_bias: bool,
    pub full_attn_mod: usize,
    pub interpolate_factor: usize,
    pub sliding_window: Option<usize>,
    pub torch_dtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformers_version: Option<String>,

    /// Keys not modelled above, preserved for round-tripping.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            vocab_size: 200_064,
            hidden_size: 3072,
            num_hidden_layers: 32,
            num_attention_heads: 24,
            num_key_value_heads: Some(8),
            intermediate_size: 8192,
            hidden_act: "silu".to_string(),
            rms_norm_eps: 1e-5,
            max_position_embeddings: 131_072,
            original_max_position_embeddings: 4096,
            rope_theta: 10_000.0,
            partial_rotary_factor: 0.75,
            rope_scaling: None,
            bos_token_id: None,
            eos_token_id: None,
            pad_token_id: None,
            tie_word_embeddings: true,
            use_cache: true,
            attention_dropout: 0.0,
            embd_pdrop: 0.0,
            resid_pdrop: 0.0,
            initializer_range: 0.02,
            lm_head_bias: false,
            mlp_bias: false,
            attention_bias: false,
            full_attn_mod: 1,
            interpolate_factor: 1,
            sliding_window: Some(262_144),
            torch_dtype: Some("bfloat16".to_string()),
            transformers_version: None,
            extra: Map::new(),
        }
    }
}

impl ModelConfig {
    /// Phi-4-mini-instruct, including its special token ids.
    pub fn phi4_mini() -> Self {
        Self {
            bos_token_id: Some(199_999),
            eos_token_id: Some(199_999),
            pad_token_id: Some(199_999),
            ..Self::default()
        }
    }

    /// Parse a configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a configuration document from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serialize back to a pretty-printed document.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the document to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Per-head dimension (hidden_size / num_attention_heads), 0 when the head
    /// count is zero.
    pub fn head_dim(&self) -> usize {
        self.hidden_size
            .checked_div(self.num_attention_heads)
            .unwrap_or(0)
    }

    /// Key/value head count, falling back to the attention head count.
    pub fn kv_heads(&self) -> usize {
        self.num_key_value_heads.unwrap_or(self.num_attention_heads)
    }

    /// Number of head dimensions that receive rotary embedding.
    pub fn rotary_dim(&self) -> usize {
        (self.head_dim() as f64 * self.partial_rotary_factor) as usize
    }

    /// Look up a key that is not modelled by this struct.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}
