use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{ModelError, Result};
use super::{TokenStream, Tokenizer};

/// Token text used for unknown input and padding when none is configured.
pub const DEFAULT_UNK_TOKEN: &str = "<|endoftext|>";

/// Flat token vocabulary loaded from a `vocab.json` document.
pub struct Vocab {
    /// Mapping from token string to token ID.
    pub token_to_id: HashMap<String, u32>,
    /// Reverse mapping from token ID to token string.
    pub id_to_token: HashMap<u32, String>,
    /// Text substituted for anything the vocabulary cannot represent.
    pub unk_token: String,
    /// Padding token text.
    pub pad_token: String,
}

impl Vocab {
    /// Build a vocabulary from a `token -> id` map.
    ///
    /// The unknown and padding tokens are appended with the next free id
    /// (`max + 1`, or 0 for an empty map) when the map lacks them. If several
    /// tokens share an id, the reverse mapping keeps the lexicographically
    /// smallest one. Fails when a special token is missing and `max` is
    /// already `u32::MAX`.
    pub fn new(
        mut token_to_id: HashMap<String, u32>,
        unk_token: &str,
        pad_token: &str,
    ) -> Result<Vocab> {
        for special in [unk_token, pad_token] {
            if !token_to_id.contains_key(special) {
                let next = match token_to_id.values().max() {
                    None => 0,
                    Some(&m) => m.checked_add(1).ok_or_else(|| {
                        ModelError::TokenizerError(format!(
                            "no free id for {special}: vocabulary already uses id {m}"
                        ))
                    })?,
                };
                token_to_id.insert(special.to_string(), next);
            }
        }

        let mut entries: Vec<(&String, &u32)> = token_to_id.iter().collect();
        entries.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
        let mut id_to_token = HashMap::with_capacity(entries.len());
        for (tok, &id) in entries {
            id_to_token.entry(id).or_insert_with(|| tok.clone());
        }

        Ok(Vocab {
            token_to_id,
            id_to_token,
            unk_token: unk_token.to_string(),
            pad_token: pad_token.to_string(),
        })
    }

    /// Parse a `vocab.json` document (a JSON object of `token: id`).
    pub fn from_json_str(json: &str) -> Result<Vocab> {
        let map: HashMap<String, u32> = serde_json::from_str(json)?;
        Vocab::new(map, DEFAULT_UNK_TOKEN, DEFAULT_UNK_TOKEN)
    }

    /// Id of the unknown token.
    pub fn unk_id(&self) -> u32 {
        self.token_to_id[&self.unk_token]
    }

    /// Id of the padding token.
    pub fn pad_id(&self) -> u32 {
        self.token_to_id[&self.pad_token]
    }

    /// Number of tokens in the vocabulary.
    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    /// Returns true if the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }
}

/// Lossy fallback tokenizer over a [`Vocab`].
///
/// Whole whitespace-delimited words map to their id when present; otherwise
/// each character maps to its id, or to the unknown id. Decoding concatenates
/// token texts without separators, so word boundaries are not recoverable.
pub struct VocabTokenizer {
    vocab: Vocab,
}

impl VocabTokenizer {
    pub fn new(vocab: Vocab) -> Self {
        Self { vocab }
    }

    /// Load `vocab.json` from `path`.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ModelError::MissingAsset {
                asset: "vocabulary document",
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path)?;
        Ok(Self::new(Vocab::from_json_str(&text)?))
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }
}

impl Tokenizer for VocabTokenizer {
    fn name(&self) -> &str {
        "vocab"
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let unk = self.vocab.unk_id();
        let mut ids = Vec::new();
        for word in text.split_whitespace() {
            if let Some(&id) = self.vocab.token_to_id.get(word) {
                ids.push(id);
                continue;
            }
            let mut buf = [0u8; 4];
            for ch in word.chars() {
                let ch_str: &str = ch.encode_utf8(&mut buf);
                ids.push(self.vocab.token_to_id.get(ch_str).copied().unwrap_or(unk));
            }
        }
        Ok(ids)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        let mut out = String::new();
        for id in ids {
            match self.vocab.id_to_token.get(id) {
                Some(tok) => out.push_str(tok),
                None => out.push_str(&self.vocab.unk_token),
            }
        }
        Ok(out)
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.vocab.token_to_id.get(token).copied()
    }

    fn decode_stream(&self, _skip_special_tokens: bool) -> Box<dyn TokenStream + '_> {
        Box::new(VocabTokenStream { tokenizer: self })
    }
}

/// Every id maps to whole token text, so each step completes at once.
struct VocabTokenStream<'a> {
    tokenizer: &'a VocabTokenizer,
}

impl TokenStream for VocabTokenStream<'_> {
    fn step(&mut self, id: u32) -> Result<Option<String>> {
        self.tokenizer.decode(&[id]).map(Some)
    }
}
