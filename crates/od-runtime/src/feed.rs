//! Per-step input tensors.
//!
//! Each decode step re-feeds the whole token sequence. Declared inputs are
//! matched to a role by name; inputs with no recognised role (key-value cache
//! entries and the like) are left out of the feed.

use od_model::InputFeed;
use od_tensor::{Shape, Tensor};

use crate::error::Result;

/// What a declared engine input carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRole {
    InputIds,
    AttentionMask,
    PositionIds,
}

impl InputRole {
    /// Role of an input by its declared name, compared case-insensitively.
    pub fn classify(name: &str) -> Option<InputRole> {
        let name = name.to_ascii_lowercase();
        if name.contains("input_ids") || name == "input" || name == "input__0" {
            Some(InputRole::InputIds)
        } else if name.contains("attention") {
            Some(InputRole::AttentionMask)
        } else if name.contains("position") {
            Some(InputRole::PositionIds)
        } else {
            None
        }
    }

    fn tensor(self, tokens: &[u32]) -> Result<Tensor> {
        let n = tokens.len();
        let shape = Shape::row(n);
        let data: Vec<i64> = match self {
            InputRole::InputIds => tokens.iter().map(|&t| i64::from(t)).collect(),
            InputRole::AttentionMask => return Ok(Tensor::filled_i64(1, shape)),
            InputRole::PositionIds => (0..n as i64).collect(),
        };
        Ok(Tensor::from_i64(data, shape)?)
    }
}

/// Build the feed for one forward pass over `tokens`.
///
/// Every populated entry is an i64 tensor of shape `[1, tokens.len()]`, in the
/// order of `input_names`.
pub fn build_feed(tokens: &[u32], input_names: &[&str]) -> Result<InputFeed> {
    let mut feed = InputFeed::new();
    for &name in input_names {
        if let Some(role) = InputRole::classify(name) {
            feed.insert(name, role.tensor(tokens)?);
        }
    }
    Ok(feed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;
    use od_tensor::TensorError;
    use proptest::prelude::*;

    #[test]
    fn test_classify() {
        assert_eq!(InputRole::classify("input_ids"), Some(InputRole::InputIds));
        assert_eq!(InputRole::classify("Decoder_Input_IDs"), Some(InputRole::InputIds));
        assert_eq!(InputRole::classify("INPUT"), Some(InputRole::InputIds));
        assert_eq!(InputRole::classify("input__0"), Some(InputRole::InputIds));
        assert_eq!(InputRole::classify("attention_mask"), Some(InputRole::AttentionMask));
        assert_eq!(InputRole::classify("position_ids"), Some(InputRole::PositionIds));
        assert_eq!(InputRole::classify("past_key_values.0.key"), None);
        assert_eq!(InputRole::classify("input_1"), None);
    }

    #[test]
    fn test_cache_inputs_omitted() {
        let names = ["input_ids", "attention_mask", "past_key_values.0"];
        let feed = build_feed(&[4, 7, 9], &names).unwrap();
        assert_eq!(feed.names(), vec!["input_ids", "attention_mask"]);
        assert_eq!(feed.get("input_ids").unwrap().data_i64().unwrap(), &[4, 7, 9]);
        assert_eq!(feed.get("attention_mask").unwrap().data_i64().unwrap(), &[1, 1, 1]);
        assert!(!feed.contains("past_key_values.0"));
    }

    #[test]
    fn test_position_ids() {
        let feed = build_feed(&[10, 11, 12, 13], &["position_ids", "input_ids"]).unwrap();
        assert_eq!(feed.names(), vec!["position_ids", "input_ids"]);
        assert_eq!(feed.get("position_ids").unwrap().data_i64().unwrap(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_tensor_failures_are_internal() {
        let err = RuntimeError::from(TensorError::LengthMismatch {
            len: 2,
            shape: vec![1, 3],
            numel: 3,
        });
        assert!(matches!(err, RuntimeError::Tensor(_)));
        assert!(err.to_string().starts_with("internal tensor error"));
    }

    #[test]
    fn test_empty_sequence() {
        let feed = build_feed(&[], &["input_ids", "attention_mask"]).unwrap();
        assert_eq!(feed.get("input_ids").unwrap().shape().dims(), &[1, 0]);
    }

    #[test]
    fn test_no_recognised_inputs() {
        let feed = build_feed(&[1], &["pixel_values"]).unwrap();
        assert!(feed.is_empty());
    }

    proptest! {
        #[test]
        fn prop_entries_are_single_rows(
            tokens in proptest::collection::vec(0u32..1000, 1..32),
        ) {
            let names = ["input_ids", "attention_mask", "position_ids", "past_key_values.3.value"];
            let feed = build_feed(&tokens, &names).unwrap();
            prop_assert_eq!(feed.len(), 3);
            for (_, tensor) in feed.iter() {
                prop_assert_eq!(tensor.shape().dims(), &[1, tokens.len()][..]);
            }
        }
    }
}
