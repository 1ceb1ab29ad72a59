//! The greedy autoregressive decode loop.

use od_model::{InferenceSession, ModelError};
use od_sampler::SamplerChain;
use od_tensor::Tensor;
use tracing::debug;

use crate::error::{Result, RuntimeError};
use crate::feed::build_feed;

/// Why generation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A stop token was produced (and appended).
    StopToken,
    /// `max_new_tokens` tokens were appended without seeing a stop token.
    MaxNewTokens,
}

/// Next-token logits of the final position.
///
/// Rank 3 (`[batch, seq, vocab]`) reads `[0, seq - 1, :]`; rank 2
/// (`[seq, vocab]`) reads `[seq - 1, :]`. Other ranks and empty rows are
/// rejected.
pub fn select_logits(logits: &Tensor) -> Result<&[f32]> {
    let dims = logits.shape().dims();
    let index = match *dims {
        [batch, seq, vocab] if batch > 0 && seq > 0 && vocab > 0 => vec![0, seq - 1],
        [seq, vocab] if seq > 0 && vocab > 0 => vec![seq - 1],
        _ => return Err(RuntimeError::LogitsShape(logits.shape().clone())),
    };
    Ok(logits.lane_f32(&index)?)
}

/// A decoding request over an open session.
pub struct Decoder<'a> {
    pub session: &'a dyn InferenceSession,
    /// Name of the output holding the logits.
    pub logits_output: &'a str,
    pub sampler: &'a SamplerChain,
}

impl Decoder<'_> {
    /// Extend `tokens` one arg-max token at a time.
    ///
    /// Stops right after appending any of `stop_ids`, or once
    /// `max_new_tokens` tokens were appended. Each appended token is reported
    /// to `on_token`; an error from the callback aborts generation.
    pub fn run(
        &self,
        tokens: &mut Vec<u32>,
        max_new_tokens: usize,
        stop_ids: &[u32],
        on_token: &mut dyn FnMut(u32) -> Result<()>,
    ) -> Result<StopReason> {
        let input_names = self.session.input_names();
        for step in 0..max_new_tokens {
            let feed = build_feed(tokens, &input_names)?;
            let logits = self
                .session
                .run(feed, self.logits_output)
                .map_err(RuntimeError::Inference)?;
            let row = select_logits(&logits)?;
            let next = self.sampler.sample(row).ok_or_else(|| {
                RuntimeError::Inference(ModelError::Other(
                    "logits row has no comparable value".to_string(),
                ))
            })?;

            tokens.push(next);
            debug!(step, token = next, seq_len = tokens.len(), "decoded token");
            on_token(next)?;

            if stop_ids.contains(&next) {
                return Ok(StopReason::StopToken);
            }
        }
        Ok(StopReason::MaxNewTokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use od_tensor::Shape;

    #[test]
    fn test_select_rank3_last_position() {
        let t = Tensor::from_f32(
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            Shape::from_slice(&[1, 2, 3]),
        )
        .unwrap();
        assert_eq!(select_logits(&t).unwrap(), &[3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_select_rank3_first_batch_only() {
        let t = Tensor::from_f32(
            vec![0.0, 1.0, 2.0, 3.0, 9.0, 9.0, 9.0, 9.0],
            Shape::from_slice(&[2, 2, 2]),
        )
        .unwrap();
        assert_eq!(select_logits(&t).unwrap(), &[2.0, 3.0]);
    }

    #[test]
    fn test_select_rank2() {
        let t = Tensor::from_f32(vec![1.0, 2.0, 7.0, 8.0], Shape::from_slice(&[2, 2])).unwrap();
        assert_eq!(select_logits(&t).unwrap(), &[7.0, 8.0]);
    }

    #[test]
    fn test_select_rejects_other_ranks() {
        let rank1 = Tensor::from_f32(vec![1.0, 2.0], Shape::from_slice(&[2])).unwrap();
        assert!(matches!(select_logits(&rank1), Err(RuntimeError::LogitsShape(_))));

        let rank4 = Tensor::from_f32(vec![0.0; 4], Shape::from_slice(&[1, 1, 2, 2])).unwrap();
        assert!(matches!(select_logits(&rank4), Err(RuntimeError::LogitsShape(_))));
    }

    #[test]
    fn test_select_rejects_empty_rows() {
        let no_positions = Tensor::from_f32(Vec::new(), Shape::from_slice(&[1, 0, 4])).unwrap();
        assert!(matches!(
            select_logits(&no_positions),
            Err(RuntimeError::LogitsShape(_))
        ));

        let no_vocab = Tensor::from_f32(Vec::new(), Shape::from_slice(&[3, 0])).unwrap();
        assert!(matches!(select_logits(&no_vocab), Err(RuntimeError::LogitsShape(_))));
    }
}
