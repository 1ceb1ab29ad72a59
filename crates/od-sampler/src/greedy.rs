use crate::sampler::{Sampler, TokenLogit};

/// Index of the largest value in `logits`.
///
/// Ties resolve to the lowest index. NaN entries never win; a slice that is
/// empty or all NaN yields `None`.
pub fn argmax(logits: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in logits.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Greedy sampler: keeps the single token with the highest logit.
pub struct GreedySampler;

impl GreedySampler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GreedySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for GreedySampler {
    fn name(&self) -> &str {
        "greedy"
    }

    fn apply(&self, logits: &mut Vec<TokenLogit>) {
        let values: Vec<f32> = logits.iter().map(|t| t.logit).collect();
        match argmax(&values) {
            Some(idx) => {
                let selected = logits.swap_remove(idx);
                logits.clear();
                logits.push(selected);
            }
            None => logits.clear(),
        }
    }
}
