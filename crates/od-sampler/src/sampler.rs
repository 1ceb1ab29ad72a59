/// A token ID paired with its logit value.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenLogit {
    pub token_id: u32,
    pub logit: f32,
}

/// Trait for samplers that modify or select from a set of token logits.
pub trait Sampler: Send + Sync {
    /// Returns the name of this sampler.
    fn name(&self) -> &str;

    /// Modify logits in-place (filtering, selecting, etc.)
    fn apply(&self, logits: &mut Vec<TokenLogit>);
}

/// Composes samplers into a pipeline.
/// The last sampler in the chain should be a selector that leaves exactly one
/// candidate.
pub struct SamplerChain {
    samplers: Vec<Box<dyn Sampler>>,
}

impl SamplerChain {
    /// Create a new empty sampler chain.
    pub fn new() -> Self {
        Self {
            samplers: Vec::new(),
        }
    }

    /// Chain that only performs arg-max selection.
    pub fn greedy() -> Self {
        Self::new().with(Box::new(crate::greedy::GreedySampler))
    }

    /// Add a sampler to the end of the chain. Returns self for builder-style usage.
    pub fn with(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.samplers.push(sampler);
        self
    }

    /// Names of the samplers in the chain, in application order.
    pub fn names(&self) -> Vec<&str> {
        self.samplers.iter().map(|s| s.name()).collect()
    }

    /// Run all samplers in order on raw logits, return the selected token ID.
    ///
    /// Returns `None` when `logits` is empty or every candidate was filtered out.
    pub fn sample(&self, logits: &[f32]) -> Option<u32> {
        let mut token_logits: Vec<TokenLogit> = logits
            .iter()
            .enumerate()
            .map(|(i, &logit)| TokenLogit {
                token_id: i as u32,
                logit,
            })
            .collect();

        for sampler in &self.samplers {
            sampler.apply(&mut token_logits);
        }

        token_logits.first().map(|t| t.token_id)
    }
}

impl Default for SamplerChain {
    fn default() -> Self {
        Self::greedy()
    }
}
