pub mod sampler;
pub mod greedy;

pub use sampler::{TokenLogit, Sampler, SamplerChain};
pub use greedy::{argmax, GreedySampler};
