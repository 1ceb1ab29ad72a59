//! Ordered, named setup strategies with aggregated failure reporting.
//!
//! Asset resolution (model file, tokenizer) tries a fixed list of strategies
//! in order. The first success wins; when every strategy fails the caller gets
//! one [`SetupError`] naming each attempt and its reason.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::error::{ModelError, Result};

/// Capability flags resolved once by the embedding application.
///
/// The core never probes for optional libraries itself; whatever is enabled
/// here is what the setup strategies are allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Try a HuggingFace `tokenizer.json` before the vocabulary fallback.
    pub hf_tokenizer: bool,
}

impl Capabilities {
    /// Everything this build was compiled with.
    pub fn compiled() -> Self {
        Self {
            hf_tokenizer: cfg!(feature = "hf-tokenizer"),
        }
    }

    /// Only the built-in fallbacks.
    pub fn minimal() -> Self {
        Self {
            hf_tokenizer: false,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::compiled()
    }
}

/// One failed strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub strategy: String,
    pub reason: String,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

/// Every strategy for an asset failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no usable {asset} ({})", render_attempts(.attempts))]
pub struct SetupError {
    pub asset: &'static str,
    pub attempts: Vec<Attempt>,
}

fn render_attempts(attempts: &[Attempt]) -> String {
    if attempts.is_empty() {
        return "no strategies enabled".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A named way of producing `T`.
pub struct Strategy<'a, T> {
    name: String,
    run: Box<dyn FnOnce() -> Result<T> + 'a>,
}

impl<'a, T> Strategy<'a, T> {
    pub fn new(name: impl Into<String>, run: impl FnOnce() -> Result<T> + 'a) -> Self {
        Self {
            name: name.into(),
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Run `strategies` in order and return the first success with its name.
///
/// # Errors
/// `ModelError::Setup` listing every attempt when none succeeds.
pub fn first_success<T>(
    asset: &'static str,
    strategies: Vec<Strategy<'_, T>>,
) -> Result<(String, T)> {
    let mut attempts = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        let Strategy { name, run } = strategy;
        match run() {
            Ok(value) => {
                debug!(asset, strategy = %name, "setup strategy succeeded");
                return Ok((name, value));
            }
            Err(e) => {
                debug!(asset, strategy = %name, error = %e, "setup strategy failed");
                attempts.push(Attempt {
                    strategy: name,
                    reason: e.to_string(),
                });
            }
        }
    }
    Err(ModelError::Setup(SetupError { asset, attempts }))
}
