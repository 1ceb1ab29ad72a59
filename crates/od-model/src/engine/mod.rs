//! Adapter interface to the external inference engine.
//!
//! The engine loads a precompiled graph from the model file, declares the
//! inputs it needs, and runs one forward pass per call. Any engine integration
//! is a compiled implementation of [`InferenceEngine`] and [`InferenceSession`].

#[cfg(feature = "onnx")]
pub mod onnx;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use od_tensor::{DType, Tensor};

use crate::error::{ModelError, Result};

/// Graph optimization applied when the session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphOptimizationLevel {
    Disable,
    Basic,
    Extended,
    #[default]
    All,
}

impl fmt::Display for GraphOptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GraphOptimizationLevel::Disable => "disable",
            GraphOptimizationLevel::Basic => "basic",
            GraphOptimizationLevel::Extended => "extended",
            GraphOptimizationLevel::All => "all",
        };
        f.write_str(s)
    }
}

impl FromStr for GraphOptimizationLevel {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "disable" | "none" | "0" => Ok(GraphOptimizationLevel::Disable),
            "basic" | "1" => Ok(GraphOptimizationLevel::Basic),
            "extended" | "2" => Ok(GraphOptimizationLevel::Extended),
            "all" | "3" => Ok(GraphOptimizationLevel::All),
            other => Err(ModelError::Other(format!(
                "unknown graph optimization level: {other}"
            ))),
        }
    }
}

/// Options fixed at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionOptions {
    /// Hint for the engine's intra-op worker threads; `None` leaves the
    /// engine default.
    pub intra_threads: Option<usize>,
    pub optimization_level: GraphOptimizationLevel,
}

/// Half of the available cores, at least one.
pub fn default_intra_threads() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores / 2).max(1)
}

/// Declared name, element type and shape of an engine input or output.
///
/// Symbolic dimensions are reported as `-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorInfo {
    pub name: String,
    pub element_type: String,
    pub shape: Vec<i64>,
}

impl TensorInfo {
    pub fn new(name: impl Into<String>, element_type: impl Into<String>, shape: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            element_type: element_type.into(),
            shape,
        }
    }

    /// Element type as a [`DType`], if it is one this workspace carries.
    pub fn dtype(&self) -> Option<DType> {
        DType::from_onnx_name(&self.element_type)
    }
}

impl fmt::Display for TensorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [", self.name, self.element_type)?;
        for (i, d) in self.shape.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if *d < 0 {
                write!(f, "?")?;
            } else {
                write!(f, "{}", d)?;
            }
        }
        write!(f, "]")
    }
}

/// Named input tensors for a single forward pass, in the engine's declared
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputFeed {
    entries: Vec<(String, Tensor)>,
}

impl InputFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any existing entry with the same name.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = tensor,
            None => self.entries.push((name, tensor)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn into_entries(self) -> Vec<(String, Tensor)> {
        self.entries
    }
}

/// A loaded model graph ready to run.
pub trait InferenceSession: Send + Sync {
    /// Inputs the graph declares, in declaration order.
    fn inputs(&self) -> &[TensorInfo];

    /// Outputs the graph declares, in declaration order.
    fn outputs(&self) -> &[TensorInfo];

    /// Names of the declared inputs.
    fn input_names(&self) -> Vec<&str> {
        self.inputs().iter().map(|i| i.name.as_str()).collect()
    }

    /// Run one forward pass and return the output called `output`.
    ///
    /// Blocks until the engine finishes.
    fn run(&self, feed: InputFeed, output: &str) -> Result<Tensor>;
}

/// Creates sessions from model files.
pub trait InferenceEngine: Send + Sync {
    /// Returns the name of this engine (e.g., "onnxruntime").
    fn name(&self) -> &str;

    /// Load `model_path` and prepare it for execution.
    fn create_session(
        &self,
        model_path: &Path,
        options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>>;
}

/// Stand-in used when no engine was compiled in. Every session request fails.
#[derive(Debug, Clone)]
pub struct UnavailableEngine {
    reason: String,
}

impl UnavailableEngine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl InferenceEngine for UnavailableEngine {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn create_session(
        &self,
        _model_path: &Path,
        _options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>> {
        Err(ModelError::EngineUnavailable(self.reason.clone()))
    }
}

/// The engine compiled into this build, or an [`UnavailableEngine`].
#[cfg(feature = "onnx")]
pub fn default_engine() -> Box<dyn InferenceEngine> {
    Box::new(onnx::OrtEngine::new())
}

/// The engine compiled into this build, or an [`UnavailableEngine`].
#[cfg(not(feature = "onnx"))]
pub fn default_engine() -> Box<dyn InferenceEngine> {
    Box::new(UnavailableEngine::new(
        "built without the onnx feature; rebuild with `--features onnx`",
    ))
}

/// Output carrying next-token logits: the one named `logits`
/// (case-insensitive), else the last declared output.
pub fn logits_output(outputs: &[TensorInfo]) -> Option<&TensorInfo> {
    outputs
        .iter()
        .find(|o| o.name.eq_ignore_ascii_case("logits"))
        .or_else(|| outputs.last())
}
