use od_model::{default_engine, Capabilities, InferenceEngine};
use od_runtime::Runtime;

/// Opaque context handle that owns the engine and the loaded runtime.
pub struct ODContext {
    pub engine: Box<dyn InferenceEngine>,
    pub capabilities: Capabilities,
    pub runtime: Option<Runtime>,
}

impl Default for ODContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ODContext {
    /// Context over the engine compiled into this build.
    pub fn new() -> Self {
        Self::with_engine(default_engine())
    }

    pub fn with_engine(engine: Box<dyn InferenceEngine>) -> Self {
        Self {
            engine,
            capabilities: Capabilities::compiled(),
            runtime: None,
        }
    }
}
