//! ONNX Runtime adapter (uses the `ort` crate).

use std::path::Path;

use half::f16;
use ort::session::builder::GraphOptimizationLevel as OrtLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::{Tensor as OrtTensor, ValueType};
use tracing::info;

use od_tensor::{CpuStorage, Shape, Tensor};

use super::{
    GraphOptimizationLevel, InferenceEngine, InferenceSession, InputFeed, SessionOptions,
    TensorInfo,
};
use crate::error::{ModelError, Result};

fn engine_err(e: ort::Error) -> ModelError {
    ModelError::EngineError(e.to_string())
}

fn ort_level(level: GraphOptimizationLevel) -> OrtLevel {
    match level {
        GraphOptimizationLevel::Disable => OrtLevel::Disable,
        GraphOptimizationLevel::Basic => OrtLevel::Level1,
        GraphOptimizationLevel::Extended => OrtLevel::Level2,
        GraphOptimizationLevel::All => OrtLevel::Level3,
    }
}

fn describe(name: &str, ty: &ValueType) -> TensorInfo {
    match ty {
        ValueType::Tensor { ty, dimensions, .. } => TensorInfo::new(
            name,
            format!("{:?}", ty).to_ascii_lowercase(),
            dimensions.clone(),
        ),
        other => TensorInfo::new(name, format!("{:?}", other).to_ascii_lowercase(), Vec::new()),
    }
}

/// Engine backed by ONNX Runtime on the CPU execution provider.
#[derive(Debug, Clone, Default)]
pub struct OrtEngine;

impl OrtEngine {
    pub fn new() -> Self {
        OrtEngine
    }
}

impl InferenceEngine for OrtEngine {
    fn name(&self) -> &str {
        "onnxruntime"
    }

    fn create_session(
        &self,
        model_path: &Path,
        options: &SessionOptions,
    ) -> Result<Box<dyn InferenceSession>> {
        let mut builder = Session::builder()
            .map_err(engine_err)?
            .with_optimization_level(ort_level(options.optimization_level))
            .map_err(engine_err)?;
        if let Some(threads) = options.intra_threads {
            builder = builder.with_intra_threads(threads).map_err(engine_err)?;
        }
        let session = builder.commit_from_file(model_path).map_err(engine_err)?;

        let inputs: Vec<TensorInfo> = session
            .inputs
            .iter()
            .map(|i| describe(&i.name, &i.input_type))
            .collect();
        let outputs: Vec<TensorInfo> = session
            .outputs
            .iter()
            .map(|o| describe(&o.name, &o.output_type))
            .collect();

        info!(
            model = %model_path.display(),
            threads = ?options.intra_threads,
            optimization = %options.optimization_level,
            inputs = inputs.len(),
            outputs = outputs.len(),
            "onnxruntime session created"
        );

        Ok(Box::new(OrtSession {
            session,
            inputs,
            outputs,
        }))
    }
}

/// A committed ONNX Runtime session plus its cached declarations.
pub struct OrtSession {
    session: Session,
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
}

impl InferenceSession for OrtSession {
    fn inputs(&self) -> &[TensorInfo] {
        &self.inputs
    }

    fn outputs(&self) -> &[TensorInfo] {
        &self.outputs
    }

    fn run(&self, feed: InputFeed, output: &str) -> Result<Tensor> {
        if !self.outputs.iter().any(|o| o.name == output) {
            return Err(ModelError::EngineError(format!(
                "model declares no output named {output}"
            )));
        }

        let mut values: Vec<(String, SessionInputValue<'static>)> = Vec::with_capacity(feed.len());
        for (name, tensor) in feed.into_entries() {
            let (shape, storage) = tensor.into_parts();
            let dims = shape.to_engine_dims();
            let value: SessionInputValue<'static> = match storage {
                CpuStorage::I64(data) => OrtTensor::from_array((dims, data))
                    .map_err(engine_err)?
                    .into(),
                CpuStorage::F32(data) => OrtTensor::from_array((dims, data))
                    .map_err(engine_err)?
                    .into(),
            };
            values.push((name, value));
        }

        let outputs = self.session.run(values).map_err(engine_err)?;
        let value = &outputs[output];

        if let Ok((dims, data)) = value.try_extract_raw_tensor::<f32>() {
            return Ok(Tensor::from_f32(data.to_vec(), Shape::from_engine_dims(&dims)?)?);
        }
        let (dims, data) = value.try_extract_raw_tensor::<f16>().map_err(engine_err)?;
        Ok(Tensor::from_f16(data, Shape::from_engine_dims(&dims)?)?)
    }
}
