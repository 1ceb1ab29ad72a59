use std::fmt;

/// Element types that cross the engine boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 64-bit signed integer. Token ids, attention masks and position ids.
    I64,
    /// 32-bit floating point. Logits.
    F32,
    /// 16-bit floating point (IEEE 754 half-precision, via the `half` crate).
    ///
    /// Engines exporting half-precision logits are widened to F32 on the way
    /// in, so this only appears in engine tensor descriptions.
    F16,
}

impl DType {
    /// Parses an ONNX-style element type name such as `int64` or `float16`.
    ///
    /// Returns `None` for element types this crate does not carry.
    pub fn from_onnx_name(name: &str) -> Option<DType> {
        match name.to_ascii_lowercase().as_str() {
            "int64" | "i64" => Some(DType::I64),
            "float" | "float32" | "f32" => Some(DType::F32),
            "float16" | "f16" => Some(DType::F16),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::I64 => write!(f, "i64"),
            DType::F32 => write!(f, "f32"),
            DType::F16 => write!(f, "f16"),
        }
    }
}
