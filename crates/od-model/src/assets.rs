//! Locating the files of an exported checkpoint directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::setup::{first_success, Strategy};

/// Well-known model file names, tried in order before scanning.
pub const MODEL_FILE_CANDIDATES: [&str; 2] = ["model.onnx", "phi4-mini-instruct-onnx.onnx"];
/// File name of the configuration document.
pub const CONFIG_FILE: &str = "config.json";

/// Resolved paths and configuration of a checkpoint directory.
#[derive(Debug, Clone)]
pub struct ModelAssets {
    pub dir: PathBuf,
    pub model_file: PathBuf,
    pub config: ModelConfig,
}

impl ModelAssets {
    /// Resolve the model file and read `config.json` from `dir`.
    pub fn resolve(dir: &Path, model_file: Option<&Path>) -> Result<Self> {
        if !dir.is_dir() {
            return Err(ModelError::MissingAsset {
                asset: "model directory",
                path: dir.to_path_buf(),
            });
        }
        let model_file = locate_model_file(dir, model_file)?;
        let config = load_config(dir)?;
        info!(
            dir = %dir.display(),
            model = %model_file.display(),
            vocab_size = config.vocab_size,
            layers = config.num_hidden_layers,
            "model assets resolved"
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            model_file,
            config,
        })
    }
}

fn existing_file(path: PathBuf) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(ModelError::MissingAsset {
            asset: "model file",
            path,
        })
    }
}

/// First `*.onnx` file in `dir` by sorted file name.
fn scan_for_onnx(dir: &Path) -> Result<PathBuf> {
    let mut found: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("onnx"))
        })
        .collect();
    found.sort();
    found
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::Other(format!("no .onnx file in {}", dir.display())))
}

/// Find the model file in `dir`.
///
/// An explicit path (relative paths are taken from `dir`) is the only
/// candidate when given. Otherwise the strategies are each of
/// [`MODEL_FILE_CANDIDATES`], then a sorted scan for any `.onnx` file.
pub fn locate_model_file(dir: &Path, explicit: Option<&Path>) -> Result<PathBuf> {
    let mut strategies: Vec<Strategy<'_, PathBuf>> = Vec::new();
    match explicit {
        Some(path) => strategies.push(Strategy::new("explicit", move || {
            existing_file(if path.is_absolute() {
                path.to_path_buf()
            } else {
                dir.join(path)
            })
        })),
        None => {
            for name in MODEL_FILE_CANDIDATES {
                strategies.push(Strategy::new(name, move || existing_file(dir.join(name))));
            }
            strategies.push(Strategy::new("scan", move || scan_for_onnx(dir)));
        }
    }

    let (_, path) = first_success("model file", strategies)?;
    Ok(path)
}

/// Read `config.json` from `dir`. The document is required.
pub fn load_config(dir: &Path) -> Result<ModelConfig> {
    let path = dir.join(CONFIG_FILE);
    if !path.is_file() {
        return Err(ModelError::MissingAsset {
            asset: "configuration document",
            path,
        });
    }
    ModelConfig::from_file(&path)
}
