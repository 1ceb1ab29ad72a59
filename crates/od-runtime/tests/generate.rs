use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use od_model::tokenizer::{Vocab, VocabTokenizer};
use od_model::{
    Capabilities, InferenceEngine, InferenceSession, InputFeed, ModelConfig, ModelError,
    SessionOptions, TensorInfo, UnavailableEngine,
};
use od_runtime::{
    Conversation, GenerateParams, Runtime, RuntimeError, RuntimeOptions, StopReason,
};
use od_tensor::{Shape, Tensor};
use proptest::prelude::*;

const VOCAB: &str = r#"{
    "hi": 0, "there": 1, "<|endoftext|>": 2,
    "a": 3, "b": 4, "c": 5, "d": 6, "e": 7, "f": 8, "<|end|>": 9,
    "<|user|>": 10
}"#;
const VOCAB_SIZE: usize = 11;

/// What the scripted session saw on one call.
#[derive(Debug, Clone)]
struct Call {
    feed_names: Vec<String>,
    feed_dims: Vec<Vec<usize>>,
    input_ids: Vec<i64>,
    output: String,
}

type CallLog = Arc<Mutex<Vec<Call>>>;

/// Session that answers call `k` with a one-hot row selecting `script[k]`.
struct ScriptedSession {
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
    script: Vec<u32>,
    logits_rank: usize,
    log: CallLog,
}

impl ScriptedSession {
    fn new(script: &[u32]) -> Self {
        Self {
            inputs: vec![
                TensorInfo::new("input_ids", "int64", vec![-1, -1]),
                TensorInfo::new("attention_mask", "int64", vec![-1, -1]),
            ],
            outputs: vec![TensorInfo::new("logits", "float32", vec![-1, -1, VOCAB_SIZE as i64])],
            script: script.to_vec(),
            logits_rank: 3,
            log: Arc::default(),
        }
    }

    fn with_inputs(mut self, names: &[&str]) -> Self {
        self.inputs = names
            .iter()
            .map(|n| TensorInfo::new(*n, "int64", vec![-1, -1]))
            .collect();
        self
    }

    fn with_outputs(mut self, names: &[&str]) -> Self {
        self.outputs = names
            .iter()
            .map(|n| TensorInfo::new(*n, "float32", vec![]))
            .collect();
        self
    }

    fn with_rank(mut self, rank: usize) -> Self {
        self.logits_rank = rank;
        self
    }

    fn log(&self) -> CallLog {
        Arc::clone(&self.log)
    }
}

impl InferenceSession for ScriptedSession {
    fn inputs(&self) -> &[TensorInfo] {
        &self.inputs
    }

    fn outputs(&self) -> &[TensorInfo] {
        &self.outputs
    }

    fn run(&self, feed: InputFeed, output: &str) -> od_model::Result<Tensor> {
        let input_ids = feed
            .get("input_ids")
            .map(|t| t.data_i64().unwrap().to_vec())
            .unwrap_or_default();
        let mut log = self.log.lock().unwrap();
        let step = log.len();
        log.push(Call {
            feed_names: feed.names().iter().map(|n| n.to_string()).collect(),
            feed_dims: feed.iter().map(|(_, t)| t.shape().dims().to_vec()).collect(),
            input_ids: input_ids.clone(),
            output: output.to_string(),
        });

        let next = *self
            .script
            .get(step)
            .ok_or_else(|| ModelError::EngineError("script exhausted".to_string()))?;
        let positions = input_ids.len().max(1);
        let mut data = vec![0.0f32; positions * VOCAB_SIZE];
        data[(positions - 1) * VOCAB_SIZE + next as usize] = 1.0;
        let dims = match self.logits_rank {
            1 => vec![positions * VOCAB_SIZE],
            2 => vec![positions, VOCAB_SIZE],
            3 => vec![1, positions, VOCAB_SIZE],
            _ => vec![1, 1, positions, VOCAB_SIZE],
        };
        Ok(Tensor::from_f32(data, Shape::new(dims))?)
    }
}

fn tokenizer() -> Box<VocabTokenizer> {
    Box::new(VocabTokenizer::new(Vocab::from_json_str(VOCAB).unwrap()))
}

fn runtime(session: ScriptedSession, config: ModelConfig) -> Runtime {
    Runtime::from_parts(config, tokenizer(), Box::new(session)).unwrap()
}

fn no_eos() -> ModelConfig {
    ModelConfig::default()
}

#[test]
fn test_stops_right_after_stop_token() {
    let session = ScriptedSession::new(&[5, 9, 7]);
    let log = session.log();
    let rt = runtime(session, no_eos());

    let params = GenerateParams {
        max_new_tokens: 3,
        stop_token_id: Some(9),
        skip_special_tokens: true,
    };
    let result = rt.generate_with("hi there", &params).unwrap();
    assert_eq!(result.tokens, vec![0, 1, 5, 9]);
    assert_eq!(result.new_tokens(), &[5, 9]);
    assert_eq!(result.stop_reason, StopReason::StopToken);
    assert_eq!(result.text, "hitherec<|end|>");
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[test]
fn test_budget_exhausted() {
    let session = ScriptedSession::new(&[3, 4, 5, 6]);
    let rt = runtime(session, no_eos());
    let text = rt.generate("hi", 3, Some(9)).unwrap();
    assert_eq!(text, "hiabc");
}

#[test]
fn test_whole_sequence_fed_each_step() {
    let session = ScriptedSession::new(&[3, 4, 5]);
    let log = session.log();
    let rt = runtime(session, no_eos());
    rt.generate("hi there", 3, None).unwrap();

    let calls = log.lock().unwrap();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].input_ids, vec![0, 1]);
    assert_eq!(calls[1].input_ids, vec![0, 1, 3]);
    assert_eq!(calls[2].input_ids, vec![0, 1, 3, 4]);
    for call in calls.iter() {
        assert_eq!(call.output, "logits");
    }
}

#[test]
fn test_cache_inputs_left_out() {
    let session = ScriptedSession::new(&[3])
        .with_inputs(&["input_ids", "attention_mask", "past_key_values.0"]);
    let log = session.log();
    let rt = runtime(session, no_eos());
    rt.generate("hi there", 1, None).unwrap();

    let calls = log.lock().unwrap();
    assert_eq!(calls[0].feed_names, vec!["input_ids", "attention_mask"]);
    assert_eq!(calls[0].feed_dims, vec![vec![1, 2], vec![1, 2]]);
}

#[test]
fn test_zero_budget_returns_prompt() {
    let session = ScriptedSession::new(&[]);
    let log = session.log();
    let rt = runtime(session, no_eos());
    let result = rt
        .generate_with(
            "hi there",
            &GenerateParams {
                max_new_tokens: 0,
                ..GenerateParams::default()
            },
        )
        .unwrap();
    assert_eq!(result.text, "hithere");
    assert_eq!(result.stop_reason, StopReason::MaxNewTokens);
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_configured_eos_is_default_stop() {
    let config = ModelConfig {
        eos_token_id: Some(4),
        ..ModelConfig::default()
    };
    let rt = runtime(ScriptedSession::new(&[3, 4, 5]), config.clone());
    let result = rt.generate_with("hi", &GenerateParams::default()).unwrap();
    assert_eq!(result.new_tokens(), &[3, 4]);

    // An explicit stop id replaces the configured one.
    let rt = runtime(ScriptedSession::new(&[3, 4, 5]), config);
    let params = GenerateParams {
        max_new_tokens: 3,
        stop_token_id: Some(5),
        ..GenerateParams::default()
    };
    let result = rt.generate_with("hi", &params).unwrap();
    assert_eq!(result.new_tokens(), &[3, 4, 5]);
    assert_eq!(result.stop_reason, StopReason::StopToken);
}

#[test]
fn test_rank2_logits_accepted() {
    let rt = runtime(ScriptedSession::new(&[8]).with_rank(2), no_eos());
    assert_eq!(rt.generate("hi", 1, None).unwrap(), "hif");
}

#[test]
fn test_bad_logits_rank_is_fatal() {
    for rank in [1, 4] {
        let rt = runtime(ScriptedSession::new(&[3, 3]).with_rank(rank), no_eos());
        match rt.generate("hi", 2, None) {
            Err(RuntimeError::LogitsShape(shape)) => assert_eq!(shape.ndim(), rank),
            other => panic!("rank {rank}: unexpected {other:?}"),
        }
    }
}

#[test]
fn test_engine_failure_surfaces() {
    let rt = runtime(ScriptedSession::new(&[3]), no_eos());
    assert!(matches!(
        rt.generate("hi", 2, None),
        Err(RuntimeError::Inference(ModelError::EngineError(_)))
    ));
}

#[test]
fn test_logits_output_fallback_to_last() {
    let session = ScriptedSession::new(&[3]).with_outputs(&["present.0.key", "output_0"]);
    let log = session.log();
    let rt = runtime(session, no_eos());
    assert_eq!(rt.logits_output(), "output_0");
    rt.generate("hi", 1, None).unwrap();
    assert_eq!(log.lock().unwrap()[0].output, "output_0");
}

#[test]
fn test_no_outputs_rejected() {
    let session = ScriptedSession::new(&[]).with_outputs(&[]);
    assert!(matches!(
        Runtime::from_parts(no_eos(), tokenizer(), Box::new(session)),
        Err(RuntimeError::Setup(_))
    ));
}

#[test]
fn test_streaming_reports_each_token() {
    let rt = runtime(ScriptedSession::new(&[3, 4, 9]), no_eos());
    let params = GenerateParams {
        max_new_tokens: 5,
        stop_token_id: Some(9),
        ..GenerateParams::default()
    };
    let mut seen = Vec::new();
    let result = rt
        .generate_streaming("hi", &params, |id, fragment| {
            seen.push((id, fragment.to_string()))
        })
        .unwrap();
    assert_eq!(
        seen,
        vec![
            (3, "a".to_string()),
            (4, "b".to_string()),
            (9, "<|end|>".to_string())
        ]
    );
    assert_eq!(result.new_tokens(), &[3, 4, 9]);
}

#[test]
fn test_chat_turn() {
    let rt = runtime(ScriptedSession::new(&[3, 4, 9]), no_eos());
    let mut conversation = Conversation::new("Be brief.");
    let mut streamed = String::new();
    let reply = rt
        .chat_streaming(
            &mut conversation,
            "hi",
            &GenerateParams::default(),
            |fragment| streamed.push_str(fragment),
        )
        .unwrap();
    assert_eq!(reply, "ab");
    assert_eq!(streamed, "ab");
    assert_eq!(conversation.messages().len(), 3);
    assert_eq!(conversation.messages()[2].content, "ab");
    assert!(conversation
        .render_prompt()
        .ends_with("<|user|>hi<|end|><|assistant|>ab<|end|><|assistant|>"));
}

#[test]
fn test_chat_stops_when_model_opens_user_turn() {
    let session = ScriptedSession::new(&[3, 10, 4, 4, 9]);
    let log = session.log();
    let rt = runtime(session, no_eos());
    let mut conversation = Conversation::new("Be brief.");
    let mut streamed = String::new();
    let reply = rt
        .chat_streaming(
            &mut conversation,
            "hi",
            &GenerateParams::default(),
            |fragment| streamed.push_str(fragment),
        )
        .unwrap();
    assert_eq!(reply, "a");
    assert_eq!(streamed, "a");
    assert_eq!(log.lock().unwrap().len(), 2);
    assert_eq!(conversation.messages()[2].content, "a");
}

#[test]
fn test_plain_generation_ignores_role_markers() {
    let rt = runtime(ScriptedSession::new(&[3, 10, 4]), no_eos());
    let result = rt
        .generate_with(
            "hi",
            &GenerateParams {
                max_new_tokens: 3,
                stop_token_id: Some(9),
                ..GenerateParams::default()
            },
        )
        .unwrap();
    assert_eq!(result.new_tokens(), &[3, 10, 4]);
    assert_eq!(result.stop_reason, StopReason::MaxNewTokens);
}

#[cfg(feature = "hf-tokenizer")]
#[test]
fn test_streaming_keeps_multibyte_characters_whole() {
    use od_model::tokenizer::hf::HfTokenizer;

    // Byte-level BPE: "é" is C3 A9, one token per byte.
    const BYTE_LEVEL: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": {"type": "ByteLevel", "add_prefix_space": false, "trim_offsets": true, "use_regex": true},
        "post_processor": null,
        "decoder": {"type": "ByteLevel", "add_prefix_space": false, "trim_offsets": true, "use_regex": true},
        "model": {
            "type": "BPE",
            "dropout": null,
            "unk_token": null,
            "continuing_subword_prefix": null,
            "end_of_word_suffix": null,
            "fuse_unk": false,
            "byte_fallback": false,
            "vocab": {"Ã": 0, "©": 1},
            "merges": []
        }
    }"#;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokenizer.json");
    fs::write(&path, BYTE_LEVEL).unwrap();
    let tokenizer = HfTokenizer::from_file(&path).unwrap();
    let session = ScriptedSession::new(&[0, 1]);
    let rt = Runtime::from_parts(no_eos(), Box::new(tokenizer), Box::new(session)).unwrap();

    let params = GenerateParams {
        max_new_tokens: 2,
        ..GenerateParams::default()
    };
    let mut seen = Vec::new();
    let result = rt
        .generate_streaming("", &params, |id, fragment| seen.push((id, fragment.to_string())))
        .unwrap();
    assert_eq!(seen, vec![(0, String::new()), (1, "é".to_string())]);
    let streamed: String = seen.iter().map(|(_, f)| f.as_str()).collect();
    assert_eq!(streamed, result.text);
    assert_eq!(result.text, "é");
}

#[test]
fn test_chat_blank_input_skips_generation() {
    let session = ScriptedSession::new(&[]);
    let log = session.log();
    let rt = runtime(session, no_eos());
    let mut conversation = Conversation::default();
    let reply = rt
        .chat(&mut conversation, "   ", &GenerateParams::default())
        .unwrap();
    assert!(reply.is_empty());
    assert_eq!(conversation.messages().len(), 1);
    assert!(log.lock().unwrap().is_empty());
}

proptest! {
    #[test]
    fn prop_generation_length(
        script in proptest::collection::vec(0u32..VOCAB_SIZE as u32, 1..12),
        stop in 0u32..VOCAB_SIZE as u32,
        max_new in 1usize..12,
    ) {
        let rt = runtime(ScriptedSession::new(&script), no_eos());
        let params = GenerateParams {
            max_new_tokens: max_new.min(script.len()),
            stop_token_id: Some(stop),
            ..GenerateParams::default()
        };
        let result = rt.generate_with("hi there", &params).unwrap();
        let k = result.tokens.len() - result.prompt_len;
        prop_assert_eq!(result.prompt_len, 2);
        prop_assert!(k >= 1 && k <= params.max_new_tokens);
        prop_assert_eq!(&result.tokens[2..], &script[..k]);
        if k < params.max_new_tokens {
            prop_assert_eq!(result.tokens.last().copied(), Some(stop));
            prop_assert_eq!(result.stop_reason, StopReason::StopToken);
        }
        prop_assert!(!result.tokens[2..result.tokens.len() - 1].contains(&stop));
    }
}

/// Engine that hands out scripted sessions and records what it was asked.
struct RecordingEngine {
    requested: Mutex<Option<(PathBuf, SessionOptions)>>,
}

impl RecordingEngine {
    fn new() -> Self {
        Self {
            requested: Mutex::new(None),
        }
    }
}

impl InferenceEngine for RecordingEngine {
    fn name(&self) -> &str {
        "recording"
    }

    fn create_session(
        &self,
        model_path: &Path,
        options: &SessionOptions,
    ) -> od_model::Result<Box<dyn InferenceSession>> {
        *self.requested.lock().unwrap() = Some((model_path.to_path_buf(), *options));
        Ok(Box::new(ScriptedSession::new(&[3, 9])))
    }
}

fn model_dir(config: Option<&str>) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("model.onnx"), b"graph").unwrap();
    fs::write(dir.path().join("vocab.json"), VOCAB).unwrap();
    if let Some(config) = config {
        fs::write(dir.path().join("config.json"), config).unwrap();
    }
    dir
}

#[test]
fn test_from_dir() {
    let dir = model_dir(Some(r#"{"eos_token_id": 9}"#));
    let engine = RecordingEngine::new();
    let options = RuntimeOptions {
        session: SessionOptions {
            intra_threads: Some(2),
            ..SessionOptions::default()
        },
        capabilities: Capabilities::minimal(),
        ..RuntimeOptions::default()
    };
    let rt = Runtime::from_dir(dir.path(), &engine, &options).unwrap();
    assert_eq!(rt.config().eos_token_id, Some(9));
    assert_eq!(rt.tokenizer().name(), "vocab");

    let (path, session_options) = engine.requested.lock().unwrap().clone().unwrap();
    assert_eq!(path, dir.path().join("model.onnx"));
    assert_eq!(session_options.intra_threads, Some(2));

    assert_eq!(rt.generate("hi", 8, None).unwrap(), "hia<|end|>");
}

#[test]
fn test_from_dir_requires_config() {
    let dir = model_dir(None);
    let engine = RecordingEngine::new();
    match Runtime::from_dir(dir.path(), &engine, &RuntimeOptions::default()) {
        Err(RuntimeError::Setup(ModelError::MissingAsset { asset, .. })) => {
            assert_eq!(asset, "configuration document")
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected a setup failure"),
    }
    assert!(engine.requested.lock().unwrap().is_none());
}

#[test]
fn test_from_dir_missing_model_file_is_fatal() {
    let dir = model_dir(Some("{}"));
    let engine = RecordingEngine::new();
    let options = RuntimeOptions {
        model_file: Some(PathBuf::from("my-finetune.onnx")),
        capabilities: Capabilities::minimal(),
        ..RuntimeOptions::default()
    };
    match Runtime::from_dir(dir.path(), &engine, &options) {
        Err(RuntimeError::Setup(ModelError::Setup(setup))) => {
            assert_eq!(setup.asset, "model file");
            assert_eq!(setup.attempts.len(), 1);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("loaded a model other than the one asked for"),
    }
    assert!(engine.requested.lock().unwrap().is_none());
}

#[test]
fn test_from_dir_without_engine() {
    let dir = model_dir(Some("{}"));
    let engine = UnavailableEngine::new("none compiled");
    assert!(matches!(
        Runtime::from_dir(dir.path(), &engine, &RuntimeOptions::default()),
        Err(RuntimeError::Setup(ModelError::EngineUnavailable(_)))
    ));
}
