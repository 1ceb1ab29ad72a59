//! CLI wiring for `od-generate`.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use od_model::{default_engine, Capabilities, GraphOptimizationLevel, SessionOptions};
use od_runtime::{Conversation, GenerateParams, Runtime, RuntimeOptions};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "od-generate", version, about = "Greedy text generation over an exported ONNX checkpoint")]
pub struct Cli {
    /// Checkpoint directory holding the model file, config.json and tokenizer files.
    #[arg(long, env = "OD_MODEL_DIR", global = true)]
    pub model_dir: Option<PathBuf>,

    /// Engine intra-op threads (default: half the available cores).
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    /// Graph optimization level: disable, basic, extended or all.
    #[arg(long, default_value = "all", global = true)]
    pub opt_level: GraphOptimizationLevel,

    /// Model file to load instead of searching the directory.
    #[arg(long, global = true)]
    pub model_file: Option<PathBuf>,

    /// Skip tokenizer.json and use the vocab.json fallback.
    #[arg(long, default_value_t = false, global = true)]
    pub no_hf_tokenizer: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a continuation of a prompt and print the full text.
    Generate {
        #[arg(long)]
        prompt: String,
        #[arg(long, default_value_t = 64)]
        max_new_tokens: usize,
        /// Stop token id (default: eos_token_id from config.json).
        #[arg(long)]
        stop_token_id: Option<u32>,
        /// Keep special tokens in the decoded text.
        #[arg(long, default_value_t = false)]
        keep_special_tokens: bool,
    },
    /// Interactive chat on stdin. `/reset` clears the history, `/quit` exits.
    Chat {
        #[arg(long, default_value = od_runtime::chat::DEFAULT_SYSTEM_MESSAGE)]
        system: String,
        #[arg(long, default_value_t = 256)]
        max_new_tokens: usize,
    },
    /// Print the engine's declared inputs and outputs and the model configuration.
    Inspect,
}

impl Cli {
    fn runtime_options(&self) -> RuntimeOptions {
        let mut capabilities = Capabilities::compiled();
        if self.no_hf_tokenizer {
            capabilities.hf_tokenizer = false;
        }
        RuntimeOptions {
            model_file: self.model_file.clone(),
            session: SessionOptions {
                intra_threads: Some(self.threads.unwrap_or_else(od_model::default_intra_threads)),
                optimization_level: self.opt_level,
            },
            capabilities,
        }
    }

    fn load_runtime(&self) -> Result<Runtime> {
        let dir = self
            .model_dir
            .as_deref()
            .context("no model directory given; pass --model-dir or set OD_MODEL_DIR")?;
        let engine = default_engine();
        Runtime::from_dir(dir, engine.as_ref(), &self.runtime_options())
            .with_context(|| format!("failed to load model from {}", dir.display()))
    }
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let runtime = cli.load_runtime()?;

    match cli.command {
        Command::Generate {
            ref prompt,
            max_new_tokens,
            stop_token_id,
            keep_special_tokens,
        } => {
            let params = GenerateParams {
                max_new_tokens,
                stop_token_id,
                skip_special_tokens: !keep_special_tokens,
            };
            let result = runtime.generate_with(prompt, &params)?;
            info!(
                prompt_tokens = result.prompt_len,
                new_tokens = result.new_tokens().len(),
                stop = ?result.stop_reason,
                "done"
            );
            println!("{}", result.text);
        }
        Command::Chat {
            ref system,
            max_new_tokens,
        } => {
            let params = GenerateParams {
                max_new_tokens,
                ..GenerateParams::default()
            };
            chat_loop(&runtime, system, &params)?;
        }
        Command::Inspect => inspect(&runtime),
    }
    Ok(())
}

fn chat_loop(runtime: &Runtime, system: &str, params: &GenerateParams) -> Result<()> {
    let mut conversation = Conversation::new(system);
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        eprint!("> ");
        io::stderr().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        match line.trim() {
            "/quit" => break,
            "/reset" => {
                conversation.reset(system);
                eprintln!("(history cleared)");
                continue;
            }
            "" => continue,
            _ => {}
        }

        runtime.chat_streaming(&mut conversation, &line, params, |fragment| {
            print!("{fragment}");
            let _ = stdout.flush();
        })?;
        println!();
    }
    Ok(())
}

fn inspect(runtime: &Runtime) {
    let session = runtime.session();
    println!("inputs:");
    for input in session.inputs() {
        let role = match od_runtime::InputRole::classify(&input.name) {
            Some(role) => format!("{role:?}"),
            None => "not fed".to_string(),
        };
        println!("  {input} ({role})");
    }
    println!("outputs:");
    for output in session.outputs() {
        let dtype = output.dtype().map_or_else(|| "unsupported".to_string(), |d| d.to_string());
        println!("  {output} ({dtype})");
    }
    println!("logits output: {}", runtime.logits_output());
    println!("tokenizer: {}", runtime.tokenizer().name());

    let config = runtime.config();
    println!("config:");
    println!("  vocab_size: {}", config.vocab_size);
    println!("  hidden_size: {}", config.hidden_size);
    println!("  num_hidden_layers: {}", config.num_hidden_layers);
    println!(
        "  attention heads: {} (kv {})",
        config.num_attention_heads,
        config.kv_heads()
    );
    println!("  max_position_embeddings: {}", config.max_position_embeddings);
    match config.eos_token_id {
        Some(id) => println!("  eos_token_id: {id}"),
        None => println!("  eos_token_id: unset"),
    }
}
