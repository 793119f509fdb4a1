//! # LlamaLink — query a precompiled native LLM from the command line.
//!
//! Thin driver over `llamalink-engine`: initialize the native engine with a
//! model artifact, optionally feed it knowledge, run one query, and clean up
//! the raw output for display.
//!
//! Usage:
//!   llamalink --model models/llama-2-7b-chat.Q2_K.gguf "What is the capital of France?"
//!   llamalink --knowledge-file my_faq.txt --inst "How long is the warranty?"
//!   llamalink --add "Returns are accepted within 30 days." --raw "Return policy?"

mod cleanup;

use anyhow::{Context, Result};
use clap::Parser;
use llamalink_core::config::LlamaLinkConfig;
use llamalink_engine::Engine;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "llamalink",
    version,
    about = "🦙 LlamaLink — native LLM binding with a local knowledge base"
)]
struct Cli {
    /// Prompt to send to the engine
    prompt: String,

    /// Path to the native shared library (overrides config)
    #[arg(long)]
    library: Option<PathBuf>,

    /// Path to the model artifact (overrides config)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Knowledge file to load before querying (overrides config)
    #[arg(short, long)]
    knowledge_file: Option<PathBuf>,

    /// Knowledge string to add before querying (repeatable)
    #[arg(long = "add", value_name = "TEXT")]
    add: Vec<String>,

    /// Print the raw model output without cleanup
    #[arg(long)]
    raw: bool,

    /// Wrap the prompt in [INST] ... [/INST]
    #[arg(long)]
    inst: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "llamalink=debug,llamalink_engine=debug"
    } else {
        "llamalink=info,llamalink_engine=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = LlamaLinkConfig::load().context("Failed to load config")?;
    let mut engine_config = config.engine;
    if let Some(lib) = &cli.library {
        engine_config.library_path = lib.to_string_lossy().into_owned();
    }

    let model_path = cli
        .model
        .clone()
        .or_else(|| {
            (!engine_config.model_path.is_empty())
                .then(|| PathBuf::from(expand_path(&engine_config.model_path)))
        })
        .or_else(|| find_gguf_model(&LlamaLinkConfig::home_dir().join("models")))
        .context("No model found. Pass --model or set engine.model_path in the config")?;

    let knowledge_file = cli.knowledge_file.clone().or_else(|| {
        (!engine_config.knowledge_file.is_empty())
            .then(|| PathBuf::from(expand_path(&engine_config.knowledge_file)))
    });

    let mut engine = Engine::new(engine_config);
    engine.init(&model_path)?;

    if let Some(file) = &knowledge_file {
        engine.load_knowledge_file(file)?;
    }
    for doc in &cli.add {
        engine.add_knowledge(doc)?;
    }

    let prompt = if cli.inst {
        format!("[INST] {} [/INST]", cli.prompt.trim())
    } else {
        cli.prompt.clone()
    };

    match engine.query(&prompt)? {
        Some(raw) => {
            let text = if cli.raw {
                raw
            } else {
                cleanup::clean_model_output(&raw)
            };
            println!("{text}");
        }
        None => {
            tracing::warn!("Engine returned no answer");
            println!("(no answer)");
        }
    }

    Ok(())
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

/// Find the first .gguf file in a directory.
fn find_gguf_model(dir: &Path) -> Option<PathBuf> {
    if !dir.exists() {
        return None;
    }
    std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .find(|path| path.extension().is_some_and(|ext| ext == "gguf"))
}
