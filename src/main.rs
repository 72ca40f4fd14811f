//! `memoria` — launches the [`Facade`] against a workspace directory and
//! drives the runtime interface from the command line.
//!
//! Shaped after `agenticlaw-consciousness::main`: a clap `Cli`, a
//! `tracing-subscriber` registry wired from `RUST_LOG`, and a TOML config
//! file loaded from (or dumped to) the workspace.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use memoria_core::MemoryType;
use memoria_facade::{Facade, FacadeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "memoria", about = "Tiered experiential memory and orchestration runtime")]
struct Cli {
    /// Workspace root: config.json, the memory tiers, and the archive live here
    #[arg(long, default_value = "~/.memoria")]
    workspace: String,

    /// Path to a TOML config file. Default: <workspace>/config.toml
    #[arg(long)]
    config: Option<String>,

    /// Print the default config as TOML and exit
    #[arg(long)]
    dump_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Route a single utterance through the orchestrator and print the result
    Process { utterance: String },
    /// Read utterances from stdin, one per line, until EOF
    Repl,
    /// Store free-form content directly into memory
    Store {
        content: String,
        /// seed | leaf | branch | root
        #[arg(long = "type", default_value = "seed")]
        memory_type: String,
    },
    /// Search across every memory tier
    Recall {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        include_archive: bool,
    },
    /// Run (or force) a consolidation cycle
    Consolidate {
        #[arg(long)]
        force: bool,
    },
    /// Run manipulation detection over a piece of text
    Check { text: String },
    /// Predictive signals bundle for a context string
    Predict { context: String },
    /// Component health and initialization snapshot
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "memoria=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.dump_config {
        println!("{}", FacadeConfig::default().to_toml());
        return Ok(());
    }

    let workspace = expand_tilde(&cli.workspace);
    tokio::fs::create_dir_all(&workspace).await.ok();

    let config_path = cli.config.map(|p| expand_tilde(&p)).unwrap_or_else(|| workspace.join("config.toml"));
    let config = FacadeConfig::load(&config_path);

    let facade = Facade::new(workspace, config);
    facade.initialize().await?;

    match cli.command.unwrap_or(Command::Repl) {
        Command::Process { utterance } => process_one(&facade, &utterance).await,
        Command::Repl => repl(&facade).await,
        Command::Store { content, memory_type } => store(&facade, content, &memory_type).await,
        Command::Recall { query, limit, include_archive } => recall(&facade, &query, limit, include_archive).await,
        Command::Consolidate { force } => consolidate(&facade, force).await,
        Command::Check { text } => check(&facade, &text).await,
        Command::Predict { context } => predict(&facade, &context).await,
        Command::Status => status(&facade).await,
    }
}

async fn process_one(facade: &Facade, utterance: &str) -> anyhow::Result<()> {
    let result = facade.process_interaction(utterance, HashMap::new()).await;
    if let Some(response) = &result.response {
        println!("{response}");
    }
    if let Some(package) = &result.context_package {
        println!("--- context package for external LLM ({:?}) ---", result.mode);
        println!("{}", serde_json::to_string_pretty(package)?);
    }
    if let Some(error) = &result.error {
        eprintln!("warning: {error}");
    }
    Ok(())
}

async fn repl(facade: &Facade) -> anyhow::Result<()> {
    use tokio::io::{AsyncBufReadExt, BufReader};
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let utterance = line.trim();
        if utterance.is_empty() {
            continue;
        }
        process_one(facade, utterance).await?;
    }
    Ok(())
}

async fn store(facade: &Facade, content: String, memory_type: &str) -> anyhow::Result<()> {
    let memory_type = parse_memory_type(memory_type)?;
    let id = facade.store_memory(content, memory_type, None, None).await?;
    println!("{id}");
    Ok(())
}

async fn recall(facade: &Facade, query: &str, limit: usize, include_archive: bool) -> anyhow::Result<()> {
    let hits = facade.recall_memories(query, limit, include_archive).await?;
    println!("{}", serde_json::to_string_pretty(&hits)?);
    Ok(())
}

async fn consolidate(facade: &Facade, force: bool) -> anyhow::Result<()> {
    let report = facade.consolidate_memories(force).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn check(facade: &Facade, text: &str) -> anyhow::Result<()> {
    let assessment = facade.check_manipulation(text).await?;
    println!("{}", serde_json::to_string_pretty(&assessment)?);
    Ok(())
}

async fn predict(facade: &Facade, context: &str) -> anyhow::Result<()> {
    let bundle = facade.get_predictions(context).await?;
    println!("{}", serde_json::to_string_pretty(&bundle)?);
    Ok(())
}

async fn status(facade: &Facade) -> anyhow::Result<()> {
    let report = facade.get_status().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn parse_memory_type(s: &str) -> anyhow::Result<MemoryType> {
    match s.to_lowercase().as_str() {
        "seed" => Ok(MemoryType::Seed),
        "leaf" => Ok(MemoryType::Leaf),
        "branch" => Ok(MemoryType::Branch),
        "root" => Ok(MemoryType::Root),
        other => Err(anyhow::anyhow!("unknown memory type '{other}' (expected seed|leaf|branch|root)")),
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
