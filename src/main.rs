//! nodeflow - command-line front end
//!
//! Manages the definition registry and runs, exports or evaluates graphs.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nodeflow_rs::{
    config::{AppConfig, GraphFile, LoggingConfig},
    pipeline::{export_script, Engine, RunEvent},
    registry::{NodeRegistry, SqliteDefinitionStore},
    scripting::RhaiEvaluator,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Scriptable dataflow node graphs
#[derive(Parser)]
#[command(name = "nodeflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to config.toml in the app data directory)
    #[arg(long, global = true, env = "NODEFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Definition store, overriding the configured path
    #[arg(long, global = true, env = "NODEFLOW_STORE")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered node definitions
    List,

    /// Register (or replace) a definition from a Rhai source file
    Register {
        /// Path to the `.rhai` file
        file: PathBuf,
    },

    /// Run a graph file and print node outputs
    Run {
        /// Path to the graph JSON file
        graph: PathBuf,

        /// Write the graph back after running
        #[arg(long)]
        save: bool,
    },

    /// Export a graph as a standalone Rhai script
    Export {
        /// Path to the graph JSON file
        graph: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Evaluate a Rhai script and print its value
    Exec {
        /// Path to the script
        script: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AppConfig::load_or_default(),
    };

    // Keep the guard alive so buffered file logs are flushed on exit
    let _guard = init_logging(&config.logging)?;

    match cli.command {
        Commands::List => {
            let registry = open_registry(&config, cli.store.as_deref())?;
            for def in registry.list_all() {
                let inputs: Vec<String> = def
                    .inputs()
                    .iter()
                    .map(|s| format!("{}: {}", s.name, s.value_type))
                    .collect();
                let output = def
                    .outputs()
                    .first()
                    .map(|s| s.value_type.to_string())
                    .unwrap_or_default();
                println!("{}({}) -> {}", def.name(), inputs.join(", "), output);
            }
        }

        Commands::Register { file } => {
            let mut registry = open_registry(&config, cli.store.as_deref())?;
            let code = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let def = registry.register_from_code(&code)?;
            println!("Registered '{}'", def.name());
        }

        Commands::Run { graph, save } => {
            let registry = open_registry(&config, cli.store.as_deref())?;
            run_graph(&config, &registry, &graph, save)?;
        }

        Commands::Export { graph, output } => {
            let registry = open_registry(&config, cli.store.as_deref())?;
            let graph = GraphFile::load(&graph)?.into_graph(&registry)?;
            let script = export_script(&graph)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, script)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    tracing::info!("Exported script to {:?}", path);
                }
                None => print!("{}", script),
            }
        }

        Commands::Exec { script } => {
            let source = std::fs::read_to_string(&script)
                .with_context(|| format!("Failed to read {}", script.display()))?;
            let evaluator = RhaiEvaluator::with_limits(config.evaluator);
            let value = evaluator.run_script(&source)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .context("Invalid log filter")?;

    let (file_layer, guard) = match &logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

fn open_registry(config: &AppConfig, store_override: Option<&Path>) -> Result<NodeRegistry> {
    let path = match store_override {
        Some(path) => path.to_path_buf(),
        None => config.store_path()?,
    };
    tracing::debug!("Opening definition store at {:?}", path);

    let store = SqliteDefinitionStore::open(&path)
        .with_context(|| format!("Failed to open definition store {}", path.display()))?;
    Ok(NodeRegistry::open(Box::new(store))?)
}

fn run_graph(config: &AppConfig, registry: &NodeRegistry, path: &Path, save: bool) -> Result<()> {
    let graph = GraphFile::load(path)?.into_graph(registry)?;
    let engine = Engine::new(Arc::new(RhaiEvaluator::with_limits(
        config.evaluator,
    )));

    let handle = engine.spawn(graph)?;
    for event in handle.events().iter() {
        let last = event.is_terminal();
        match event {
            RunEvent::NodeCompleted { id, outputs, cached } => {
                let rendered: Vec<String> = outputs
                    .iter()
                    .map(|(name, value)| format!("{} = {}", name, value))
                    .collect();
                let marker = if cached { " (cached)" } else { "" };
                println!("{}{}: {}", id, marker, rendered.join(", "));
            }
            RunEvent::NodeFailed { id, message } => eprintln!("{} failed: {}", id, message),
            RunEvent::RunFailed { message } => eprintln!("Run failed: {}", message),
            _ => {}
        }
        if last {
            break;
        }
    }

    let (graph, report) = handle.join()?;
    tracing::info!(
        executed = report.executed.len(),
        cached = report.cache_hits.len(),
        dropped = report.dropped_connections.len(),
        "Run took {:?}",
        report.elapsed
    );

    if save {
        GraphFile::from_graph(&graph).save(path)?;
        tracing::info!("Saved graph to {:?}", path);
    }

    if let Some(error) = report.error() {
        bail!("{}", error);
    }
    Ok(())
}
